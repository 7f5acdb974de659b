//! Gallery service
//!
//! Proof and project images: public gallery reads, admin upload,
//! metadata edits and deletion. Files go to object storage, rows to the
//! `images` table.

use std::sync::Arc;

use crate::data::{Attachment, CatalogStore, Database, EntityId, Image, ImageFilter, ImageType};
use crate::error::AppError;
use crate::metrics::{IMAGE_BYTES_UPLOADED, IMAGE_UPLOADS_TOTAL, STORAGE_CLEANUP_FAILURES_TOTAL};
use crate::storage::ObjectStore;

const SUPPORTED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

fn image_file_extension_from_content_type(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

pub(crate) fn normalize_optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Upload request; validated by [`GalleryService::upload`]
#[derive(Debug)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub content_type: String,
    pub image_type: ImageType,
    pub attachment: Attachment,
    pub title: Option<String>,
}

/// Partial metadata edit; `None` leaves the field unchanged.
///
/// A blank title clears it.
#[derive(Debug, Default)]
pub struct ImageUpdate {
    pub title: Option<String>,
    pub image_type: Option<ImageType>,
}

/// Where an image's object lives: the stored key, or for older rows the
/// key recovered from the public URL.
pub(crate) fn object_key(storage: &dyn ObjectStore, image: &Image) -> Option<String> {
    image
        .storage_key
        .clone()
        .filter(|key| !key.is_empty())
        .or_else(|| storage.key_from_url(&image.url))
}

/// Delete the objects behind already-deleted image rows.
///
/// Failures are logged and counted, never returned.
pub(crate) async fn remove_objects(storage: &dyn ObjectStore, images: &[Image]) {
    for image in images {
        let Some(key) = object_key(storage, image) else {
            STORAGE_CLEANUP_FAILURES_TOTAL.inc();
            tracing::warn!(
                image_id = %image.id,
                url = %image.url,
                "could not determine object key for deleted image; object left in storage"
            );
            continue;
        };

        if let Err(error) = storage.delete(&key).await {
            STORAGE_CLEANUP_FAILURES_TOTAL.inc();
            tracing::warn!(
                image_id = %image.id,
                key = %key,
                error = %error,
                "failed to delete image object after row removal"
            );
        }
    }
}

/// Gallery service
pub struct GalleryService {
    db: Arc<Database>,
    catalog: Arc<CatalogStore>,
    storage: Arc<dyn ObjectStore>,
    max_upload_bytes: usize,
}

impl GalleryService {
    pub fn new(
        db: Arc<Database>,
        catalog: Arc<CatalogStore>,
        storage: Arc<dyn ObjectStore>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            db,
            catalog,
            storage,
            max_upload_bytes,
        }
    }

    /// Images matching `filter`, newest first
    pub async fn list(&self, filter: ImageFilter) -> Result<Vec<Image>, AppError> {
        if let Some(cached) = self.catalog.images(&filter).await {
            return Ok(cached.as_ref().clone());
        }

        let generation = self.catalog.generation();
        let images = self.db.list_images(&filter).await?;
        self.catalog
            .put_images(generation, filter, images.clone())
            .await;
        Ok(images)
    }

    pub async fn get(&self, id: &str) -> Result<Image, AppError> {
        self.db.get_image(id).await?.ok_or(AppError::NotFound)
    }

    /// Upload an image and record it
    ///
    /// The object is stored under `<image_type>/<id>.<ext>` before the row
    /// is inserted. If the insert fails the object is removed again.
    pub async fn upload(&self, upload: ImageUpload) -> Result<Image, AppError> {
        if upload.data.is_empty() {
            return Err(AppError::Validation("image file is required".to_string()));
        }

        let content_type = upload.content_type.trim().to_ascii_lowercase();
        if !SUPPORTED_IMAGE_TYPES.contains(&content_type.as_str()) {
            return Err(AppError::Validation(format!(
                "unsupported image type: {}",
                upload.content_type
            )));
        }

        if upload.data.len() > self.max_upload_bytes {
            return Err(AppError::Validation(format!(
                "image file too large: exceeds {} bytes",
                self.max_upload_bytes
            )));
        }

        let image_id = EntityId::new().0;
        let extension = image_file_extension_from_content_type(&content_type);
        let key = format!("{}/{}.{}", upload.image_type.as_str(), image_id, extension);
        let file_size = upload.data.len();

        self.storage.put(&key, upload.data, &content_type).await?;

        let image = Image {
            id: image_id,
            image_type: upload.image_type.as_str().to_string(),
            item_id: upload.attachment.item_id().map(str::to_string),
            category_id: upload.attachment.category_id().map(str::to_string),
            title: normalize_optional_text(upload.title),
            url: self.storage.public_url(&key),
            storage_key: Some(key.clone()),
            content_type,
            file_size: file_size as i64,
            created_at: chrono::Utc::now(),
        };

        if let Err(error) = self.db.insert_image(&image).await {
            if let Err(cleanup_error) = self.storage.delete(&key).await {
                STORAGE_CLEANUP_FAILURES_TOTAL.inc();
                tracing::warn!(
                    key = %key,
                    error = %cleanup_error,
                    "failed to cleanup uploaded image after metadata insert error"
                );
            }
            return Err(error);
        }

        IMAGE_UPLOADS_TOTAL.inc();
        IMAGE_BYTES_UPLOADED.inc_by(file_size as f64);
        self.catalog.invalidate_images();

        tracing::info!(
            image_id = %image.id,
            key = %key,
            size = file_size,
            "Image uploaded"
        );

        Ok(image)
    }

    /// Edit title and/or type
    ///
    /// Changing the type does not move the stored object.
    pub async fn update(&self, id: &str, update: ImageUpdate) -> Result<Image, AppError> {
        let mut image = self.get(id).await?;

        if let Some(title) = update.title {
            image.title = normalize_optional_text(Some(title));
        }
        if let Some(image_type) = update.image_type {
            image.image_type = image_type.as_str().to_string();
        }

        if !self.db.update_image_metadata(&image).await? {
            return Err(AppError::NotFound);
        }
        self.catalog.invalidate_images();

        Ok(image)
    }

    /// Delete the row, then its object (best-effort)
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let image = self.get(id).await?;

        if !self.db.delete_image(id).await? {
            return Err(AppError::NotFound);
        }
        self.catalog.invalidate_images();

        remove_objects(self.storage.as_ref(), std::slice::from_ref(&image)).await;
        tracing::info!(image_id = %id, "Image deleted");

        Ok(())
    }
}
