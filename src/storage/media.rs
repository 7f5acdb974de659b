//! Media storage on an S3-compatible bucket
//!
//! Handles upload, delete, and URL generation for gallery images.
//! Files are served from the bucket's public URL.

use aws_sdk_s3::Client as S3Client;

use super::{ObjectStore, build_s3_http_client};
use crate::error::AppError;

/// Media storage service
///
/// Uploads images to the bucket and returns public URLs.
pub struct MediaStorage {
    /// S3-compatible client
    client: S3Client,
    /// Media bucket name
    bucket: String,
    /// Public URL base
    /// e.g., "https://media.example.com"
    public_url: String,
}

impl MediaStorage {
    /// Create new media storage client
    ///
    /// No request is made until the first upload.
    ///
    /// # Errors
    /// Returns error if S3 client initialization fails
    pub async fn new(
        config: &crate::config::MediaStorageConfig,
        object_store: &crate::config::ObjectStoreConfig,
    ) -> Result<Self, AppError> {
        use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

        let credentials = Credentials::new(
            &object_store.access_key_id,
            &object_store.secret_access_key,
            None,
            None,
            "storefront-media",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .http_client(build_s3_http_client())
            .region(Region::new(object_store.region.clone()))
            .endpoint_url(&object_store.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = S3Client::from_conf(s3_config);

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
        })
    }
}

#[axum::async_trait]
impl ObjectStore for MediaStorage {
    /// Upload an image
    ///
    /// # Example
    /// ```ignore
    /// storage.put("proofs/abc123.webp", image_data, "image/webp").await?;
    /// // served from https://media.example.com/proofs/abc123.webp
    /// ```
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        use aws_sdk_s3::primitives::ByteStream;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .cache_control("public, max-age=31536000") // 1 year
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("upload failed: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("delete failed: {}", e)))?;

        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        object_key_from_public_url(url, &self.public_url, &self.bucket)
    }
}

/// Reconstruct an object key from a public URL.
///
/// Tries, in order:
/// 1. strip the configured public URL prefix,
/// 2. take everything after a `/<bucket>/` path segment (path-style URLs
///    such as `.../storage/v1/object/public/<bucket>/<key>`).
///
/// Query strings and fragments are ignored. Returns `None` when neither
/// rule yields a non-empty key.
pub fn object_key_from_public_url(url: &str, public_url: &str, bucket: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let path = decoded_path(&parsed);

    if let Ok(base) = url::Url::parse(public_url) {
        let same_origin = base.scheme() == parsed.scheme()
            && base.host_str() == parsed.host_str()
            && base.port_or_known_default() == parsed.port_or_known_default();
        let base_path = decoded_path(&base);
        let base_path = base_path.trim_end_matches('/');
        if same_origin {
            if let Some(rest) = path.strip_prefix(base_path) {
                if let Some(key) = rest.strip_prefix('/').filter(|key| !key.is_empty()) {
                    return Some(key.to_string());
                }
            }
        }
    }

    let marker = format!("/{bucket}/");
    let (_, key) = path.split_once(&marker)?;
    (!key.is_empty()).then(|| key.to_string())
}

fn decoded_path(url: &url::Url) -> String {
    urlencoding::decode(url.path())
        .map(|path| path.into_owned())
        .unwrap_or_else(|_| url.path().to_string())
}
