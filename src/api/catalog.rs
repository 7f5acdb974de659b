//! Storefront API endpoints
//!
//! Public catalog reads plus the caller's auth context.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{Attachment, Category, Image, ImageFilter, ImageType, Item, Service};
use crate::error::AppError;
use crate::service::{CategoryDetail, ItemDetail};

/// Create storefront router
///
/// Routes:
/// - GET /categories, /categories/:id
/// - GET /items, /items/:id
/// - GET /services, /services/:id
/// - GET /gallery
/// - GET /me
pub fn catalog_router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/categories/:id", get(get_category))
        .route("/items", get(list_items))
        .route("/items/:id", get(get_item))
        .route("/services", get(list_services))
        .route("/services/:id", get(get_service))
        .route("/gallery", get(gallery))
        .route("/me", get(me))
}

/// Query for GET /api/items
#[derive(Debug, Default, Deserialize)]
pub struct ItemsQuery {
    pub category_id: Option<String>,
    /// Case-insensitive text match on name or description
    pub q: Option<String>,
}

/// Query for GET /api/gallery and GET /admin/images
#[derive(Debug, Default, Deserialize)]
pub struct GalleryQuery {
    #[serde(rename = "type")]
    pub image_type: Option<String>,
    pub item_id: Option<String>,
    pub category_id: Option<String>,
}

impl GalleryQuery {
    pub(crate) fn into_filter(self) -> Result<ImageFilter, AppError> {
        let image_type = self
            .image_type
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(ImageType::parse)
            .transpose()?;
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let attachment = match (non_empty(self.category_id), non_empty(self.item_id)) {
            (None, None) => None,
            (category_id, item_id) => Some(Attachment::from_columns(category_id, item_id)?),
        };

        Ok(ImageFilter {
            image_type,
            attachment,
        })
    }
}

/// Response for GET /api/me
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: String,
    pub is_admin: bool,
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(state.catalog_service().list_categories().await?))
}

/// GET /api/categories/:id
async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CategoryDetail>, AppError> {
    Ok(Json(state.catalog_service().category_detail(&id).await?))
}

/// GET /api/items
async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Vec<Item>>, AppError> {
    let category_id = query.category_id.as_deref().filter(|id| !id.trim().is_empty());
    let items = state
        .catalog_service()
        .list_items(category_id, query.q.as_deref())
        .await?;
    Ok(Json(items))
}

/// GET /api/items/:id
async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ItemDetail>, AppError> {
    Ok(Json(state.catalog_service().item_detail(&id).await?))
}

/// GET /api/services
async fn list_services(State(state): State<AppState>) -> Result<Json<Vec<Service>>, AppError> {
    Ok(Json(state.catalog_service().list_services().await?))
}

/// GET /api/services/:id
async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Service>, AppError> {
    Ok(Json(state.catalog_service().get_service(&id).await?))
}

/// GET /api/gallery
///
/// Filter by `type` (proofs|projects) and at most one of `item_id` /
/// `category_id`.
async fn gallery(
    State(state): State<AppState>,
    Query(query): Query<GalleryQuery>,
) -> Result<Json<Vec<Image>>, AppError> {
    let filter = query.into_filter()?;
    Ok(Json(state.gallery_service().list(filter).await?))
}

/// GET /api/me
async fn me(CurrentUser(profile): CurrentUser) -> Json<MeResponse> {
    Json(MeResponse {
        is_admin: profile.is_admin(),
        user_id: profile.id,
        email: profile.email,
        display_name: profile.display_name,
        role: profile.role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gallery_query_builds_filter() {
        let filter = GalleryQuery {
            image_type: Some("Proofs".to_string()),
            item_id: Some("item".to_string()),
            category_id: None,
        }
        .into_filter()
        .unwrap();

        assert_eq!(filter.image_type, Some(ImageType::Proofs));
        assert_eq!(filter.attachment, Some(Attachment::Item("item".to_string())));
    }

    #[test]
    fn gallery_query_ignores_blank_values() {
        let filter = GalleryQuery {
            image_type: Some(" ".to_string()),
            item_id: Some("".to_string()),
            category_id: None,
        }
        .into_filter()
        .unwrap();

        assert_eq!(filter, ImageFilter::default());
    }

    #[test]
    fn gallery_query_rejects_bad_type_and_double_attachment() {
        assert!(matches!(
            GalleryQuery {
                image_type: Some("memes".to_string()),
                ..Default::default()
            }
            .into_filter(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            GalleryQuery {
                image_type: None,
                item_id: Some("i".to_string()),
                category_id: Some("c".to_string()),
            }
            .into_filter(),
            Err(AppError::Validation(_))
        ));
    }
}
