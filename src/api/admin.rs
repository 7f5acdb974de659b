//! Admin API endpoints
//!
//! Back-office management of the catalog, gallery and profiles.
//! Every route sits behind [`require_admin`](crate::auth::require_admin).

use axum::{
    Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, put},
};
use serde::Deserialize;

use super::catalog::GalleryQuery;
use crate::AppState;
use crate::auth::AdminUser;
use crate::data::{
    Attachment, Category, Image, ImageType, Item, ListOrder, PricingTier, Profile, Role, Service,
    SortParams,
};
use crate::error::AppError;
use crate::service::{CategoryInput, ImageUpdate, ImageUpload, ItemInput, ServiceInput, TierInput};

const CATEGORY_SORT_COLUMNS: &[&str] = &["name", "created_at", "updated_at"];
const ITEM_SORT_COLUMNS: &[&str] = &["name", "price_cents", "created_at", "updated_at"];
const SERVICE_SORT_COLUMNS: &[&str] = &["name", "price_cents", "created_at"];

/// Create admin router
///
/// Routes:
/// - GET/POST /categories, PUT/DELETE /categories/:id
/// - GET/POST /items, PUT/DELETE /items/:id
/// - GET/POST /items/:id/tiers, PUT/DELETE /tiers/:id
/// - GET/POST /services, PUT/DELETE /services/:id
/// - GET/POST /images, PATCH/DELETE /images/:id
/// - GET /profiles, PUT /profiles/:id/role
pub fn admin_router() -> Router<AppState> {
    Router::new()
        // Categories
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            put(update_category).delete(delete_category),
        )
        // Items
        .route("/items", get(list_items).post(create_item))
        .route("/items/:id", put(update_item).delete(delete_item))
        // Pricing tiers
        .route("/items/:id/tiers", get(list_tiers).post(create_tier))
        .route("/tiers/:id", put(update_tier).delete(delete_tier))
        // Services
        .route("/services", get(list_services).post(create_service))
        .route("/services/:id", put(update_service).delete(delete_service))
        // Images
        .route("/images", get(list_images).post(upload_image))
        .route(
            "/images/:id",
            axum::routing::patch(update_image).delete(delete_image),
        )
        // Profiles
        .route("/profiles", get(list_profiles))
        .route("/profiles/:id/role", put(set_profile_role))
}

// =============================================================================
// Categories
// =============================================================================

/// GET /admin/categories
async fn list_categories(
    State(state): State<AppState>,
    Query(sort): Query<SortParams>,
) -> Result<Json<Vec<Category>>, AppError> {
    let order = ListOrder::parse(&sort, CATEGORY_SORT_COLUMNS)?;
    Ok(Json(
        state.catalog_service().admin_list_categories(order).await?,
    ))
}

/// POST /admin/categories
async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CategoryInput>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let category = state.catalog_service().create_category(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /admin/categories/:id
async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<CategoryInput>,
) -> Result<Json<Category>, AppError> {
    Ok(Json(
        state.catalog_service().update_category(&id, input).await?,
    ))
}

/// DELETE /admin/categories/:id
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.catalog_service().delete_category(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Items
// =============================================================================

/// Query for GET /admin/items
#[derive(Debug, Default, Deserialize)]
pub struct AdminItemsQuery {
    pub category_id: Option<String>,
    #[serde(flatten)]
    pub sort: SortParams,
}

/// GET /admin/items
async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<AdminItemsQuery>,
) -> Result<Json<Vec<Item>>, AppError> {
    let order = ListOrder::parse(&query.sort, ITEM_SORT_COLUMNS)?;
    let category_id = query.category_id.as_deref().filter(|id| !id.trim().is_empty());
    Ok(Json(
        state
            .catalog_service()
            .admin_list_items(category_id, order)
            .await?,
    ))
}

/// POST /admin/items
async fn create_item(
    State(state): State<AppState>,
    Json(input): Json<ItemInput>,
) -> Result<(StatusCode, Json<Item>), AppError> {
    let item = state.catalog_service().create_item(input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// PUT /admin/items/:id
async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ItemInput>,
) -> Result<Json<Item>, AppError> {
    Ok(Json(state.catalog_service().update_item(&id, input).await?))
}

/// DELETE /admin/items/:id
async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.catalog_service().delete_item(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Pricing tiers
// =============================================================================

/// GET /admin/items/:id/tiers
async fn list_tiers(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<Vec<PricingTier>>, AppError> {
    Ok(Json(state.catalog_service().list_tiers(&item_id).await?))
}

/// POST /admin/items/:id/tiers
async fn create_tier(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Json(input): Json<TierInput>,
) -> Result<(StatusCode, Json<PricingTier>), AppError> {
    let tier = state.catalog_service().create_tier(&item_id, input).await?;
    Ok((StatusCode::CREATED, Json(tier)))
}

/// PUT /admin/tiers/:id
async fn update_tier(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<TierInput>,
) -> Result<Json<PricingTier>, AppError> {
    Ok(Json(state.catalog_service().update_tier(&id, input).await?))
}

/// DELETE /admin/tiers/:id
async fn delete_tier(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.catalog_service().delete_tier(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Services
// =============================================================================

/// GET /admin/services
async fn list_services(
    State(state): State<AppState>,
    Query(sort): Query<SortParams>,
) -> Result<Json<Vec<Service>>, AppError> {
    let order = ListOrder::parse(&sort, SERVICE_SORT_COLUMNS)?;
    Ok(Json(
        state.catalog_service().admin_list_services(order).await?,
    ))
}

/// POST /admin/services
async fn create_service(
    State(state): State<AppState>,
    Json(input): Json<ServiceInput>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    let service = state.catalog_service().create_service(input).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

/// PUT /admin/services/:id
async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ServiceInput>,
) -> Result<Json<Service>, AppError> {
    Ok(Json(
        state.catalog_service().update_service(&id, input).await?,
    ))
}

/// DELETE /admin/services/:id
async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.catalog_service().delete_service(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Images
// =============================================================================

/// GET /admin/images
async fn list_images(
    State(state): State<AppState>,
    Query(query): Query<GalleryQuery>,
) -> Result<Json<Vec<Image>>, AppError> {
    let filter = query.into_filter()?;
    Ok(Json(state.gallery_service().list(filter).await?))
}

async fn read_text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read {}: {}", name, e)))
}

/// POST /admin/images (multipart)
///
/// Fields: `file`, `image_type`, one of `item_id` / `category_id`,
/// optional `title`.
async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Image>), AppError> {
    let max_size = state.config.storage.media.max_upload_bytes;

    let mut file_data: Option<Vec<u8>> = None;
    let mut content_type: Option<String> = None;
    let mut image_type: Option<String> = None;
    let mut item_id: Option<String> = None;
    let mut category_id: Option<String> = None;
    let mut title: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to parse multipart: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                content_type = Some(
                    field
                        .content_type()
                        .map(|s| s.to_string())
                        .ok_or(AppError::Validation(
                            "Missing content type for uploaded file".to_string(),
                        ))?,
                );

                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read file: {}", e)))?
                {
                    if bytes.len() + chunk.len() > max_size {
                        return Err(AppError::Validation(format!(
                            "File too large: exceeds {} bytes",
                            max_size
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                file_data = Some(bytes);
            }
            "image_type" => image_type = Some(read_text_field(field, "image_type").await?),
            "item_id" => item_id = Some(read_text_field(field, "item_id").await?),
            "category_id" => category_id = Some(read_text_field(field, "category_id").await?),
            "title" => title = Some(read_text_field(field, "title").await?),
            _ => {}
        }
    }

    let data = file_data.ok_or(AppError::Validation("No file provided".to_string()))?;
    let content_type = content_type.ok_or(AppError::Validation(
        "Missing content type for uploaded file".to_string(),
    ))?;
    let image_type = ImageType::parse(
        image_type
            .as_deref()
            .ok_or(AppError::Validation("image_type is required".to_string()))?,
    )?;
    let non_empty = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let attachment = Attachment::from_columns(non_empty(category_id), non_empty(item_id))?;

    let image = state
        .gallery_service()
        .upload(ImageUpload {
            data,
            content_type,
            image_type,
            attachment,
            title,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(image)))
}

/// Body for PATCH /admin/images/:id
#[derive(Debug, Deserialize)]
pub struct UpdateImageRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub image_type: Option<String>,
}

/// PATCH /admin/images/:id
async fn update_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateImageRequest>,
) -> Result<Json<Image>, AppError> {
    let update = ImageUpdate {
        title: request.title,
        image_type: request.image_type.as_deref().map(ImageType::parse).transpose()?,
    };
    Ok(Json(state.gallery_service().update(&id, update).await?))
}

/// DELETE /admin/images/:id
async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.gallery_service().delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Profiles
// =============================================================================

/// GET /admin/profiles
async fn list_profiles(State(state): State<AppState>) -> Result<Json<Vec<Profile>>, AppError> {
    Ok(Json(state.profile_service().list().await?))
}

/// Body for PUT /admin/profiles/:id/role
#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

/// PUT /admin/profiles/:id/role
async fn set_profile_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(request): Json<SetRoleRequest>,
) -> Result<Json<Profile>, AppError> {
    let role = Role::parse(&request.role)?;
    Ok(Json(
        state.profile_service().set_role(&admin, &id, role).await?,
    ))
}
