//! Storefront - catalog storefront and admin back office
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Storefront catalog, gallery, comments (JSON + SSE)       │
//! │  - Admin back office                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Catalog, gallery, comments, profiles                     │
//! │  - Comment thread assembly                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! │  - Catalog store (moka)                                     │
//! │  - S3-compatible object storage                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Business logic layer
//! - `data`: Database and catalog store
//! - `storage`: Object storage for gallery images
//! - `events`: Comment change feed
//! - `auth`: Identity token verification and extractors
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod metrics;
pub mod service;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like database pool, caches, and object storage.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Catalog store (volatile)
    pub catalog: Arc<data::CatalogStore>,

    /// Gallery object storage
    pub storage: Arc<dyn storage::ObjectStore>,

    /// Comment change feed
    pub events: Arc<events::EventBus>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to the object store
    /// 2. Connect to SQLite database and run migrations
    /// 3. Initialize the catalog store and change feed
    /// 4. Promote configured admins
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let storage =
            storage::MediaStorage::new(&config.storage.media, &config.object_store).await?;
        tracing::info!(bucket = %config.storage.media.bucket, "Media storage initialized");

        Self::with_storage(config, Arc::new(storage)).await
    }

    /// Initialize application state around an existing object store
    pub async fn with_storage(
        config: config::AppConfig,
        storage: Arc<dyn storage::ObjectStore>,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = data::Database::connect(&config.database.path).await?;
        tracing::info!("Database connected");

        let catalog = data::CatalogStore::new(
            Duration::from_secs(config.cache.catalog_ttl),
            config.cache.catalog_max_entries,
        );
        let events = events::EventBus::new(config.comments.feed_capacity);
        tracing::info!("Catalog store and change feed initialized");

        let db = Arc::new(db);
        service::ProfileService::new(db.clone())
            .promote_admins(&config.auth.admin_user_ids)
            .await?;

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            catalog: Arc::new(catalog),
            storage,
            events: Arc::new(events),
        })
    }

    pub fn catalog_service(&self) -> service::CatalogService {
        service::CatalogService::new(self.db.clone(), self.catalog.clone(), self.storage.clone())
    }

    pub fn gallery_service(&self) -> service::GalleryService {
        service::GalleryService::new(
            self.db.clone(),
            self.catalog.clone(),
            self.storage.clone(),
            self.config.storage.media.max_upload_bytes,
        )
    }

    pub fn comment_service(&self) -> service::CommentService {
        service::CommentService::new(
            self.db.clone(),
            self.events.clone(),
            self.config.comments.max_length,
            self.config.comments.max_depth,
        )
    }

    pub fn profile_service(&self) -> service::ProfileService {
        service::ProfileService::new(self.db.clone())
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, extract::DefaultBodyLimit, middleware};
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    let cors_layer = build_cors_layer(&state.config.server);
    // Multipart framing on top of the largest accepted file.
    let body_limit = state.config.storage.media.max_upload_bytes + 64 * 1024;

    let admin = api::admin_router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_admin,
    ));
    let metrics = api::metrics_router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_admin,
    ));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest(
            "/api",
            api::catalog_router().merge(api::comments_router()),
        )
        .nest("/admin", admin)
        .merge(metrics)
        .layer(middleware::from_fn(api::track_http_metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_state(max_upload_bytes: usize) -> (AppState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config::tests::valid_config();
        config.database.path = temp_dir.path().join("router.db");
        config.storage.media.max_upload_bytes = max_upload_bytes;
        let storage = Arc::new(storage::MockObjectStore::new());
        let state = AppState::with_storage(config, storage).await.unwrap();
        (state, temp_dir)
    }

    #[tokio::test]
    async fn health_and_unknown_routes() {
        let (state, _dir) = test_state(1024).await;
        let app = build_router(state);

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let missing = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_routes_reject_anonymous_callers() {
        let (state, _dir) = test_state(1024).await;
        let app = build_router(state);

        let response = app
            .oneshot(Request::get("/admin/items").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn comment_stream_tracks_open_subscriptions() {
        let (state, _dir) = test_state(1024).await;
        let app = build_router(state);
        let gauge = metrics::FEED_SUBSCRIBERS.with_label_values(&["comments"]);
        let before = gauge.get();

        let response = app
            .clone()
            .oneshot(Request::get("/api/comments/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(gauge.get(), before + 1);

        drop(response);
        assert_eq!(gauge.get(), before);

        let rejected = app
            .oneshot(
                Request::get("/api/comments/stream?category_id=a&item_id=b")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        assert_eq!(gauge.get(), before);
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected_before_auth() {
        let (state, _dir) = test_state(1024).await;
        let app = build_router(state);

        let request = Request::post("/admin/images")
            .header(header::CONTENT_LENGTH, (1024 + 64 * 1024 + 1).to_string())
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn public_catalog_starts_empty() {
        let (state, _dir) = test_state(1024).await;
        let app = build_router(state);

        let response = app
            .oneshot(Request::get("/api/categories").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"[]");
    }
}
