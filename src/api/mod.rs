//! API layer
//!
//! HTTP handlers for:
//! - Storefront catalog and gallery (public)
//! - Comment threads and change feed
//! - Admin back office
//! - Metrics (Prometheus)

mod admin;
mod catalog;
mod comments;
pub mod metrics;

pub use admin::admin_router;
pub use catalog::catalog_router;
pub use comments::comments_router;
pub use metrics::{metrics_router, track_http_metrics};
