//! Data layer module
//!
//! Handles all data persistence and caching:
//! - SQLite database operations
//! - Catalog store (volatile)

mod cache;
mod database;
mod models;
mod query;

pub use cache::{CatalogStore, Generation};
pub use database::Database;
pub use models::*;
pub use query::{ImageFilter, ListOrder, SortParams};
