//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate database, catalog store, object storage and the
//! comment change feed.

mod catalog;
mod comment;
mod gallery;
mod profile;
mod thread;

pub use catalog::{
    CatalogService, CategoryDetail, CategoryInput, ItemDetail, ItemInput, ServiceInput, TierInput,
};
pub use comment::CommentService;
pub use gallery::{GalleryService, ImageUpdate, ImageUpload};
pub use profile::ProfileService;
pub use thread::{CommentNode, build_thread};
