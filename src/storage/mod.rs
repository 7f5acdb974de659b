//! Object storage module
//!
//! Gallery images live in an S3-compatible bucket. Services talk to the
//! bucket through [`ObjectStore`] so tests can substitute a mock.

mod media;

pub use media::{MediaStorage, object_key_from_public_url};

use crate::error::AppError;

/// Minimal object store surface used by the gallery
#[cfg_attr(test, mockall::automock)]
#[axum::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), AppError>;

    /// Remove the object at `key`
    async fn delete(&self, key: &str) -> Result<(), AppError>;

    /// Public URL an object is served from
    fn public_url(&self, key: &str) -> String;

    /// Recover the object key from a public URL (rows without a stored key)
    fn key_from_url(&self, url: &str) -> Option<String>;
}

pub(crate) fn build_s3_http_client() -> aws_sdk_s3::config::SharedHttpClient {
    use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;

    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();

    HyperClientBuilder::new().build(https_connector)
}
