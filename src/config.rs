//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub object_store: ObjectStoreConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub comments: CommentsConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "shop.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the storefront
    ///
    /// # Returns
    /// Full URL like "https://shop.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub media: MediaStorageConfig,
}

/// Media storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MediaStorageConfig {
    /// Bucket name for gallery images
    pub bucket: String,
    /// Public URL for media
    /// e.g., "https://media.example.com"
    pub public_url: String,
    /// Largest accepted upload in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

/// S3-compatible object store credentials
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreConfig {
    /// Endpoint URL (e.g., "https://<account>.r2.cloudflarestorage.com")
    pub endpoint: String,
    /// Region ("auto" for R2)
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Authentication configuration
///
/// Identity tokens are minted by the identity provider and signed with
/// `token_secret`; this service only verifies them.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC secret (32+ bytes)
    pub token_secret: String,
    /// Users promoted to the admin role at startup
    #[serde(default)]
    pub admin_user_ids: Vec<String>,
}

/// Catalog store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Catalog entry TTL in seconds (default: 300)
    pub catalog_ttl: u64,
    /// Maximum cached collections per kind (default: 256)
    pub catalog_max_entries: u64,
}

/// Comment subsystem configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CommentsConfig {
    /// Maximum comment length in characters (default: 2000)
    pub max_length: usize,
    /// Deepest allowed reply level below a root comment (default: 32)
    pub max_depth: usize,
    /// Change feed buffer per subscriber (default: 256)
    pub feed_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (STOREFRONT__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/storefront.db")?
            .set_default("storage.media.max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("object_store.region", "auto")?
            .set_default("cache.catalog_ttl", 300)?
            .set_default("cache.catalog_max_entries", 256)?
            .set_default("comments.max_length", 2000)?
            .set_default("comments.max_depth", 32)?
            .set_default("comments.feed_capacity", 256)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (STOREFRONT__*)
            .add_source(
                Environment::with_prefix("STOREFRONT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.admin_user_ids")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Public deployments must be served over https; loopback and
    /// `localhost` domains may use plain http.
    pub fn requires_https(&self) -> bool {
        !is_local_server_domain(&self.server.domain)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_TOKEN_SECRET_BYTES: usize = 32;
        // Reply deletes cascade one trigger level per reply; SQLite stops at 1000.
        const MAX_COMMENT_DEPTH: usize = 256;

        if self.auth.token_secret.len() < MIN_TOKEN_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.token_secret must be at least {} bytes",
                MIN_TOKEN_SECRET_BYTES
            )));
        }

        if self.storage.media.max_upload_bytes == 0 {
            return Err(crate::error::AppError::Config(
                "storage.media.max_upload_bytes must be greater than 0".to_string(),
            ));
        }

        if self.comments.max_length == 0 || self.comments.feed_capacity == 0 {
            return Err(crate::error::AppError::Config(
                "comments.max_length and comments.feed_capacity must be greater than 0"
                    .to_string(),
            ));
        }

        if self.comments.max_depth > MAX_COMMENT_DEPTH {
            return Err(crate::error::AppError::Config(format!(
                "comments.max_depth must be at most {}",
                MAX_COMMENT_DEPTH
            )));
        }

        if url::Url::parse(&self.storage.media.public_url).is_err() {
            return Err(crate::error::AppError::Config(
                "storage.media.public_url must be an absolute URL".to_string(),
            ));
        }

        let https = self.server.protocol.eq_ignore_ascii_case("https");
        if !https && !self.requires_https() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Serving over plain http for local development"
            );
        } else if !https {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
