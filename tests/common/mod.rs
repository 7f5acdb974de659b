//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use storefront::error::AppError;
use storefront::storage::ObjectStore;
use storefront::{AppState, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const ADMIN_USER_ID: &str = "admin-user";
pub const MEDIA_PUBLIC_URL: &str = "https://media.test.example.com";
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024;
pub const COMMENT_MAX_DEPTH: usize = 3;

/// Object store kept in memory so tests never reach a real bucket
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryObjectStore {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[axum::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{MEDIA_PUBLIC_URL}/{key}")
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        storefront::storage::object_key_from_public_url(url, MEDIA_PUBLIC_URL, "test-media")
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub storage: Arc<MemoryObjectStore>,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "test.example.com".to_string(),
                protocol: "https".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            storage: config::StorageConfig {
                media: config::MediaStorageConfig {
                    bucket: "test-media".to_string(),
                    public_url: MEDIA_PUBLIC_URL.to_string(),
                    max_upload_bytes: MAX_UPLOAD_BYTES,
                },
            },
            object_store: config::ObjectStoreConfig {
                endpoint: "http://127.0.0.1:9".to_string(),
                region: "auto".to_string(),
                access_key_id: "test-key".to_string(),
                secret_access_key: "test-secret".to_string(),
            },
            auth: config::AuthConfig {
                token_secret: "test-secret-key-that-is-32-bytes-long".to_string(),
                admin_user_ids: vec![ADMIN_USER_ID.to_string()],
            },
            cache: config::CacheConfig {
                catalog_ttl: 300,
                catalog_max_entries: 64,
            },
            comments: config::CommentsConfig {
                max_length: 500,
                max_depth: COMMENT_MAX_DEPTH,
                feed_capacity: 64,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let storage = Arc::new(MemoryObjectStore::default());
        let state = AppState::with_storage(config, storage.clone())
            .await
            .unwrap();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = storefront::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            storage,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Create an identity token for `user_id`
    pub fn create_test_token(&self, user_id: &str) -> String {
        use chrono::{Duration, Utc};
        use storefront::auth::session::{Session, create_session_token};

        let session = Session {
            user_id: user_id.to_string(),
            email: Some(format!("{user_id}@test.example.com")),
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(7),
        };

        create_session_token(&session, &self.state.config.auth.token_secret)
            .expect("Failed to create test token")
    }

    pub fn admin_token(&self) -> String {
        self.create_test_token(ADMIN_USER_ID)
    }

    /// POST JSON to an admin route and return the created body
    pub async fn admin_post(&self, path: &str, body: Value) -> Value {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(self.admin_token())
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "POST {path} failed");
        response.json().await.unwrap()
    }

    pub async fn create_category(&self, name: &str) -> Value {
        self.admin_post("/admin/categories", json!({ "name": name }))
            .await
    }

    pub async fn create_item(&self, category_id: Option<&str>, name: &str, price_cents: i64) -> Value {
        self.admin_post(
            "/admin/items",
            json!({
                "category_id": category_id,
                "name": name,
                "price_cents": price_cents,
            }),
        )
        .await
    }
}
