//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{
    Counter, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("storefront_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "storefront_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Database Metrics
    pub static ref DB_QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("storefront_db_queries_total", "Total number of database queries"),
        &["operation", "table"]
    ).expect("metric can be created");

    // Catalog store Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("storefront_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("storefront_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("storefront_cache_size", "Current number of entries in cache"),
        &["cache_name"]
    ).expect("metric can be created");

    // Storage Metrics
    pub static ref IMAGE_UPLOADS_TOTAL: IntCounter = IntCounter::new(
        "storefront_image_uploads_total",
        "Total number of gallery image uploads"
    ).expect("metric can be created");
    pub static ref IMAGE_BYTES_UPLOADED: Counter = Counter::new(
        "storefront_image_bytes_uploaded_total",
        "Total bytes of gallery images uploaded"
    ).expect("metric can be created");
    pub static ref STORAGE_CLEANUP_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "storefront_storage_cleanup_failures_total",
        "Best-effort object deletions that failed"
    ).expect("metric can be created");

    // Comment Metrics
    pub static ref COMMENTS_POSTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("storefront_comments_posted_total", "Total number of comments posted"),
        &["kind"]
    ).expect("metric can be created");
    pub static ref FEED_SUBSCRIBERS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("storefront_feed_subscribers", "Open change feed subscriptions"),
        &["feed"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("storefront_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; later calls leave the registry unchanged.
pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(DB_QUERIES_TOTAL.clone()),
        Box::new(CACHE_HITS_TOTAL.clone()),
        Box::new(CACHE_MISSES_TOTAL.clone()),
        Box::new(CACHE_SIZE.clone()),
        Box::new(IMAGE_UPLOADS_TOTAL.clone()),
        Box::new(IMAGE_BYTES_UPLOADED.clone()),
        Box::new(STORAGE_CLEANUP_FAILURES_TOTAL.clone()),
        Box::new(COMMENTS_POSTED_TOTAL.clone()),
        Box::new(FEED_SUBSCRIBERS.clone()),
        Box::new(ERRORS_TOTAL.clone()),
    ];

    for collector in collectors {
        if let Err(error) = REGISTRY.register(collector) {
            tracing::debug!(%error, "metric already registered");
        }
    }

    tracing::info!("Metrics registry initialized");
}

/// Record a database query against a table.
pub fn observe_db_query(operation: &str, table: &str) {
    DB_QUERIES_TOTAL.with_label_values(&[operation, table]).inc();
}
