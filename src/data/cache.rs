//! In-memory catalog store
//!
//! Volatile, cleared on restart. Uses Moka for concurrent caching.
//! Collections are filled by reads and dropped by admin writes so the
//! next read re-fetches from the database.

use moka::future::Cache;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::models::{Category, Image, Item, Service};
use super::query::ImageFilter;
use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, CACHE_SIZE};

/// Snapshot marker taken before a fetch.
///
/// A fetch that started before an invalidation must not repopulate the
/// store with rows read before the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

/// Cached catalog collections
pub struct CatalogStore {
    generation: AtomicU64,
    categories: Cache<(), Arc<Vec<Category>>>,
    /// Keyed by category scope (`None` = all items)
    items: Cache<Option<String>, Arc<Vec<Item>>>,
    services: Cache<(), Arc<Vec<Service>>>,
    images: Cache<ImageFilter, Arc<Vec<Image>>>,
}

fn build<K, V>(max_entries: u64, ttl: Duration) -> Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(max_entries)
        .time_to_live(ttl)
        .build()
}

async fn lookup<K, V>(cache: &Cache<K, V>, name: &str, key: &K) -> Option<V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let result = cache.get(key).await;
    if result.is_some() {
        CACHE_HITS_TOTAL.with_label_values(&[name]).inc();
    } else {
        CACHE_MISSES_TOTAL.with_label_values(&[name]).inc();
    }
    result
}

impl CatalogStore {
    /// Create new catalog store
    ///
    /// # Arguments
    /// * `ttl` - How long a fetched collection stays valid
    /// * `max_entries` - Maximum cached collections per kind
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        Self {
            generation: AtomicU64::new(0),
            categories: build(1, ttl),
            items: build(max_entries, ttl),
            services: build(1, ttl),
            images: build(max_entries, ttl),
        }
    }

    /// Current generation; pass it back to the matching `put_*`.
    pub fn generation(&self) -> Generation {
        Generation(self.generation.load(Ordering::Acquire))
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.generation.load(Ordering::Acquire) == generation.0
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Insert a fetched snapshot unless an invalidation has happened since
    /// `generation` was taken.
    ///
    /// Invalidations bump the generation before clearing, so one that
    /// lands during the insert is caught by the second check.
    async fn insert_current<K, V>(
        &self,
        cache: &Cache<K, V>,
        generation: Generation,
        key: K,
        value: V,
    ) where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        if !self.is_current(generation) {
            return;
        }
        cache.insert(key.clone(), value).await;
        self.discard_if_stale(cache, generation, &key).await;
    }

    async fn discard_if_stale<K, V>(&self, cache: &Cache<K, V>, generation: Generation, key: &K)
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        if !self.is_current(generation) {
            cache.invalidate(key).await;
        }
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn categories(&self) -> Option<Arc<Vec<Category>>> {
        lookup(&self.categories, "categories", &()).await
    }

    pub async fn put_categories(&self, generation: Generation, categories: Vec<Category>) {
        self.insert_current(&self.categories, generation, (), Arc::new(categories))
            .await;
    }

    // =========================================================================
    // Items
    // =========================================================================

    pub async fn items(&self, category_id: Option<&str>) -> Option<Arc<Vec<Item>>> {
        let key = category_id.map(str::to_string);
        lookup(&self.items, "items", &key).await
    }

    pub async fn put_items(
        &self,
        generation: Generation,
        category_id: Option<&str>,
        items: Vec<Item>,
    ) {
        let key = category_id.map(str::to_string);
        self.insert_current(&self.items, generation, key, Arc::new(items))
            .await;
        CACHE_SIZE
            .with_label_values(&["items"])
            .set(self.items.entry_count() as i64);
    }

    // =========================================================================
    // Services
    // =========================================================================

    pub async fn services(&self) -> Option<Arc<Vec<Service>>> {
        lookup(&self.services, "services", &()).await
    }

    pub async fn put_services(&self, generation: Generation, services: Vec<Service>) {
        self.insert_current(&self.services, generation, (), Arc::new(services))
            .await;
    }

    // =========================================================================
    // Images
    // =========================================================================

    pub async fn images(&self, filter: &ImageFilter) -> Option<Arc<Vec<Image>>> {
        lookup(&self.images, "images", filter).await
    }

    pub async fn put_images(&self, generation: Generation, filter: ImageFilter, images: Vec<Image>) {
        self.insert_current(&self.images, generation, filter, Arc::new(images))
            .await;
        CACHE_SIZE
            .with_label_values(&["images"])
            .set(self.images.entry_count() as i64);
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Drop category lists. Items are dropped too since a category delete
    /// detaches its items.
    pub fn invalidate_categories(&self) {
        self.bump();
        self.categories.invalidate_all();
        self.items.invalidate_all();
        self.images.invalidate_all();
    }

    pub fn invalidate_items(&self) {
        self.bump();
        self.items.invalidate_all();
        self.images.invalidate_all();
    }

    pub fn invalidate_services(&self) {
        self.bump();
        self.services.invalidate_all();
    }

    pub fn invalidate_images(&self) {
        self.bump();
        self.images.invalidate_all();
    }
}
