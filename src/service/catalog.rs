//! Catalog service
//!
//! Storefront reads for categories, items and services, plus the admin
//! writes that maintain them. Reads go through the catalog store; every
//! successful write invalidates the affected collections.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::gallery::{normalize_optional_text, remove_objects};
use crate::data::{
    Attachment, CatalogStore, Category, Database, EntityId, Image, ImageFilter, Item, ListOrder,
    PricingTier, Service,
};
use crate::error::AppError;
use crate::storage::ObjectStore;

fn required_name(name: &str, what: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(format!("{what} name is required")));
    }
    Ok(name.to_string())
}

fn non_negative_price(price_cents: i64) -> Result<i64, AppError> {
    if price_cents < 0 {
        return Err(AppError::Validation(
            "price_cents must not be negative".to_string(),
        ));
    }
    Ok(price_cents)
}

/// Category create/update body
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Item create/update body
#[derive(Debug, Clone, Deserialize)]
pub struct ItemInput {
    #[serde(default)]
    pub category_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Pricing tier create/update body
#[derive(Debug, Clone, Deserialize)]
pub struct TierInput {
    pub duration_days: i64,
    pub price_cents: i64,
}

/// Service create/update body
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price_cents: Option<i64>,
}

/// Category with its items and images
#[derive(Debug, Serialize)]
pub struct CategoryDetail {
    #[serde(flatten)]
    pub category: Category,
    pub items: Vec<Item>,
    pub images: Vec<Image>,
}

/// Item with its pricing tiers and images
#[derive(Debug, Serialize)]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: Item,
    pub pricing_tiers: Vec<PricingTier>,
    pub images: Vec<Image>,
}

/// Catalog service
pub struct CatalogService {
    db: Arc<Database>,
    catalog: Arc<CatalogStore>,
    storage: Arc<dyn ObjectStore>,
}

impl CatalogService {
    pub fn new(db: Arc<Database>, catalog: Arc<CatalogStore>, storage: Arc<dyn ObjectStore>) -> Self {
        Self {
            db,
            catalog,
            storage,
        }
    }

    // =========================================================================
    // Storefront reads
    // =========================================================================

    /// All categories, by name
    pub async fn list_categories(&self) -> Result<Vec<Category>, AppError> {
        if let Some(cached) = self.catalog.categories().await {
            return Ok(cached.as_ref().clone());
        }

        let generation = self.catalog.generation();
        let categories = self.db.list_categories(ListOrder::by_name()).await?;
        self.catalog
            .put_categories(generation, categories.clone())
            .await;
        Ok(categories)
    }

    pub async fn category_detail(&self, id: &str) -> Result<CategoryDetail, AppError> {
        let category = self.db.get_category(id).await?.ok_or(AppError::NotFound)?;
        let items = self.list_items(Some(id), None).await?;
        let images = self
            .db
            .list_images(&ImageFilter {
                image_type: None,
                attachment: Some(Attachment::Category(category.id.clone())),
            })
            .await?;

        Ok(CategoryDetail {
            category,
            items,
            images,
        })
    }

    /// Items by name, optionally scoped to a category and filtered by a
    /// case-insensitive match on name or description.
    pub async fn list_items(
        &self,
        category_id: Option<&str>,
        query: Option<&str>,
    ) -> Result<Vec<Item>, AppError> {
        let items = match self.catalog.items(category_id).await {
            Some(cached) => cached.as_ref().clone(),
            None => {
                let generation = self.catalog.generation();
                let items = self.db.list_items(category_id, ListOrder::by_name()).await?;
                self.catalog
                    .put_items(generation, category_id, items.clone())
                    .await;
                items
            }
        };

        let Some(needle) = query
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty())
        else {
            return Ok(items);
        };

        Ok(items
            .into_iter()
            .filter(|item| {
                item.name.to_lowercase().contains(&needle)
                    || item
                        .description
                        .as_deref()
                        .is_some_and(|description| description.to_lowercase().contains(&needle))
            })
            .collect())
    }

    pub async fn item_detail(&self, id: &str) -> Result<ItemDetail, AppError> {
        let item = self.get_item(id).await?;
        let pricing_tiers = self.db.list_pricing_tiers(&item.id).await?;
        let images = self
            .db
            .list_images(&ImageFilter {
                image_type: None,
                attachment: Some(Attachment::Item(item.id.clone())),
            })
            .await?;

        Ok(ItemDetail {
            item,
            pricing_tiers,
            images,
        })
    }

    pub async fn get_item(&self, id: &str) -> Result<Item, AppError> {
        self.db.get_item(id).await?.ok_or(AppError::NotFound)
    }

    /// All services, by name
    pub async fn list_services(&self) -> Result<Vec<Service>, AppError> {
        if let Some(cached) = self.catalog.services().await {
            return Ok(cached.as_ref().clone());
        }

        let generation = self.catalog.generation();
        let services = self.db.list_services(ListOrder::by_name()).await?;
        self.catalog
            .put_services(generation, services.clone())
            .await;
        Ok(services)
    }

    pub async fn get_service(&self, id: &str) -> Result<Service, AppError> {
        self.db.get_service(id).await?.ok_or(AppError::NotFound)
    }

    // =========================================================================
    // Admin: categories
    // =========================================================================

    pub async fn admin_list_categories(&self, order: ListOrder) -> Result<Vec<Category>, AppError> {
        self.db.list_categories(order).await
    }

    pub async fn create_category(&self, input: CategoryInput) -> Result<Category, AppError> {
        let now = Utc::now();
        let category = Category {
            id: EntityId::new().0,
            name: required_name(&input.name, "category")?,
            description: normalize_optional_text(input.description),
            image_url: normalize_optional_text(input.image_url),
            created_at: now,
            updated_at: now,
        };

        self.db.insert_category(&category).await?;
        self.catalog.invalidate_categories();
        tracing::info!(category_id = %category.id, name = %category.name, "Category created");

        Ok(category)
    }

    pub async fn update_category(&self, id: &str, input: CategoryInput) -> Result<Category, AppError> {
        let mut category = self.db.get_category(id).await?.ok_or(AppError::NotFound)?;
        category.name = required_name(&input.name, "category")?;
        category.description = normalize_optional_text(input.description);
        category.image_url = normalize_optional_text(input.image_url);
        category.updated_at = Utc::now();

        if !self.db.update_category(&category).await? {
            return Err(AppError::NotFound);
        }
        self.catalog.invalidate_categories();

        Ok(category)
    }

    /// Delete a category
    ///
    /// Its items are kept without a category; its images and comments go
    /// with it. Image objects are removed after the rows.
    pub async fn delete_category(&self, id: &str) -> Result<(), AppError> {
        let images = self
            .db
            .delete_category(id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.catalog.invalidate_categories();

        remove_objects(self.storage.as_ref(), &images).await;
        tracing::info!(category_id = %id, images = images.len(), "Category deleted");

        Ok(())
    }

    // =========================================================================
    // Admin: items
    // =========================================================================

    pub async fn admin_list_items(
        &self,
        category_id: Option<&str>,
        order: ListOrder,
    ) -> Result<Vec<Item>, AppError> {
        self.db.list_items(category_id, order).await
    }

    async fn ensure_category_exists(&self, category_id: Option<&str>) -> Result<(), AppError> {
        if let Some(category_id) = category_id {
            if self.db.get_category(category_id).await?.is_none() {
                return Err(AppError::Validation(format!(
                    "category {category_id} does not exist"
                )));
            }
        }
        Ok(())
    }

    pub async fn create_item(&self, input: ItemInput) -> Result<Item, AppError> {
        let category_id = normalize_optional_text(input.category_id);
        let name = required_name(&input.name, "item")?;
        let price_cents = non_negative_price(input.price_cents)?;
        self.ensure_category_exists(category_id.as_deref()).await?;

        let now = Utc::now();
        let item = Item {
            id: EntityId::new().0,
            category_id,
            name,
            description: normalize_optional_text(input.description),
            price_cents,
            image_url: normalize_optional_text(input.image_url),
            created_at: now,
            updated_at: now,
        };

        self.db.insert_item(&item).await?;
        self.catalog.invalidate_items();
        tracing::info!(item_id = %item.id, name = %item.name, "Item created");

        Ok(item)
    }

    pub async fn update_item(&self, id: &str, input: ItemInput) -> Result<Item, AppError> {
        let mut item = self.get_item(id).await?;
        let category_id = normalize_optional_text(input.category_id);
        item.name = required_name(&input.name, "item")?;
        item.price_cents = non_negative_price(input.price_cents)?;
        self.ensure_category_exists(category_id.as_deref()).await?;
        item.category_id = category_id;
        item.description = normalize_optional_text(input.description);
        item.image_url = normalize_optional_text(input.image_url);
        item.updated_at = Utc::now();

        if !self.db.update_item(&item).await? {
            return Err(AppError::NotFound);
        }
        self.catalog.invalidate_items();

        Ok(item)
    }

    /// Delete an item with its tiers, images and comments
    pub async fn delete_item(&self, id: &str) -> Result<(), AppError> {
        let images = self.db.delete_item(id).await?.ok_or(AppError::NotFound)?;
        self.catalog.invalidate_items();

        remove_objects(self.storage.as_ref(), &images).await;
        tracing::info!(item_id = %id, images = images.len(), "Item deleted");

        Ok(())
    }

    // =========================================================================
    // Admin: pricing tiers
    // =========================================================================

    /// Tiers of an item, shortest duration first
    pub async fn list_tiers(&self, item_id: &str) -> Result<Vec<PricingTier>, AppError> {
        let item = self.get_item(item_id).await?;
        self.db.list_pricing_tiers(&item.id).await
    }

    fn validate_tier(input: &TierInput) -> Result<(), AppError> {
        if input.duration_days <= 0 {
            return Err(AppError::Validation(
                "duration_days must be greater than 0".to_string(),
            ));
        }
        non_negative_price(input.price_cents)?;
        Ok(())
    }

    /// Add a tier; one tier per duration and item.
    pub async fn create_tier(&self, item_id: &str, input: TierInput) -> Result<PricingTier, AppError> {
        Self::validate_tier(&input)?;
        let item = self.get_item(item_id).await?;

        let tier = PricingTier {
            id: EntityId::new().0,
            item_id: item.id,
            duration_days: input.duration_days,
            price_cents: input.price_cents,
            created_at: Utc::now(),
        };
        self.db.insert_pricing_tier(&tier).await?;

        Ok(tier)
    }

    pub async fn update_tier(&self, id: &str, input: TierInput) -> Result<PricingTier, AppError> {
        Self::validate_tier(&input)?;
        let mut tier = self.db.get_pricing_tier(id).await?.ok_or(AppError::NotFound)?;
        tier.duration_days = input.duration_days;
        tier.price_cents = input.price_cents;

        if !self.db.update_pricing_tier(&tier).await? {
            return Err(AppError::NotFound);
        }

        Ok(tier)
    }

    pub async fn delete_tier(&self, id: &str) -> Result<(), AppError> {
        if !self.db.delete_pricing_tier(id).await? {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Admin: services
    // =========================================================================

    pub async fn admin_list_services(&self, order: ListOrder) -> Result<Vec<Service>, AppError> {
        self.db.list_services(order).await
    }

    pub async fn create_service(&self, input: ServiceInput) -> Result<Service, AppError> {
        let now = Utc::now();
        let service = Service {
            id: EntityId::new().0,
            name: required_name(&input.name, "service")?,
            description: normalize_optional_text(input.description),
            price_cents: input.price_cents.map(non_negative_price).transpose()?,
            created_at: now,
            updated_at: now,
        };

        self.db.insert_service(&service).await?;
        self.catalog.invalidate_services();
        tracing::info!(service_id = %service.id, name = %service.name, "Service created");

        Ok(service)
    }

    pub async fn update_service(&self, id: &str, input: ServiceInput) -> Result<Service, AppError> {
        let mut service = self.get_service(id).await?;
        service.name = required_name(&input.name, "service")?;
        service.description = normalize_optional_text(input.description);
        service.price_cents = input.price_cents.map(non_negative_price).transpose()?;
        service.updated_at = Utc::now();

        if !self.db.update_service(&service).await? {
            return Err(AppError::NotFound);
        }
        self.catalog.invalidate_services();

        Ok(service)
    }

    pub async fn delete_service(&self, id: &str) -> Result<(), AppError> {
        if !self.db.delete_service(id).await? {
            return Err(AppError::NotFound);
        }
        self.catalog.invalidate_services();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::storage::MockObjectStore;

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("service-catalog.db");
        let db = Database::connect(&db_path).await.unwrap();
        (Arc::new(db), temp_dir)
    }

    fn create_service(db: Arc<Database>, storage: MockObjectStore) -> CatalogService {
        let catalog = Arc::new(CatalogStore::new(Duration::from_secs(60), 16));
        CatalogService::new(db, catalog, Arc::new(storage))
    }

    fn category_input(name: &str) -> CategoryInput {
        CategoryInput {
            name: name.to_string(),
            description: None,
            image_url: None,
        }
    }

    fn item_input(category_id: Option<&str>, name: &str, price_cents: i64) -> ItemInput {
        ItemInput {
            category_id: category_id.map(str::to_string),
            name: name.to_string(),
            description: None,
            price_cents,
            image_url: None,
        }
    }

    fn image_row(id: &str, attachment: &Attachment, storage_key: Option<&str>) -> Image {
        Image {
            id: id.to_string(),
            image_type: "proofs".to_string(),
            item_id: attachment.item_id().map(str::to_string),
            category_id: attachment.category_id().map(str::to_string),
            title: None,
            url: format!("https://media.test/proofs/{id}.png"),
            storage_key: storage_key.map(str::to_string),
            content_type: "image/png".to_string(),
            file_size: 1,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn category_list_reflects_writes() {
        let (db, _temp_dir) = create_test_db().await;
        let service = create_service(db, MockObjectStore::new());

        assert!(service.list_categories().await.unwrap().is_empty());

        let created = service
            .create_category(CategoryInput {
                name: "  Streaming  ".to_string(),
                description: Some("   ".to_string()),
                image_url: None,
            })
            .await
            .unwrap();
        assert_eq!(created.name, "Streaming");
        assert_eq!(created.description, None);
        service.create_category(category_input("Gaming")).await.unwrap();

        let names: Vec<String> = service
            .list_categories()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Gaming", "Streaming"]);

        service
            .update_category(&created.id, category_input("Video"))
            .await
            .unwrap();
        let names: Vec<String> = service
            .list_categories()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Gaming", "Video"]);
    }

    #[tokio::test]
    async fn category_validation_and_conflicts() {
        let (db, _temp_dir) = create_test_db().await;
        let service = create_service(db, MockObjectStore::new());

        assert!(matches!(
            service.create_category(category_input("   ")).await,
            Err(AppError::Validation(_))
        ));
        service.create_category(category_input("Gaming")).await.unwrap();
        assert!(matches!(
            service.create_category(category_input("Gaming")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            service.update_category("missing", category_input("x")).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn item_query_filters_name_and_description() {
        let (db, _temp_dir) = create_test_db().await;
        let service = create_service(db, MockObjectStore::new());
        let category = service.create_category(category_input("Streaming")).await.unwrap();

        service
            .create_item(item_input(Some(&category.id), "Netflix Premium", 1500))
            .await
            .unwrap();
        let mut described = item_input(None, "Music", 500);
        described.description = Some("Spotify family plan".to_string());
        service.create_item(described).await.unwrap();

        let all = service.list_items(None, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let hits = service.list_items(None, Some("  SPOTIFY ")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Music");

        let scoped = service.list_items(Some(&category.id), None).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].name, "Netflix Premium");
    }

    #[tokio::test]
    async fn item_validation() {
        let (db, _temp_dir) = create_test_db().await;
        let service = create_service(db, MockObjectStore::new());

        assert!(matches!(
            service.create_item(item_input(None, "Cheap", -1)).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.create_item(item_input(None, "", 1)).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.create_item(item_input(Some("ghost"), "Orphan", 1)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn item_detail_includes_sorted_tiers() {
        let (db, _temp_dir) = create_test_db().await;
        let service = create_service(db, MockObjectStore::new());
        let item = service.create_item(item_input(None, "VPN", 300)).await.unwrap();

        for (days, price) in [(365, 3000), (30, 300), (90, 800)] {
            service
                .create_tier(
                    &item.id,
                    TierInput {
                        duration_days: days,
                        price_cents: price,
                    },
                )
                .await
                .unwrap();
        }

        let detail = service.item_detail(&item.id).await.unwrap();
        let durations: Vec<i64> = detail.pricing_tiers.iter().map(|t| t.duration_days).collect();
        assert_eq!(durations, vec![30, 90, 365]);
        assert!(detail.images.is_empty());

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["name"], "VPN");
        assert_eq!(json["pricing_tiers"][0]["duration_days"], 30);
    }

    #[tokio::test]
    async fn tier_rules() {
        let (db, _temp_dir) = create_test_db().await;
        let service = create_service(db, MockObjectStore::new());
        let item = service.create_item(item_input(None, "VPN", 300)).await.unwrap();
        let monthly = TierInput {
            duration_days: 30,
            price_cents: 300,
        };

        let tier = service.create_tier(&item.id, monthly.clone()).await.unwrap();
        assert!(matches!(
            service.create_tier(&item.id, monthly.clone()).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            service
                .create_tier(
                    &item.id,
                    TierInput {
                        duration_days: 0,
                        price_cents: 1
                    }
                )
                .await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.create_tier("missing", monthly).await,
            Err(AppError::NotFound)
        ));

        let updated = service
            .update_tier(
                &tier.id,
                TierInput {
                    duration_days: 31,
                    price_cents: 350,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.duration_days, 31);

        service.delete_tier(&tier.id).await.unwrap();
        assert!(service.list_tiers(&item.id).await.unwrap().is_empty());
        assert!(matches!(service.delete_tier(&tier.id).await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn deleting_category_keeps_items_and_removes_image_objects() {
        let (db, _temp_dir) = create_test_db().await;
        let mut storage = MockObjectStore::new();
        storage
            .expect_delete()
            .withf(|key| key == "proofs/cat-shot.png")
            .times(1)
            .returning(|_| Ok(()));
        let service = create_service(db.clone(), storage);

        let category = service.create_category(category_input("Gaming")).await.unwrap();
        let item = service
            .create_item(item_input(Some(&category.id), "Steam Wallet", 1000))
            .await
            .unwrap();
        // Prime the cache so the delete has something to invalidate.
        assert_eq!(service.list_items(None, None).await.unwrap().len(), 1);
        db.insert_image(&image_row(
            "cat-shot",
            &Attachment::Category(category.id.clone()),
            Some("proofs/cat-shot.png"),
        ))
        .await
        .unwrap();

        service.delete_category(&category.id).await.unwrap();

        let survivor = service.get_item(&item.id).await.unwrap();
        assert_eq!(survivor.category_id, None);
        let listed = service.list_items(None, None).await.unwrap();
        assert_eq!(listed[0].category_id, None);
        assert!(db.get_image("cat-shot").await.unwrap().is_none());
        assert!(matches!(
            service.delete_category(&category.id).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn deleting_item_survives_storage_failures() {
        let (db, _temp_dir) = create_test_db().await;
        let mut storage = MockObjectStore::new();
        storage
            .expect_delete()
            .times(1)
            .returning(|_| Err(AppError::Storage("offline".to_string())));
        storage.expect_key_from_url().times(1).returning(|_| None);
        let service = create_service(db.clone(), storage);

        let item = service.create_item(item_input(None, "VPN", 300)).await.unwrap();
        let attachment = Attachment::Item(item.id.clone());
        db.insert_image(&image_row("keyed", &attachment, Some("proofs/keyed.png")))
            .await
            .unwrap();
        db.insert_image(&image_row("legacy", &attachment, None))
            .await
            .unwrap();

        service.delete_item(&item.id).await.unwrap();

        assert!(matches!(service.get_item(&item.id).await, Err(AppError::NotFound)));
        assert!(db.get_image("keyed").await.unwrap().is_none());
        assert!(db.get_image("legacy").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn service_crud_and_price_rules() {
        let (db, _temp_dir) = create_test_db().await;
        let service = create_service(db, MockObjectStore::new());

        let created = service
            .create_service(ServiceInput {
                name: "Discord bot".to_string(),
                description: Some("Custom moderation bot".to_string()),
                price_cents: None,
            })
            .await
            .unwrap();
        assert_eq!(service.list_services().await.unwrap().len(), 1);

        assert!(matches!(
            service
                .update_service(
                    &created.id,
                    ServiceInput {
                        name: "Discord bot".to_string(),
                        description: None,
                        price_cents: Some(-5),
                    }
                )
                .await,
            Err(AppError::Validation(_))
        ));

        let updated = service
            .update_service(
                &created.id,
                ServiceInput {
                    name: "Discord bot".to_string(),
                    description: None,
                    price_cents: Some(2500),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.price_cents, Some(2500));
        assert_eq!(
            service.get_service(&created.id).await.unwrap().price_cents,
            Some(2500)
        );

        service.delete_service(&created.id).await.unwrap();
        assert!(service.list_services().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn admin_lists_honor_sort_order() {
        let (db, _temp_dir) = create_test_db().await;
        let service = create_service(db, MockObjectStore::new());
        for (name, price) in [("B", 200), ("A", 300), ("C", 100)] {
            service.create_item(item_input(None, name, price)).await.unwrap();
        }

        let by_price = service
            .admin_list_items(
                None,
                ListOrder {
                    column: "price_cents",
                    descending: true,
                },
            )
            .await
            .unwrap();
        let names: Vec<&str> = by_price.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }
}
