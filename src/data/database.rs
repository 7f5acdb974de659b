//! SQLite database operations
//!
//! All database access goes through this module.
//! Referential and mutual-exclusivity rules live in the schema's check
//! constraints; callers get their violations back as `AppError`.

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use super::query::{ImageFilter, ListOrder};
use crate::error::AppError;
use crate::metrics::observe_db_query;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (creating if needed) the SQLite file and run migrations.
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    pub async fn get_profile(&self, id: &str) -> Result<Option<Profile>, AppError> {
        observe_db_query("select", "profiles");
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    /// Return the profile for `id`, creating a `user` profile if absent.
    ///
    /// Concurrent first requests for the same user are safe: the insert
    /// is a no-op when the row already exists.
    pub async fn ensure_profile(&self, id: &str, email: Option<&str>) -> Result<Profile, AppError> {
        observe_db_query("insert", "profiles");
        sqlx::query(
            "INSERT INTO profiles (id, email, role, created_at) VALUES (?, ?, ?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(email)
        .bind(Role::User.as_str())
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_profile(id).await?.ok_or(AppError::NotFound)
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, AppError> {
        observe_db_query("select", "profiles");
        let profiles =
            sqlx::query_as::<_, Profile>("SELECT * FROM profiles ORDER BY created_at DESC, id DESC")
                .fetch_all(&self.pool)
                .await?;

        Ok(profiles)
    }

    /// Set a profile's role
    ///
    /// # Returns
    /// `false` if no such profile exists
    pub async fn set_profile_role(&self, id: &str, role: Role) -> Result<bool, AppError> {
        observe_db_query("update", "profiles");
        let result = sqlx::query("UPDATE profiles SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn list_categories(&self, order: ListOrder) -> Result<Vec<Category>, AppError> {
        observe_db_query("select", "categories");
        let sql = format!("SELECT * FROM categories {}", order.to_sql());
        let categories = sqlx::query_as::<_, Category>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(categories)
    }

    pub async fn get_category(&self, id: &str) -> Result<Option<Category>, AppError> {
        observe_db_query("select", "categories");
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(category)
    }

    pub async fn insert_category(&self, category: &Category) -> Result<(), AppError> {
        observe_db_query("insert", "categories");
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description, image_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.image_url)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update mutable category columns
    ///
    /// # Returns
    /// `false` if the category does not exist
    pub async fn update_category(&self, category: &Category) -> Result<bool, AppError> {
        observe_db_query("update", "categories");
        let result = sqlx::query(
            r#"
            UPDATE categories
            SET name = ?, description = ?, image_url = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.image_url)
        .bind(category.updated_at)
        .bind(&category.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a category together with its image rows.
    ///
    /// Returns the removed images, or `None` if the category does not
    /// exist. Items are detached; comments cascade.
    pub async fn delete_category(&self, id: &str) -> Result<Option<Vec<Image>>, AppError> {
        self.delete_with_images(&Attachment::Category(id.to_string()))
            .await
    }

    // =========================================================================
    // Items
    // =========================================================================

    /// List items, optionally restricted to one category
    pub async fn list_items(
        &self,
        category_id: Option<&str>,
        order: ListOrder,
    ) -> Result<Vec<Item>, AppError> {
        observe_db_query("select", "items");
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM items");
        if let Some(category_id) = category_id {
            builder.push(" WHERE category_id = ").push_bind(category_id);
        }
        builder.push(" ").push(order.to_sql());

        let items = builder
            .build_query_as::<Item>()
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<Item>, AppError> {
        observe_db_query("select", "items");
        let item = sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    pub async fn insert_item(&self, item: &Item) -> Result<(), AppError> {
        observe_db_query("insert", "items");
        sqlx::query(
            r#"
            INSERT INTO items (
                id, category_id, name, description, price_cents, image_url,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.category_id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.price_cents)
        .bind(&item.image_url)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_item(&self, item: &Item) -> Result<bool, AppError> {
        observe_db_query("update", "items");
        let result = sqlx::query(
            r#"
            UPDATE items
            SET category_id = ?, name = ?, description = ?, price_cents = ?,
                image_url = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&item.category_id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.price_cents)
        .bind(&item.image_url)
        .bind(item.updated_at)
        .bind(&item.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete an item together with its image rows.
    ///
    /// Returns the removed images, or `None` if the item does not exist.
    /// Tiers and comments cascade.
    pub async fn delete_item(&self, id: &str) -> Result<Option<Vec<Image>>, AppError> {
        self.delete_with_images(&Attachment::Item(id.to_string()))
            .await
    }

    /// Image rows are deleted first so the transaction holds the write
    /// lock before anything is read; an upload racing the delete either
    /// commits first and is returned here, or fails its foreign key.
    async fn delete_with_images(
        &self,
        target: &Attachment,
    ) -> Result<Option<Vec<Image>>, AppError> {
        let (table, column, id) = match target {
            Attachment::Category(id) => ("categories", "category_id", id),
            Attachment::Item(id) => ("items", "item_id", id),
        };

        let mut tx = self.pool.begin().await?;

        observe_db_query("delete", "images");
        let images = sqlx::query_as::<_, Image>(&format!(
            "DELETE FROM images WHERE {column} = ? RETURNING *"
        ))
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        observe_db_query("delete", table);
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;

        Ok(Some(images))
    }

    // =========================================================================
    // Pricing tiers
    // =========================================================================

    /// Tiers for an item, shortest duration first
    pub async fn list_pricing_tiers(&self, item_id: &str) -> Result<Vec<PricingTier>, AppError> {
        observe_db_query("select", "pricing_tiers");
        let tiers = sqlx::query_as::<_, PricingTier>(
            "SELECT * FROM pricing_tiers WHERE item_id = ? ORDER BY duration_days ASC",
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tiers)
    }

    pub async fn get_pricing_tier(&self, id: &str) -> Result<Option<PricingTier>, AppError> {
        observe_db_query("select", "pricing_tiers");
        let tier = sqlx::query_as::<_, PricingTier>("SELECT * FROM pricing_tiers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tier)
    }

    pub async fn insert_pricing_tier(&self, tier: &PricingTier) -> Result<(), AppError> {
        observe_db_query("insert", "pricing_tiers");
        sqlx::query(
            r#"
            INSERT INTO pricing_tiers (id, item_id, duration_days, price_cents, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tier.id)
        .bind(&tier.item_id)
        .bind(tier.duration_days)
        .bind(tier.price_cents)
        .bind(tier.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_pricing_tier(&self, tier: &PricingTier) -> Result<bool, AppError> {
        observe_db_query("update", "pricing_tiers");
        let result =
            sqlx::query("UPDATE pricing_tiers SET duration_days = ?, price_cents = ? WHERE id = ?")
                .bind(tier.duration_days)
                .bind(tier.price_cents)
                .bind(&tier.id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_pricing_tier(&self, id: &str) -> Result<bool, AppError> {
        observe_db_query("delete", "pricing_tiers");
        let result = sqlx::query("DELETE FROM pricing_tiers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Services
    // =========================================================================

    pub async fn list_services(&self, order: ListOrder) -> Result<Vec<Service>, AppError> {
        observe_db_query("select", "services");
        let sql = format!("SELECT * FROM services {}", order.to_sql());
        let services = sqlx::query_as::<_, Service>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(services)
    }

    pub async fn get_service(&self, id: &str) -> Result<Option<Service>, AppError> {
        observe_db_query("select", "services");
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(service)
    }

    pub async fn insert_service(&self, service: &Service) -> Result<(), AppError> {
        observe_db_query("insert", "services");
        sqlx::query(
            r#"
            INSERT INTO services (id, name, description, price_cents, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&service.id)
        .bind(&service.name)
        .bind(&service.description)
        .bind(service.price_cents)
        .bind(service.created_at)
        .bind(service.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_service(&self, service: &Service) -> Result<bool, AppError> {
        observe_db_query("update", "services");
        let result = sqlx::query(
            r#"
            UPDATE services
            SET name = ?, description = ?, price_cents = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&service.name)
        .bind(&service.description)
        .bind(service.price_cents)
        .bind(service.updated_at)
        .bind(&service.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_service(&self, id: &str) -> Result<bool, AppError> {
        observe_db_query("delete", "services");
        let result = sqlx::query("DELETE FROM services WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// Gallery images matching `filter`, newest first
    pub async fn list_images(&self, filter: &ImageFilter) -> Result<Vec<Image>, AppError> {
        observe_db_query("select", "images");
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM images WHERE 1 = 1");
        if let Some(image_type) = filter.image_type {
            builder
                .push(" AND image_type = ")
                .push_bind(image_type.as_str());
        }
        match &filter.attachment {
            Some(Attachment::Category(id)) => {
                builder.push(" AND category_id = ").push_bind(id.clone());
            }
            Some(Attachment::Item(id)) => {
                builder.push(" AND item_id = ").push_bind(id.clone());
            }
            None => {}
        }
        builder.push(" ORDER BY created_at DESC, id DESC");

        let images = builder
            .build_query_as::<Image>()
            .fetch_all(&self.pool)
            .await?;

        Ok(images)
    }

    pub async fn get_image(&self, id: &str) -> Result<Option<Image>, AppError> {
        observe_db_query("select", "images");
        let image = sqlx::query_as::<_, Image>("SELECT * FROM images WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(image)
    }

    pub async fn insert_image(&self, image: &Image) -> Result<(), AppError> {
        observe_db_query("insert", "images");
        sqlx::query(
            r#"
            INSERT INTO images (
                id, image_type, item_id, category_id, title, url, storage_key,
                content_type, file_size, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&image.id)
        .bind(&image.image_type)
        .bind(&image.item_id)
        .bind(&image.category_id)
        .bind(&image.title)
        .bind(&image.url)
        .bind(&image.storage_key)
        .bind(&image.content_type)
        .bind(image.file_size)
        .bind(image.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update title and type of an image
    pub async fn update_image_metadata(&self, image: &Image) -> Result<bool, AppError> {
        observe_db_query("update", "images");
        let result = sqlx::query("UPDATE images SET title = ?, image_type = ? WHERE id = ?")
            .bind(&image.title)
            .bind(&image.image_type)
            .bind(&image.id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_image(&self, id: &str) -> Result<bool, AppError> {
        observe_db_query("delete", "images");
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// Flat comment list for a category or item, newest first
    pub async fn list_comments(&self, attachment: &Attachment) -> Result<Vec<Comment>, AppError> {
        observe_db_query("select", "comments");
        let (column, id) = match attachment {
            Attachment::Category(id) => ("category_id", id),
            Attachment::Item(id) => ("item_id", id),
        };
        let sql = format!(
            "SELECT * FROM comments WHERE {column} = ? ORDER BY created_at DESC, id DESC"
        );
        let comments = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        Ok(comments)
    }

    pub async fn get_comment(&self, id: &str) -> Result<Option<Comment>, AppError> {
        observe_db_query("select", "comments");
        let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(comment)
    }

    /// Number of ancestors above comment `id`; 0 for a root.
    ///
    /// The walk stops once it passes `limit`, so the result is at most
    /// `limit + 1`.
    pub async fn comment_depth(&self, id: &str, limit: usize) -> Result<usize, AppError> {
        observe_db_query("select", "comments");
        let depth: i64 = sqlx::query_scalar(
            r#"
            WITH RECURSIVE ancestors(id, parent_id, depth) AS (
                SELECT id, parent_id, 0 FROM comments WHERE id = ?
                UNION ALL
                SELECT c.id, c.parent_id, a.depth + 1
                FROM comments c JOIN ancestors a ON c.id = a.parent_id
                WHERE a.depth <= ?
            )
            SELECT COALESCE(MAX(depth), 0) FROM ancestors
            "#,
        )
        .bind(id)
        .bind(limit as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(depth.max(0) as usize)
    }

    pub async fn insert_comment(&self, comment: &Comment) -> Result<(), AppError> {
        observe_db_query("insert", "comments");
        sqlx::query(
            r#"
            INSERT INTO comments (
                id, category_id, item_id, parent_id, user_id, content, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&comment.id)
        .bind(&comment.category_id)
        .bind(&comment.item_id)
        .bind(&comment.parent_id)
        .bind(&comment.user_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a comment; its replies cascade.
    pub async fn delete_comment(&self, id: &str) -> Result<bool, AppError> {
        observe_db_query("delete", "comments");
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
