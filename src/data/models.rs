//! Data models
//!
//! Rust structs representing database rows.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Profiles
// =============================================================================

/// Role column of `profiles`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(AppError::Validation(format!(
                "role must be one of: user, admin (got {other})"
            ))),
        }
    }
}

/// A user known to the storefront
///
/// The id comes from the identity provider's token.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// "user" or "admin"
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.as_str()
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sellable item (e.g. a premium account)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    pub id: String,
    /// Owning category; null once the category is deleted
    pub category_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    /// Base price in minor currency units
    pub price_cents: i64,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Duration-based price for an item
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PricingTier {
    pub id: String,
    pub item_id: String,
    pub duration_days: i64,
    pub price_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// A programming service offering
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// "Starting at" price, if advertised
    pub price_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Attachments
// =============================================================================

/// What an image or comment hangs off: exactly one category or item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Attachment {
    Category(String),
    Item(String),
}

impl Attachment {
    /// Build from the pair of nullable columns.
    ///
    /// Exactly one side must be set.
    pub fn from_columns(
        category_id: Option<String>,
        item_id: Option<String>,
    ) -> Result<Self, AppError> {
        match (category_id, item_id) {
            (Some(category_id), None) => Ok(Self::Category(category_id)),
            (None, Some(item_id)) => Ok(Self::Item(item_id)),
            (Some(_), Some(_)) => Err(AppError::Validation(
                "attach to either a category or an item, not both".to_string(),
            )),
            (None, None) => Err(AppError::Validation(
                "a category_id or item_id is required".to_string(),
            )),
        }
    }

    pub fn category_id(&self) -> Option<&str> {
        match self {
            Self::Category(id) => Some(id),
            Self::Item(_) => None,
        }
    }

    pub fn item_id(&self) -> Option<&str> {
        match self {
            Self::Item(id) => Some(id),
            Self::Category(_) => None,
        }
    }
}

// =============================================================================
// Images
// =============================================================================

/// Gallery classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Proofs,
    Projects,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proofs => "proofs",
            Self::Projects => "projects",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "proofs" => Ok(Self::Proofs),
            "projects" => Ok(Self::Projects),
            other => Err(AppError::Validation(format!(
                "image_type must be one of: proofs, projects (got {other})"
            ))),
        }
    }
}

/// Uploaded image row
///
/// The file itself lives in object storage under `storage_key`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub id: String,
    /// "proofs" or "projects"
    pub image_type: String,
    pub item_id: Option<String>,
    pub category_id: Option<String>,
    pub title: Option<String>,
    /// Public URL
    pub url: String,
    /// Object key; absent on rows that predate key tracking
    #[serde(skip_serializing)]
    pub storage_key: Option<String>,
    pub content_type: String,
    pub file_size: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Comments
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub category_id: Option<String>,
    pub item_id: Option<String>,
    /// Comment this replies to
    pub parent_id: Option<String>,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn attachment(&self) -> Result<Attachment, AppError> {
        Attachment::from_columns(self.category_id.clone(), self.item_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_requires_exactly_one_side() {
        assert_eq!(
            Attachment::from_columns(Some("c".to_string()), None).unwrap(),
            Attachment::Category("c".to_string())
        );
        assert_eq!(
            Attachment::from_columns(None, Some("i".to_string())).unwrap(),
            Attachment::Item("i".to_string())
        );
        assert!(Attachment::from_columns(None, None).is_err());
        assert!(Attachment::from_columns(Some("c".to_string()), Some("i".to_string())).is_err());
    }

    #[test]
    fn image_type_parses_case_insensitively() {
        assert_eq!(ImageType::parse(" Proofs ").unwrap(), ImageType::Proofs);
        assert_eq!(ImageType::parse("projects").unwrap(), ImageType::Projects);
        assert!(matches!(
            ImageType::parse("screenshots"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn role_round_trips_through_column_text() {
        assert_eq!(Role::parse("ADMIN").unwrap().as_str(), "admin");
        assert!(Role::parse("owner").is_err());
    }
}
