//! Query parameters shared by list operations

use serde::Deserialize;

use super::models::{Attachment, ImageType};
use crate::error::AppError;

/// Sort order for admin tables
///
/// `column` is always one of a caller-supplied whitelist, so it can be
/// interpolated into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOrder {
    pub column: &'static str,
    pub descending: bool,
}

impl ListOrder {
    /// Newest first
    pub const fn newest_first() -> Self {
        Self {
            column: "created_at",
            descending: true,
        }
    }

    pub const fn by_name() -> Self {
        Self {
            column: "name",
            descending: false,
        }
    }

    /// Parse `?sort=&order=` against the sortable columns of a table.
    ///
    /// Missing `sort` falls back to newest first.
    pub fn parse(params: &SortParams, allowed: &[&'static str]) -> Result<Self, AppError> {
        let descending = match params.order.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(order) if order.eq_ignore_ascii_case("asc") => Some(false),
            Some(order) if order.eq_ignore_ascii_case("desc") => Some(true),
            Some(order) => {
                return Err(AppError::Validation(format!(
                    "order must be asc or desc (got {order})"
                )));
            }
        };

        let Some(sort) = params.sort.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            let mut order = Self::newest_first();
            if let Some(descending) = descending {
                order.descending = descending;
            }
            return Ok(order);
        };

        let column = allowed
            .iter()
            .copied()
            .find(|column| column.eq_ignore_ascii_case(sort))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "cannot sort by {sort}; expected one of: {}",
                    allowed.join(", ")
                ))
            })?;

        Ok(Self {
            column,
            descending: descending.unwrap_or(false),
        })
    }

    /// `ORDER BY` clause with `id` as the tie breaker
    pub fn to_sql(&self) -> String {
        let direction = if self.descending { "DESC" } else { "ASC" };
        format!("ORDER BY {} {direction}, id {direction}", self.column)
    }
}

/// `?sort=<column>&order=asc|desc`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SortParams {
    pub sort: Option<String>,
    pub order: Option<String>,
}

/// Gallery filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ImageFilter {
    pub image_type: Option<ImageType>,
    pub attachment: Option<Attachment>,
}
