//! Profile service
//!
//! Storefront users are owned by the identity provider; this keeps the
//! local profile row (role, display name) for each of them.

use std::sync::Arc;

use crate::data::{Database, Profile, Role};
use crate::error::AppError;

/// Profile service
pub struct ProfileService {
    db: Arc<Database>,
}

impl ProfileService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Load the profile for an authenticated user, creating a `user`
    /// profile the first time the user is seen.
    pub async fn ensure(&self, user_id: &str, email: Option<&str>) -> Result<Profile, AppError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::Unauthorized);
        }
        self.db.ensure_profile(user_id, email).await
    }

    pub async fn list(&self) -> Result<Vec<Profile>, AppError> {
        self.db.list_profiles().await
    }

    /// Change a profile's role
    ///
    /// An admin cannot demote themselves, so the store always keeps at
    /// least the acting admin.
    pub async fn set_role(
        &self,
        actor: &Profile,
        profile_id: &str,
        role: Role,
    ) -> Result<Profile, AppError> {
        if actor.id == profile_id && role != Role::Admin {
            return Err(AppError::Validation(
                "admins cannot remove their own admin role".to_string(),
            ));
        }

        if !self.db.set_profile_role(profile_id, role).await? {
            return Err(AppError::NotFound);
        }

        tracing::info!(profile_id = %profile_id, role = role.as_str(), "Profile role changed");
        self.db.get_profile(profile_id).await?.ok_or(AppError::NotFound)
    }

    /// Promote the configured user ids to admin
    ///
    /// Profiles are created when missing so the first login already has
    /// admin rights.
    pub async fn promote_admins(&self, user_ids: &[String]) -> Result<(), AppError> {
        for user_id in user_ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
            let profile = self.db.ensure_profile(user_id, None).await?;
            if profile.is_admin() {
                tracing::info!(user_id = %user_id, "Admin profile exists");
                continue;
            }
            self.db.set_profile_role(user_id, Role::Admin).await?;
            tracing::info!(user_id = %user_id, "Profile promoted to admin");
        }
        Ok(())
    }
}
