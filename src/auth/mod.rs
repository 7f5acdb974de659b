//! Authentication
//!
//! Handles:
//! - Verification of identity-provider tokens
//! - Request extractors for users and admins
//! - Admin-only middleware

mod middleware;
pub mod session;

pub use middleware::{AdminUser, CurrentUser, require_admin};
pub use session::{Session, create_session_token, verify_session_token};
