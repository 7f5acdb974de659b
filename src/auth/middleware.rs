//! Authentication extractors and middleware
//!
//! A request is authenticated by a provider-issued token in the
//! `Authorization: Bearer` header or the `session` cookie. The verified
//! user is resolved to a local profile, which is created on first sight.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use super::session::verify_session_token;
use crate::AppState;
use crate::data::Profile;
use crate::error::AppError;

pub(crate) const SESSION_COOKIE: &str = "session";

fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| {
            let jar = CookieJar::from_headers(headers);
            jar.get(SESSION_COOKIE)
                .map(|cookie| cookie.value().to_owned())
        })
}

async fn authenticate_token(token: &str, state: &AppState) -> Result<Profile, AppError> {
    let session = verify_session_token(token, &state.config.auth.token_secret)?;
    state
        .profile_service()
        .ensure(&session.user_id, session.email.as_deref())
        .await
}

async fn authenticate_parts(parts: &mut Parts, state: &AppState) -> Result<Profile, AppError> {
    if let Some(profile) = parts.extensions.get::<Profile>().cloned() {
        return Ok(profile);
    }

    let token = extract_token_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
    let profile = authenticate_token(&token, state).await?;
    parts.extensions.insert(profile.clone());
    Ok(profile)
}

/// Middleware to require an admin
///
/// Rejects anonymous callers with 401 and non-admins with 403, and adds
/// the admin's `Profile` to the request extensions.
///
/// # Usage
/// ```ignore
/// let admin_routes = Router::new()
///     .route("/categories", ...)
///     .route_layer(middleware::from_fn_with_state(state, require_admin));
/// ```
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();
    let profile = authenticate_parts(&mut parts, &state).await?;
    if !profile.is_admin() {
        tracing::debug!(user_id = %profile.id, path = %parts.uri.path(), "Admin route denied");
        return Err(AppError::Forbidden);
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Extractor for current authenticated user
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(profile): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", profile.id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Profile);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(CurrentUser(authenticate_parts(parts, &state).await?))
    }
}

/// Authenticated user with the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub Profile);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(profile) = CurrentUser::from_request_parts(parts, state).await?;
        if !profile.is_admin() {
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(profile))
    }
}
