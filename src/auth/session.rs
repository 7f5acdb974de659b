//! Identity tokens
//!
//! The identity provider signs a small JSON payload with the shared
//! `auth.token_secret`. No server-side session storage is needed.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Verified identity carried by a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Identity provider user id; also the profile id
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

fn signature(payload_b64: &str, secret: &str) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    Ok(mac)
}

/// Create a signed session token
///
/// Token format: base64url(payload).base64url(hmac_sha256(payload))
///
/// Used by the identity provider side and by tests.
pub fn create_session_token(session: &Session, secret: &str) -> Result<String, AppError> {
    let payload = serde_json::to_string(session).map_err(|e| AppError::Internal(e.into()))?;
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    let signature = signature(&payload_b64, secret)?.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a session token
///
/// # Errors
/// - `InvalidSignature` if the signature does not match
/// - `Unauthorized` if the token is malformed or expired
pub fn verify_session_token(token: &str, secret: &str) -> Result<Session, AppError> {
    let (payload_b64, signature_b64) = token.split_once('.').ok_or(AppError::Unauthorized)?;
    if signature_b64.contains('.') {
        return Err(AppError::Unauthorized);
    }

    let provided_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;
    signature(payload_b64, secret)?
        .verify_slice(&provided_signature)
        .map_err(|_| AppError::InvalidSignature)?;

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized)?;
    let session: Session =
        serde_json::from_slice(&payload_bytes).map_err(|_| AppError::Unauthorized)?;

    if session.is_expired() || session.user_id.trim().is_empty() {
        return Err(AppError::Unauthorized);
    }

    Ok(session)
}
