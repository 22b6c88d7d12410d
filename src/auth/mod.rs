//! Structural access-token decoding.
//!
//! Tokens are decoded, not verified: signature validation is the
//! responsibility of the upstream authorization layer. This module only
//! extracts the claims needed for session scoping.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Claims extracted from the bearer token payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Claims {
    /// Token id, used as the session key when present.
    #[serde(default)]
    pub jti: Option<String>,
    /// Subject, expected to be a WebID-style URL naming the user's pod.
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiry, seconds since epoch.
    #[serde(default)]
    pub exp: Option<i64>,
}

impl Claims {
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token is not a three-part JWT")]
    Malformed,
    #[error("Token payload is not valid base64url: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
    #[error("Token payload is not a JSON claims object: {0}")]
    InvalidClaims(#[from] serde_json::Error),
}

/// Decode the claims from a JWT without verifying its signature.
pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(TokenError::Malformed),
        };

    // Tolerate padded input; base64url in JWTs is unpadded
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let claims = serde_json::from_slice(&bytes)?;
    Ok(claims)
}

/// Stable digest of the raw token string, used as the token id
/// when the `jti` claim is absent.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
