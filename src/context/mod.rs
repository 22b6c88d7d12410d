//! Per-request access token context.
//!
//! The original design used a thread-local; here the context travels as an
//! axum request extension, so it is dropped with the request on every exit
//! path and any code acting on the request's behalf receives it explicitly.

use chrono::{DateTime, Utc};

/// Decoded access token context for the current request.
/// Used to scope resources to a specific user session.
#[derive(Debug, Clone)]
pub struct AccessTokenContext {
    pub token: String,
    /// jti claim, or a digest of the token when jti is absent.
    pub token_id: String,
    /// sub claim, expected to be the user's WebID.
    pub subject: String,
    /// exp claim.
    pub expiry: Option<DateTime<Utc>>,
}

impl AccessTokenContext {
    pub fn new(
        token: impl Into<String>,
        token_id: impl Into<String>,
        subject: impl Into<String>,
        expiry: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            token: token.into(),
            token_id: token_id.into(),
            subject: subject.into(),
            expiry,
        }
    }

    /// The key used for scoping resources: the token id if available,
    /// otherwise the subject.
    pub fn session_key(&self) -> &str {
        if !self.token_id.is_empty() {
            &self.token_id
        } else {
            &self.subject
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|exp| now > exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_key_prefers_token_id() {
        let ctx = AccessTokenContext::new("tok", "jti-1", "https://pod/u#me", None);
        assert_eq!(ctx.session_key(), "jti-1");
    }

    #[test]
    fn test_session_key_falls_back_to_subject() {
        let ctx = AccessTokenContext::new("tok", "", "https://pod/u#me", None);
        assert_eq!(ctx.session_key(), "https://pod/u#me");
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let ctx = AccessTokenContext::new("tok", "id", "sub", Some(now - Duration::seconds(1)));
        assert!(ctx.is_expired(now));

        let ctx = AccessTokenContext::new("tok", "id", "sub", Some(now + Duration::hours(1)));
        assert!(!ctx.is_expired(now));

        let ctx = AccessTokenContext::new("tok", "id", "sub", None);
        assert!(!ctx.is_expired(now));
    }
}
