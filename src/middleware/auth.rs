//! Access token middleware.
//!
//! Extracts the bearer token, decodes it (without signature verification,
//! which is the authorization server's concern), rejects expired tokens,
//! resolves the caller's session, and triggers first-use hydration. The
//! decoded context is injected as a request extension and dropped with the
//! request on every exit path.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::auth::{decode_claims, token_digest};
use crate::context::AccessTokenContext;
use crate::error::ApiError;
use crate::server::AppState;

pub async fn access_token_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();

    // Public endpoints proceed unauthenticated, with no context set
    if is_public_endpoint(&path) {
        tracing::debug!("Skipping token extraction for public endpoint: {}", path);
        return Ok(next.run(request).await);
    }

    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    let token = extract_bearer(authorization).ok_or_else(|| {
        tracing::debug!("No Bearer token in Authorization header on {}", path);
        ApiError::unauthorized("Unauthorized")
    })?;

    let claims = decode_claims(token).map_err(|e| {
        tracing::warn!("Failed to decode JWT token on {}: {}", path, e);
        ApiError::unauthorized("Unauthorized")
    })?;

    let subject = claims.sub.clone().unwrap_or_default();
    let expiry = claims.expiry();

    // Token hash fallback when jti is absent
    let token_id = match claims.jti.as_deref() {
        Some(jti) if !jti.is_empty() => jti.to_string(),
        _ => token_digest(token),
    };

    if expiry.is_some_and(|exp| Utc::now() > exp) {
        tracing::warn!("Token expired for subject {} on {}", subject, path);
        return Err(ApiError::unauthorized("Token expired"));
    }

    let ctx = AccessTokenContext::new(token, token_id, subject, expiry);

    let session = state.sessions.get_or_create(ctx.session_key());
    session.set_expiry(ctx.expiry);

    // First-use hydration, guarded by the session's once-latch so
    // concurrent first requests load at most once
    if !session.is_hydrated() {
        let _latch = session.hydration_lock().lock().await;
        if !session.is_hydrated() {
            state.hydrator.hydrate(&session, &ctx).await;
        }
    }

    tracing::debug!(
        "Access token context set for subject: {}, session: {}",
        ctx.subject,
        ctx.session_key()
    );
    request.extensions_mut().insert(ctx);

    Ok(next.run(request).await)
}

/// Strip a case-insensitive `Bearer` scheme; empty values are rejected.
fn extract_bearer(authorization: &str) -> Option<&str> {
    let trimmed = authorization.trim();
    let rest = trimmed
        .get(..6)
        .filter(|scheme| scheme.eq_ignore_ascii_case("bearer"))
        .map(|_| &trimmed[6..])?;
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

/// Endpoints that never require authentication.
pub fn is_public_endpoint(path: &str) -> bool {
    // Liveness probe
    if path == "/health" {
        return true;
    }
    // CapabilityStatement is always public
    if path.ends_with("/metadata") {
        return true;
    }
    // Conformance resources are public
    if path.contains("/StructureDefinition") || path.contains("/ImplementationGuide") {
        return true;
    }
    // Questionnaire definitions are shared; QuestionnaireResponse is user data
    if path.contains("/Questionnaire") && !path.contains("/QuestionnaireResponse") {
        return true;
    }
    // API documentation
    if path.contains("/swagger-ui") || path.contains("/api-docs") {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(extract_bearer("bearer abc"), Some("abc"));
        assert_eq!(extract_bearer("BEARER  abc  "), Some("abc"));
        assert_eq!(extract_bearer(""), None);
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("Bearer"), None);
        assert_eq!(extract_bearer("Basic dXNlcjpwYXNz"), None);
        assert_eq!(extract_bearer("Bearertoken"), None);
    }

    #[test]
    fn test_public_endpoints() {
        assert!(is_public_endpoint("/fhir/metadata"));
        assert!(is_public_endpoint("/fhir/StructureDefinition"));
        assert!(is_public_endpoint("/fhir/StructureDefinition/welldata-observation"));
        assert!(is_public_endpoint("/fhir/ImplementationGuide/welldata"));
        assert!(is_public_endpoint("/fhir/Questionnaire"));
        assert!(is_public_endpoint("/fhir/Questionnaire/daily-mood"));
        assert!(is_public_endpoint("/swagger-ui/index.html"));
        assert!(is_public_endpoint("/api-docs"));
        assert!(is_public_endpoint("/health"));
    }

    #[test]
    fn test_protected_endpoints() {
        assert!(!is_public_endpoint("/fhir/Patient"));
        assert!(!is_public_endpoint("/fhir/Patient/1"));
        assert!(!is_public_endpoint("/fhir/Observation"));
        assert!(!is_public_endpoint("/fhir/QuestionnaireResponse"));
        assert!(!is_public_endpoint("/fhir/QuestionnaireResponse/1"));
    }
}
