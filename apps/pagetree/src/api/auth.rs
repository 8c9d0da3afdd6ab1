//! # Authentication Module
//!
//! API key authentication for the pagetree HTTP API.
//!
//! Every request leaves this middleware with a `RequestContext` extension
//! that the handlers pass to the engine:
//!
//! | Request                      | Context              |
//! |------------------------------|----------------------|
//! | no key configured            | admin                |
//! | valid key                    | admin                |
//! | no `Authorization` header    | anonymous            |
//! | wrong key                    | rejected with 401    |
//!
//! `/health` never requires a key.
//!
//! ## Usage
//!
//! Send the API key in the Authorization header:
//! ```text
//! Authorization: Bearer <your-api-key>
//! ```

use super::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use pagetree_core::RequestContext;
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Actor name recorded for requests authenticated by the API key.
pub const API_ACTOR: &str = "api";

// =============================================================================
// API KEY
// =============================================================================

/// The server's API key, if authentication is enabled.
#[derive(Clone, Default)]
pub struct ApiKey(Option<Arc<str>>);

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("ApiKey(<redacted>)"),
            None => f.write_str("ApiKey(disabled)"),
        }
    }
}

impl ApiKey {
    /// Build from an optional key. An empty key disables authentication.
    #[must_use]
    pub fn new(key: Option<&str>) -> Self {
        Self(key.filter(|k| !k.is_empty()).map(Arc::from))
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    /// Constant-time comparison against the configured key.
    ///
    /// Both keys are padded to the same length so `ct_eq` always runs over
    /// the same number of bytes.
    #[must_use]
    pub fn verify(&self, provided: &str) -> bool {
        let Some(expected) = self.0.as_deref() else {
            return false;
        };
        let provided_bytes = provided.as_bytes();
        let expected_bytes = expected.as_bytes();

        let max_len = provided_bytes.len().max(expected_bytes.len());
        let mut padded_provided = vec![0u8; max_len];
        let mut padded_expected = vec![0u8; max_len];
        padded_provided[..provided_bytes.len()].copy_from_slice(provided_bytes);
        padded_expected[..expected_bytes.len()].copy_from_slice(expected_bytes);

        let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
        bytes_match && provided_bytes.len() == expected_bytes.len()
    }
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

/// Resolve the caller into a `RequestContext`.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if !state.api_key.is_enabled() {
        request
            .extensions_mut()
            .insert(RequestContext::admin(API_ACTOR));
        return Ok(next.run(request).await);
    }

    if request.uri().path() == "/health" {
        request
            .extensions_mut()
            .insert(RequestContext::anonymous());
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().map(str::to_string));

    let ctx = match auth_header {
        None => RequestContext::anonymous(),
        Some(Ok(header_value)) => {
            // Support both "Bearer <key>" and raw "<key>" formats
            let provided = header_value
                .strip_prefix("Bearer ")
                .unwrap_or(&header_value);
            if state.api_key.verify(provided) {
                RequestContext::admin(API_ACTOR)
            } else {
                tracing::warn!(
                    event = "auth_failure",
                    reason = "invalid_api_key",
                    "Authentication failed: invalid API key"
                );
                return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
            }
        }
        Some(Err(_)) => {
            tracing::warn!(
                event = "auth_failure",
                reason = "malformed_authorization_header",
                "Authentication failed: malformed Authorization header"
            );
            return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
        }
    };

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_disables_auth() {
        assert!(!ApiKey::new(Some("")).is_enabled());
        assert!(!ApiKey::new(None).is_enabled());
        assert!(ApiKey::new(Some("k")).is_enabled());
    }

    #[test]
    fn verify_requires_exact_match() {
        let key = ApiKey::new(Some("secret"));
        assert!(key.verify("secret"));
        assert!(!key.verify("secre"));
        assert!(!key.verify("secret2"));
        assert!(!key.verify(""));
        assert!(!ApiKey::default().verify("anything"));
    }

    #[test]
    fn debug_redacts_key() {
        let key = ApiKey::new(Some("secret"));
        assert!(!format!("{:?}", key).contains("secret"));
    }
}
