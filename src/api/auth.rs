//! API key authentication middleware

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::types::ErrorResponse;

/// Shared authentication state. An empty key list disables auth.
#[derive(Clone)]
pub struct AuthState {
    api_keys: Arc<Vec<String>>,
}

impl AuthState {
    pub fn new(api_keys: Vec<String>) -> Self {
        Self {
            api_keys: Arc::new(api_keys),
        }
    }

    pub fn auth_required(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// True when the key is valid (or auth is disabled).
    pub fn validate_key(&self, key: &str) -> bool {
        if self.api_keys.is_empty() {
            return true;
        }
        self.api_keys.iter().any(|k| k == key)
    }
}

/// Accepts the key from the Authorization header as either
/// `Bearer <key>` or the bare key.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth.auth_required() {
        return next.run(request).await;
    }

    let api_key = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(|h| h.strip_prefix("Bearer ").unwrap_or(h).trim());

    match api_key {
        Some(key) if auth.validate_key(key) => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, Json(ErrorResponse::unauthorized())).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_keys_disables_auth() {
        let auth = AuthState::new(vec![]);
        assert!(!auth.auth_required());
        assert!(auth.validate_key("anything"));
    }

    #[test]
    fn test_keys_are_enforced() {
        let auth = AuthState::new(vec!["secret123".to_string(), "key456".to_string()]);
        assert!(auth.auth_required());
        assert!(auth.validate_key("secret123"));
        assert!(auth.validate_key("key456"));
        assert!(!auth.validate_key("wrong"));
    }
}
