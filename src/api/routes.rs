//! HTTP API route definitions

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::auth::{auth_middleware, AuthState};
use super::handlers::{self, AppState};

/// Create the API router with all routes mounted under `/api/v1`.
/// Health stays outside the auth layer so load balancers can probe it.
pub fn create_router(app_state: AppState, auth_state: AuthState) -> Router {
    let public = Router::new()
        .route("/health", get(handlers::health))
        .with_state(app_state.clone());

    let protected = Router::new()
        .route("/scrape", post(handlers::scrape))
        .route("/stats", get(handlers::stats))
        .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
        .with_state(app_state);

    Router::new().nest("/api/v1", public.merge(protected))
}
