//! HTTP API
//!
//! Axum server exposing the scrape service under `/api/v1`.

mod auth;
mod handlers;
mod routes;
mod server;
mod types;

pub use auth::AuthState;
pub use handlers::AppState;
pub use routes::create_router;
pub use server::{build_scraper, serve};
