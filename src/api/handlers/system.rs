//! Health and stats endpoints

use axum::{extract::State, response::IntoResponse, Json};

use super::AppState;
use crate::api::types::{HealthResponse, StatsResponse};

/// `GET /api/v1/health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.scraper.uptime_secs(),
    })
}

/// `GET /api/v1/stats`
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatsResponse {
        pool: state.scraper.stats(),
        cache_entries: state.cache.len(),
        domain_memory_entries: state.memory.len(),
    })
}
