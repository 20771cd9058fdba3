//! HTTP API envelope types and the JSON body extractor

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::models::{ErrorDetail, PoolStats, ScrapeError};

/// Error envelope returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "missing or invalid API key")
    }
}

impl From<&ScrapeError> for ErrorResponse {
    fn from(err: &ScrapeError) -> Self {
        Self {
            success: false,
            error: err.to_detail(),
        }
    }
}

/// JSON body extractor that keeps malformed payloads inside the error
/// envelope. Axum's stock `Json` rejection is a text/plain 400, which
/// would leak out for bodies that fail deserialization (unknown
/// `extract_mode` values, bad action types, truncated JSON) before
/// request validation ever runs; this maps those to `INVALID_INPUT`.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("INVALID_INPUT", rejection.body_text())),
            )
                .into_response()),
        }
    }
}

/// `GET /api/v1/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

/// `GET /api/v1/stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub pool: PoolStats,
    pub cache_entries: usize,
    pub domain_memory_entries: usize,
}
