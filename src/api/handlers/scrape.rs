//! Scrape endpoint

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::AppState;
use crate::api::types::{ApiJson, ErrorResponse};
use crate::cache::ResponseCache;
use crate::content::{extract_images, extract_links, visible_text};
use crate::engine::FetchResult;
use crate::models::{CacheStatus, OutputFormat, ScrapeError, ScrapeRequest, ScrapeResponse, Timing};
use crate::similarity::Fingerprint;

/// `POST /api/v1/scrape`
pub async fn scrape(
    State(state): State<AppState>,
    ApiJson(mut request): ApiJson<ScrapeRequest>,
) -> impl IntoResponse {
    let started = Instant::now();
    let request_id = Uuid::new_v4();

    request.apply_defaults(state.scraper_cfg.default_timeout_secs);
    if let Err(err) = request.validate(state.scraper_cfg.max_timeout_secs) {
        return (StatusCode::BAD_REQUEST, Json(ErrorResponse::from(&err))).into_response();
    }

    debug!(%request_id, url = %request.url, fetch_mode = ?request.fetch_mode, "scrape request");

    let key = ResponseCache::key(
        &request.url,
        request.output_format.as_str(),
        request.extract_mode.as_str(),
    );
    if let Some(mut cached) = state.cache.get(&key, request.max_age_ms) {
        debug!(%request_id, url = %request.url, "cache hit");
        cached.cache_status = CacheStatus::Hit;
        cached.timing = Timing {
            total_ms: started.elapsed().as_millis() as u64,
            fetch_ms: 0,
        };
        return (StatusCode::OK, Json(cached)).into_response();
    }

    let fetch_started = Instant::now();
    match state.scraper.scrape(&request).await {
        Ok(result) => {
            let fetch_ms = fetch_started.elapsed().as_millis() as u64;
            let response = build_response(&request, result, started, fetch_ms);

            // Never cache failures; only cache when the caller opted into
            // cache reads for this variant.
            if request.max_age_ms > 0 {
                state.cache.set(&key, response.clone());
            }

            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            warn!(%request_id, url = %request.url, error = %err, "scrape failed");
            let status = error_status(&err);
            (status, Json(ErrorResponse::from(&err))).into_response()
        }
    }
}

fn error_status(err: &ScrapeError) -> StatusCode {
    if err.is_timeout_or_canceled() {
        StatusCode::GATEWAY_TIMEOUT
    } else if matches!(err, ScrapeError::InvalidInput(_)) {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::BAD_GATEWAY
    }
}

fn build_response(
    request: &ScrapeRequest,
    result: FetchResult,
    started: Instant,
    fetch_ms: u64,
) -> ScrapeResponse {
    let base = Url::parse(&result.final_url)
        .or_else(|_| Url::parse(&request.url))
        .ok();
    let (links, images) = match &base {
        Some(base) => (
            extract_links(&result.html, base),
            extract_images(&result.html, base),
        ),
        None => (Vec::new(), Vec::new()),
    };

    let fingerprint = Fingerprint::of_dom(&result.html).to_hex();
    let fetch_method = if result.engine_name == "http" {
        "http"
    } else {
        "browser"
    };
    let content = match request.output_format {
        OutputFormat::Html => result.html,
        OutputFormat::Text => visible_text(&result.html),
    };

    ScrapeResponse {
        success: true,
        url: request.url.clone(),
        final_url: result.final_url,
        title: result.title,
        content,
        content_format: request.output_format.as_str().to_string(),
        status_code: result.status_code,
        engine: result.engine_name,
        fetch_method: fetch_method.to_string(),
        cache_status: if request.max_age_ms > 0 {
            CacheStatus::Miss
        } else {
            CacheStatus::Bypass
        },
        links,
        images,
        fingerprint,
        timing: Timing {
            total_ms: started.elapsed().as_millis() as u64,
            fetch_ms,
        },
        scraped_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_for(html: &str, engine: &str) -> FetchResult {
        FetchResult {
            html: html.to_string(),
            title: "Hi".into(),
            status_code: 200,
            final_url: "https://example.com/final".into(),
            engine_name: engine.to_string(),
        }
    }

    #[test]
    fn test_build_response_html_format() {
        let request = ScrapeRequest::for_url("https://example.com");
        let html = r#"<html><body><a href="/x">x</a>body text</body></html>"#;
        let response = build_response(&request, result_for(html, "http"), Instant::now(), 12);

        assert!(response.success);
        assert_eq!(response.content, html);
        assert_eq!(response.content_format, "html");
        assert_eq!(response.fetch_method, "http");
        assert_eq!(response.links, vec!["https://example.com/x"]);
        assert_eq!(response.cache_status, CacheStatus::Bypass);
    }

    #[test]
    fn test_build_response_text_format() {
        let mut request = ScrapeRequest::for_url("https://example.com");
        request.output_format = OutputFormat::Text;
        let response = build_response(
            &request,
            result_for("<html><body><p>plain words</p></body></html>", "browser"),
            Instant::now(),
            5,
        );

        assert_eq!(response.content, "plain words");
        assert_eq!(response.content_format, "text");
        assert_eq!(response.fetch_method, "browser");
    }

    #[test]
    fn test_fetch_method_tag() {
        let request = ScrapeRequest::for_url("https://example.com");
        let stealth = build_response(
            &request,
            result_for("<html></html>", "browser-stealth"),
            Instant::now(),
            1,
        );
        assert_eq!(stealth.fetch_method, "browser");
        assert_eq!(stealth.engine, "browser-stealth");
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&ScrapeError::Timeout),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            error_status(&ScrapeError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&ScrapeError::AllEnginesFailed {
                url: "https://example.com".into()
            }),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_cache_status_miss_when_caching_enabled() {
        let mut request = ScrapeRequest::for_url("https://example.com");
        request.max_age_ms = 60_000;
        let response =
            build_response(&request, result_for("<html></html>", "http"), Instant::now(), 1);
        assert_eq!(response.cache_status, CacheStatus::Miss);
    }
}
