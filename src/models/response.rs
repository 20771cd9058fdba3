//! Scrape response payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a scrape, as returned by the API and cached between requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub success: bool,

    /// The URL as requested.
    pub url: String,
    /// URL after redirects and client-side navigation.
    pub final_url: String,
    /// Page title (JS `document.title` for browser fetches, first `<title>`
    /// element for HTTP fetches). May be empty.
    pub title: String,

    /// Page content in `content_format`.
    pub content: String,
    /// "html" or "text".
    pub content_format: String,

    /// HTTP status of the navigation response; 0 when unknown.
    pub status_code: u16,
    /// Which engine produced the result ("http", "browser", "browser-stealth").
    pub engine: String,
    /// Coarse fetch-method tag for downstream consumers: "http" or "browser".
    pub fetch_method: String,

    /// Whether this response was served from the cache.
    pub cache_status: CacheStatus,

    /// Absolute http(s) links found in the rendered page, deduplicated.
    pub links: Vec<String>,
    /// Absolute image URLs found in the rendered page, deduplicated.
    pub images: Vec<String>,

    /// SimHash of the DOM structure as fixed-width hex, for duplicate
    /// detection across crawled sets.
    pub fingerprint: String,

    pub timing: Timing,
    pub scraped_at: DateTime<Utc>,
}

/// Where the response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Served from the cache without fetching.
    Hit,
    /// Cache was consulted but had no fresh entry.
    Miss,
    /// Caller opted out of the cache (max_age_ms == 0).
    Bypass,
}

/// Timing telemetry for one scrape.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Timing {
    /// End-to-end duration including cache lookups and extraction.
    pub total_ms: u64,
    /// Time spent fetching (racing engines / driving the browser). Zero for
    /// cache hits.
    pub fetch_ms: u64,
}

/// Snapshot of the browser page pool, exposed via `GET /api/v1/stats`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolStats {
    /// Hard maximum number of tabs.
    pub max_pages: usize,
    /// Tabs currently checked out.
    pub active_pages: usize,
    /// All live tabs, idle or checked out.
    pub live_pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&CacheStatus::Hit).unwrap(), "\"hit\"");
        assert_eq!(
            serde_json::to_string(&CacheStatus::Bypass).unwrap(),
            "\"bypass\""
        );
    }
}
