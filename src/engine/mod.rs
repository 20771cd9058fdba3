//! Multi-engine fetch core
//!
//! An [`Engine`] turns a URL plus options into rendered HTML. Three engines
//! exist, from cheapest to heaviest: plain HTTP with a browser-like header
//! profile, the pooled headless browser, and the pooled browser with
//! stealth evasions forced on. The [`Dispatcher`] races them with staged
//! start delays and remembers the per-host winner in [`DomainMemory`].
//!
//! The browser-backed `Engine` implementations live in `crate::scraper`
//! (the module that owns the page pool); this module only defines the
//! interface and the engines with no browser dependency.

mod dispatcher;
mod http;
mod memory;

pub use dispatcher::Dispatcher;
pub use http::HttpEngine;
pub use memory::DomainMemory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{CookieParam, ScrapeError};

/// Everything an engine needs to fetch one page.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Absolute http(s) URL.
    pub url: String,
    /// Extra headers; override the engine's defaults.
    pub headers: HashMap<String, String>,
    /// Cookies installed before the request/navigation.
    pub cookies: Vec<CookieParam>,
    /// Deadline for the whole fetch.
    pub timeout: Duration,
    /// Force stealth evasions on browser engines.
    pub stealth: bool,
    /// Per-request proxy override.
    pub proxy_url: Option<String>,
    /// Browser engines: wait for network idle instead of DOM stability.
    pub wait_for_network_idle: bool,
    /// Browser engines: strip overlays before extraction.
    pub remove_overlays: bool,
    /// Browser engines: fail requests to known ad/tracker hosts.
    pub block_ads: bool,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            cookies: Vec::new(),
            timeout,
            stealth: false,
            proxy_url: None,
            wait_for_network_idle: true,
            remove_overlays: false,
            block_ads: false,
        }
    }

    /// Hostname of the target URL; falls back to the raw string when the
    /// URL does not parse (the dispatcher still needs a memory key).
    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| self.url.clone())
    }
}

/// Output of a successful engine fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Full rendered HTML. Non-empty on success.
    pub html: String,
    /// Page title; may be empty.
    pub title: String,
    /// HTTP status of the navigation response; 0 when unknown.
    pub status_code: u16,
    /// URL after redirects.
    pub final_url: String,
    /// Name of the engine that produced this result.
    pub engine_name: String,
}

/// A fetch engine the dispatcher can race.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Stable lowercase identifier ("http", "browser", "browser-stealth").
    fn name(&self) -> &str;

    /// Fetch the page. Dropping the returned future cancels the fetch.
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResult, ScrapeError>;
}
