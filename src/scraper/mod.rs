//! Browser lifecycle and the scraping facade
//!
//! [`Scraper`] owns the headless browser and its adaptive tab pool, and is
//! the single entry point for fetching a page. Simple requests go through
//! the multi-engine dispatcher (HTTP-first, browser escalation); requests
//! carrying scripted actions or a caller-supplied CDP endpoint take the
//! direct browser pipeline.
//!
//! Key components:
//! - `AdaptivePool` / `PageFactory`: health-tracked tab pool with
//!   memory-pressure scaling
//! - `BrowserEngine`: the pool-backed `Engine` implementations the
//!   dispatcher races
//! - the scrape pipeline in `page.rs`: stealth, hijack, navigation, wait
//!   strategies, overlay removal, scripted actions, extraction

mod actions;
mod blocklist;
mod browser;
mod engines;
mod hijack;
mod page;
mod pool;
mod stealth;
mod wait;

pub use browser::{find_chrome, ChromiumFactory};
pub use engines::BrowserEngine;
pub use pool::{AdaptivePool, PageFactory, PageHandle};

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chromiumoxide::browser::Browser;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{BrowserConfig, PoolConfig, ScraperConfig};
use crate::engine::{Dispatcher, Engine, FetchRequest, FetchResult, HttpEngine};
use crate::models::{FetchMode, PoolStats, ScrapeError, ScrapeRequest};

/// Owns the browser, the page pool, and the fetch path selection.
/// Safe for concurrent use.
pub struct Scraper {
    browser: Arc<Mutex<Browser>>,
    handler_task: JoinHandle<()>,
    pool: Arc<AdaptivePool<ChromiumFactory>>,
    scraper_cfg: ScraperConfig,
    dispatcher: OnceLock<Arc<Dispatcher>>,
    http_engine: OnceLock<Arc<HttpEngine>>,
    start_time: Instant,
}

impl Scraper {
    /// Launch the browser and pre-fill the tab pool.
    pub async fn new(
        browser_cfg: &BrowserConfig,
        scraper_cfg: ScraperConfig,
        pool_cfg: PoolConfig,
    ) -> Result<Arc<Self>, ScrapeError> {
        let (browser, handler_task) = browser::launch_browser(browser_cfg).await?;
        let browser = Arc::new(Mutex::new(browser));

        let factory = ChromiumFactory::new(Arc::clone(&browser));
        let pool = AdaptivePool::new(pool_cfg, factory).await;
        info!(live = pool.live_count(), "page pool ready");

        Ok(Arc::new(Self {
            browser,
            handler_task,
            pool,
            scraper_cfg,
            dispatcher: OnceLock::new(),
            http_engine: OnceLock::new(),
            start_time: Instant::now(),
        }))
    }

    /// Install the multi-engine dispatcher. Without one, every scrape
    /// takes the direct browser path.
    pub fn set_dispatcher(&self, dispatcher: Arc<Dispatcher>) {
        let _ = self.dispatcher.set(dispatcher);
    }

    /// Install the HTTP engine used by `fetch_mode = "http"`.
    pub fn set_http_engine(&self, engine: Arc<HttpEngine>) {
        let _ = self.http_engine.set(engine);
    }

    /// Fetch one page, choosing the path from the request:
    /// CDP endpoint ⇒ external browser; forced http/browser modes ⇒ that
    /// engine; otherwise the dispatcher, falling back to the direct
    /// browser pipeline when the dispatcher fails for reasons other than
    /// deadline/cancel.
    pub async fn scrape(&self, req: &ScrapeRequest) -> Result<FetchResult, ScrapeError> {
        let timeout =
            Duration::from_secs(req.timeout.min(self.scraper_cfg.max_timeout_secs).max(1));

        let fetch_req = FetchRequest {
            url: req.url.clone(),
            headers: req.headers.clone(),
            cookies: req.cookies.clone(),
            timeout,
            stealth: req.stealth,
            proxy_url: req.proxy_url.clone(),
            wait_for_network_idle: req.wait_for_network_idle.unwrap_or(true),
            remove_overlays: req.remove_overlays,
            block_ads: req.block_ads,
        };

        if let Some(cdp_url) = &req.cdp_url {
            return self.scrape_cdp(cdp_url, &fetch_req, &req.actions).await;
        }

        match req.fetch_mode {
            FetchMode::Http => {
                let engine = self.http_engine.get().ok_or_else(|| {
                    ScrapeError::InvalidInput("http fetch mode is not available".into())
                })?;
                return match tokio::time::timeout(timeout, engine.fetch(&fetch_req)).await {
                    Ok(result) => result,
                    Err(_) => Err(ScrapeError::Timeout),
                };
            }
            FetchMode::Browser => {
                return self.scrape_browser(&fetch_req, &req.actions).await;
            }
            FetchMode::Auto => {}
        }

        if req.actions.is_empty() {
            if let Some(dispatcher) = self.dispatcher.get() {
                match tokio::time::timeout(timeout, dispatcher.dispatch(&fetch_req)).await {
                    Ok(Ok(result)) => return Ok(result),
                    Ok(Err(err)) if err.is_timeout_or_canceled() => return Err(err),
                    Ok(Err(err)) => {
                        warn!(url = %req.url, error = %err,
                            "dispatcher failed, falling back to direct browser scrape");
                    }
                    Err(_) => return Err(ScrapeError::Timeout),
                }
            }
        }

        self.scrape_browser(&fetch_req, &req.actions).await
    }

    /// Snapshot of the page pool.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Seconds since the browser was launched.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Drain the pool and terminate the browser. Call on graceful shutdown
    /// so no Chromium processes outlive the service.
    pub async fn close(&self) {
        info!("scraper shutting down: draining page pool");
        self.pool.close().await;

        info!("scraper shutting down: closing browser");
        {
            let mut browser = self.browser.lock().await;
            if let Err(err) = browser.close().await {
                warn!(error = %err, "browser close failed");
            }
        }
        self.handler_task.abort();
        info!("scraper shutdown complete");
    }
}
