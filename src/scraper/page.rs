//! The browser scrape pipeline
//!
//! Step order here is load-bearing:
//!   - stealth, headers, cookies, and the hijack router are installed
//!     before navigation, or they would not apply to the page being loaded;
//!   - the network-idle watcher subscribes before navigation, or it would
//!     miss the initial request burst and report idle instantly;
//!   - cleanup parks the tab on about:blank using a background task (never
//!     the request's own context, which may already be past its deadline)
//!     and then returns it to the pool. Skipping the blank navigation
//!     leaks the previous page's DOM across reuses, typically 5-20 MiB per
//!     tab.

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam as CdpCookieParam, Headers, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::engine::{FetchRequest, FetchResult};
use crate::models::{Action, ScrapeError};

use super::actions::execute_actions;
use super::browser::{connect_browser, ChromiumFactory};
use super::hijack::HijackRouter;
use super::pool::{AdaptivePool, PageHandle};
use super::stealth::STEALTH_SCRIPT;
use super::wait::{wait_dom_stable, NetworkIdleWatcher, DOM_STABLE_TOLERANCE, SETTLE_WINDOW};
use super::Scraper;

/// Deadline for the cleanup navigation to about:blank.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads the navigation response status without any CDP event listener
/// (network-event capture conflicts with the Fetch-domain hijack router on
/// newer Chromium).
const STATUS_JS: &str = r#"(() => {
    try {
        const entries = performance.getEntriesByType("navigation");
        if (entries.length > 0) return entries[0].responseStatus || 0;
    } catch (e) {}
    return 0;
})()"#;

/// Removes fixed/sticky overlays and the usual cookie/consent/popup
/// containers, then restores scrolling on body/html.
const OVERLAY_JS: &str = r#"(() => {
    const els = document.querySelectorAll('*');
    for (const el of els) {
        const style = window.getComputedStyle(el);
        const pos = style.position;
        if (pos === 'fixed' || pos === 'sticky') {
            const z = parseInt(style.zIndex, 10);
            if (z >= 900 || style.zIndex === 'auto') {
                el.remove();
            }
        }
    }
    const selectors = [
        '[class*="cookie"]', '[class*="consent"]', '[class*="overlay"]',
        '[id*="cookie"]', '[id*="consent"]', '[id*="overlay"]',
        '[class*="popup"]', '[id*="popup"]',
        '[class*="gdpr"]', '[id*="gdpr"]',
    ];
    for (const sel of selectors) {
        document.querySelectorAll(sel).forEach(el => {
            const style = window.getComputedStyle(el);
            if (style.position === 'fixed' || style.position === 'sticky' || style.position === 'absolute') {
                el.remove();
            }
        });
    }
    document.documentElement.style.overflow = '';
    document.body.style.overflow = '';
})()"#;

/// Holds a pooled tab for the duration of one scrape. Dropping the lease —
/// on success, error, timeout, or panic — parks the tab and returns it to
/// the pool exactly once, with the recorded verdict.
struct PageLease {
    pool: Arc<AdaptivePool<ChromiumFactory>>,
    handle: Arc<PageHandle<Page>>,
    router: Option<HijackRouter>,
    success: bool,
}

impl PageLease {
    fn new(pool: Arc<AdaptivePool<ChromiumFactory>>, handle: Arc<PageHandle<Page>>) -> Self {
        Self {
            pool,
            handle,
            router: None,
            success: false,
        }
    }

    fn page(&self) -> &Page {
        self.handle.page()
    }

    fn set_router(&mut self, router: Option<HijackRouter>) {
        self.router = router;
    }

    fn succeed(&mut self) {
        self.success = true;
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        let pool = Arc::clone(&self.pool);
        let handle = Arc::clone(&self.handle);
        let router = self.router.take();
        let success = self.success;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn(async move {
            if let Some(router) = router {
                router.stop(handle.page()).await;
            }
            match tokio::time::timeout(CLEANUP_TIMEOUT, handle.page().goto("about:blank")).await
            {
                Ok(Err(err)) => warn!(error = %err, "cleanup navigation to about:blank failed"),
                Err(_) => warn!("cleanup navigation to about:blank timed out"),
                Ok(Ok(_)) => {}
            }
            pool.put(handle, success).await;
        });
    }
}

impl Scraper {
    /// Direct browser path: acquire a pooled tab and run the full pipeline
    /// under the operation deadline. This never consults the dispatcher —
    /// the browser engines call it from inside the race.
    pub(crate) async fn scrape_browser(
        &self,
        req: &FetchRequest,
        actions: &[Action],
    ) -> Result<FetchResult, ScrapeError> {
        let deadline = self.effective_timeout(req.timeout);
        match tokio::time::timeout(deadline, self.scrape_pooled(req, actions)).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Timeout),
        }
    }

    async fn scrape_pooled(
        &self,
        req: &FetchRequest,
        actions: &[Action],
    ) -> Result<FetchResult, ScrapeError> {
        let handle = self.pool.get().await?;
        let mut lease = PageLease::new(Arc::clone(&self.pool), handle);
        let page = lease.page().clone();

        // Stealth must be registered before navigation; failure is
        // survivable, the scrape just runs unmasked.
        if req.stealth {
            let script = AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT);
            if let Err(err) = page.evaluate_on_new_document(script).await {
                warn!(error = %err, "stealth injection failed, proceeding without");
            }
        }

        install_headers(&page, req).await;
        install_cookies(&page, req).await;

        let router = HijackRouter::install(
            &page,
            &self.scraper_cfg.blocked_resource_types,
            req.block_ads,
        )
        .await?;
        lease.set_router(router);

        let result = drive_page(&page, req, actions, true).await?;

        lease.succeed();
        Ok(result)
    }

    /// One-shot scrape on a caller-supplied CDP endpoint. The remote
    /// browser is disconnected afterwards, never terminated.
    pub(crate) async fn scrape_cdp(
        &self,
        cdp_url: &str,
        req: &FetchRequest,
        actions: &[Action],
    ) -> Result<FetchResult, ScrapeError> {
        let deadline = self.effective_timeout(req.timeout);
        match tokio::time::timeout(deadline, scrape_cdp_inner(cdp_url, req, actions)).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Timeout),
        }
    }

    fn effective_timeout(&self, requested: Duration) -> Duration {
        let max = Duration::from_secs(self.scraper_cfg.max_timeout_secs);
        requested.min(max)
    }
}

async fn scrape_cdp_inner(
    cdp_url: &str,
    req: &FetchRequest,
    actions: &[Action],
) -> Result<FetchResult, ScrapeError> {
    let (browser, handler_task) = connect_browser(cdp_url).await?;

    let result = async {
        let page = browser.new_page("about:blank").await.map_err(|e| {
            ScrapeError::BrowserCrash(format!("failed to create page on CDP browser: {e}"))
        })?;

        let outcome = drive_page(&page, req, actions, false).await;

        if let Err(err) = page.close().await {
            debug!(error = %err, "failed to close CDP page");
        }
        outcome
    }
    .await;

    // Dropping the connected browser closes the websocket but leaves the
    // remote process running.
    handler_task.abort();
    drop(browser);

    result
}

/// Navigate, wait, and extract: the shared tail of both browser paths.
/// `capture_status` is skipped on external CDP browsers where the page may
/// predate our session.
async fn drive_page(
    page: &Page,
    req: &FetchRequest,
    actions: &[Action],
    capture_status: bool,
) -> Result<FetchResult, ScrapeError> {
    // The watcher must exist before navigation triggers the request burst.
    let watcher = if req.wait_for_network_idle {
        Some(NetworkIdleWatcher::install(page).await?)
    } else {
        None
    };

    page.goto(req.url.as_str()).await.map_err(classify_nav)?;

    match watcher {
        Some(watcher) => watcher.wait(SETTLE_WINDOW).await,
        None => {
            if !wait_dom_stable(page, SETTLE_WINDOW, DOM_STABLE_TOLERANCE).await {
                debug!(url = %req.url, "DOM did not stabilize, proceeding with current state");
            }
        }
    }

    let status_code = if capture_status {
        read_status(page).await
    } else {
        0
    };

    if req.remove_overlays {
        if let Err(err) = page.evaluate(OVERLAY_JS).await {
            debug!(error = %err, "overlay removal failed");
        }
    }

    if !actions.is_empty() {
        execute_actions(page, actions).await?;
    }

    let html = page
        .content()
        .await
        .map_err(|e| ScrapeError::Extraction(format!("failed to extract page HTML: {e}")))?;

    let title = eval_string(page, "document.title").await;
    let mut final_url = eval_string(page, "window.location.href").await;
    if final_url.is_empty() {
        final_url = req.url.clone();
    }

    Ok(FetchResult {
        html,
        title,
        status_code,
        final_url,
        engine_name: "browser".to_string(),
    })
}

/// Merge user headers over a defaulted Google-search Referer.
async fn install_headers(page: &Page, req: &FetchRequest) {
    let mut headers = serde_json::Map::new();

    if !req.headers.contains_key("Referer") {
        if let Some(host) = Url::parse(&req.url).ok().and_then(|u| u.host_str().map(String::from))
        {
            headers.insert(
                "Referer".to_string(),
                json!(format!("https://www.google.com/search?q={host}")),
            );
        }
    }
    for (name, value) in &req.headers {
        headers.insert(name.clone(), json!(value));
    }

    if headers.is_empty() {
        return;
    }
    let params = SetExtraHttpHeadersParams::new(Headers::new(serde_json::Value::Object(headers)));
    if let Err(err) = page.execute(params).await {
        warn!(error = %err, "failed to set extra headers");
    }
}

/// Install user cookies, defaulting domain to the request host and path to
/// `/`.
async fn install_cookies(page: &Page, req: &FetchRequest) {
    if req.cookies.is_empty() {
        return;
    }
    let request_host = Url::parse(&req.url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_default();

    for cookie in &req.cookies {
        let domain = cookie
            .domain
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| request_host.clone());
        let path = cookie
            .path
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string());

        let param = CdpCookieParam::builder()
            .name(&cookie.name)
            .value(&cookie.value)
            .domain(domain)
            .path(path)
            .build();
        match param {
            Ok(param) => {
                if let Err(err) = page.set_cookie(param).await {
                    warn!(cookie = %cookie.name, error = %err, "failed to set cookie");
                }
            }
            Err(err) => warn!(cookie = %cookie.name, error = %err, "failed to build cookie"),
        }
    }
}

async fn read_status(page: &Page) -> u16 {
    page.evaluate(STATUS_JS)
        .await
        .ok()
        .and_then(|result| result.into_value::<i64>().ok())
        .map(|status| status.clamp(0, u16::MAX as i64) as u16)
        .unwrap_or(0)
}

async fn eval_string(page: &Page, js: &str) -> String {
    page.evaluate(js)
        .await
        .ok()
        .and_then(|result| result.into_value::<String>().ok())
        .unwrap_or_default()
}

fn classify_nav(err: CdpError) -> ScrapeError {
    match err {
        CdpError::Timeout => ScrapeError::Timeout,
        other => ScrapeError::Navigation(format!("navigation to target URL failed: {other}")),
    }
}
