//! Browser process management and the pooled page factory

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::models::ScrapeError;
use crate::scraper::pool::PageFactory;
use crate::scraper::stealth::STEALTH_ARGS;

/// Common Chromium install locations, checked before falling back to PATH.
const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/opt/google/chrome/google-chrome",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Locate a Chromium binary.
pub fn find_chrome() -> Result<PathBuf, ScrapeError> {
    for path in CHROME_PATHS {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    for cmd in &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Err(ScrapeError::BrowserCrash(
        "Chrome/Chromium not found; install it or set browser_bin".into(),
    ))
}

/// Launch the managed browser with the stealth flag set applied.
/// Returns the browser and the spawned CDP event-handler task.
pub(crate) async fn launch_browser(
    cfg: &BrowserConfig,
) -> Result<(Browser, JoinHandle<()>), ScrapeError> {
    let bin = match &cfg.browser_bin {
        Some(path) => path.clone(),
        None => find_chrome()?,
    };

    let mut builder = CdpBrowserConfig::builder().chrome_executable(bin);
    if !cfg.headless {
        builder = builder.with_head();
    }
    if cfg.no_sandbox {
        builder = builder.arg("--no-sandbox");
    }
    if let Some(proxy) = &cfg.default_proxy {
        builder = builder.arg(format!("--proxy-server={proxy}"));
    }
    for arg in STEALTH_ARGS {
        builder = builder.arg(*arg);
    }

    let config = builder
        .build()
        .map_err(|e| ScrapeError::BrowserCrash(format!("browser config: {e}")))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| ScrapeError::BrowserCrash(format!("failed to launch browser: {e}")))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    info!(headless = cfg.headless, "browser launched");
    Ok((browser, handler_task))
}

/// Connect to a caller-supplied CDP endpoint. Accepts a `ws://` URL
/// directly, or an `http(s)://` devtools address whose websocket URL is
/// discovered via `/json/version`. Dropping the returned browser
/// disconnects without terminating the remote process.
pub(crate) async fn connect_browser(
    cdp_url: &str,
) -> Result<(Browser, JoinHandle<()>), ScrapeError> {
    let ws_url = if cdp_url.starts_with("ws://") || cdp_url.starts_with("wss://") {
        cdp_url.to_string()
    } else {
        resolve_ws_url(cdp_url).await?
    };

    debug!(ws_url, "connecting to external browser");
    let (browser, mut handler) = Browser::connect(&ws_url)
        .await
        .map_err(|e| ScrapeError::BrowserCrash(format!("failed to connect to CDP url: {e}")))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    Ok((browser, handler_task))
}

async fn resolve_ws_url(http_url: &str) -> Result<String, ScrapeError> {
    let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));
    let response: serde_json::Value = reqwest::Client::new()
        .get(&version_url)
        .send()
        .await
        .map_err(|e| ScrapeError::BrowserCrash(format!("CDP endpoint unreachable: {e}")))?
        .json()
        .await
        .map_err(|e| ScrapeError::BrowserCrash(format!("CDP version response: {e}")))?;

    response
        .get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            ScrapeError::BrowserCrash("no webSocketDebuggerUrl in CDP version response".into())
        })
}

/// Creates pooled tabs on the managed browser.
pub struct ChromiumFactory {
    browser: Arc<Mutex<Browser>>,
}

impl ChromiumFactory {
    pub fn new(browser: Arc<Mutex<Browser>>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl PageFactory for ChromiumFactory {
    type Page = Page;

    async fn create(&self) -> Result<Page, ScrapeError> {
        let browser = self.browser.lock().await;
        browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::BrowserCrash(format!("failed to create page: {e}")))
    }

    async fn destroy(&self, page: &Page) {
        if let Err(err) = page.clone().close().await {
            warn!(error = %err, "failed to close page");
        }
    }
}
