//! Post-navigation wait strategies
//!
//! Two ways to decide a page has settled: silence on the network, or a DOM
//! that has stopped changing. The network-idle watcher must be installed
//! BEFORE navigation — a listener attached afterwards misses the initial
//! request burst and reports idle immediately.

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::Page;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;

use crate::models::ScrapeError;

/// Quiet window for both strategies.
pub const SETTLE_WINDOW: Duration = Duration::from_millis(300);

/// Fractional DOM size change tolerated between stability samples.
pub const DOM_STABLE_TOLERANCE: f64 = 0.1;

/// Upper bound on stability samples so a permanently mutating page cannot
/// spin this loop; the operation deadline usually fires first.
const DOM_STABLE_MAX_ROUNDS: usize = 40;

/// Watches a tab's request traffic and reports when it goes quiet.
pub struct NetworkIdleWatcher {
    sent: BoxStream<'static, Arc<EventRequestWillBeSent>>,
    finished: BoxStream<'static, Arc<EventLoadingFinished>>,
    failed: BoxStream<'static, Arc<EventLoadingFailed>>,
}

impl NetworkIdleWatcher {
    /// Subscribe to the tab's network events. Call before navigating.
    pub async fn install(page: &Page) -> Result<Self, ScrapeError> {
        page.execute(EnableParams::default())
            .await
            .map_err(|e| ScrapeError::BrowserCrash(format!("network enable: {e}")))?;

        let sent = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| ScrapeError::BrowserCrash(format!("network listener: {e}")))?;
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| ScrapeError::BrowserCrash(format!("network listener: {e}")))?;
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|e| ScrapeError::BrowserCrash(format!("network listener: {e}")))?;

        Ok(Self {
            sent: sent.boxed(),
            finished: finished.boxed(),
            failed: failed.boxed(),
        })
    }

    /// Resolve once no network event has arrived for `quiet`. The caller's
    /// operation deadline bounds the total wait.
    pub async fn wait(mut self, quiet: Duration) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(quiet) => return,
                event = self.sent.next() => {
                    if event.is_none() {
                        return;
                    }
                }
                event = self.finished.next() => {
                    if event.is_none() {
                        return;
                    }
                }
                event = self.failed.next() => {
                    if event.is_none() {
                        return;
                    }
                }
            }
        }
    }
}

/// Sample the DOM size every `window` until two consecutive samples differ
/// by at most `tolerance`. Returns whether stability was reached; callers
/// log non-convergence and proceed with the DOM as-is.
pub async fn wait_dom_stable(page: &Page, window: Duration, tolerance: f64) -> bool {
    let mut previous: Option<f64> = None;

    for _ in 0..DOM_STABLE_MAX_ROUNDS {
        let size = match dom_size(page).await {
            Some(size) => size,
            None => return false,
        };

        if let Some(prev) = previous {
            let diff = (size - prev).abs() / prev.max(1.0);
            if diff <= tolerance {
                return true;
            }
            debug!(diff, "DOM still changing");
        }
        previous = Some(size);

        tokio::time::sleep(window).await;
    }

    false
}

async fn dom_size(page: &Page) -> Option<f64> {
    page.evaluate("document.documentElement.outerHTML.length")
        .await
        .ok()?
        .into_value::<f64>()
        .ok()
}
