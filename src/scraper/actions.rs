//! Scripted browser actions
//!
//! Runs the caller's ordered action list on the settled page. Each action
//! gets its own deadline; the first failure aborts the whole list with an
//! error naming the failed index.

use std::time::Duration;

use chromiumoxide::Page;
use tracing::debug;

use crate::models::{Action, ActionKind, ScrapeError, ScrollDirection};

/// Per-action deadline.
const ACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting for a selector to appear.
const SELECTOR_POLL: Duration = Duration::from_millis(100);

/// Pause between scroll steps so lazy-loaded content gets to trigger.
const SCROLL_STEP_PAUSE: Duration = Duration::from_millis(100);

/// Execute all actions in order. Fails fast with the index and kind of the
/// first action that errors or overruns its deadline.
pub async fn execute_actions(page: &Page, actions: &[Action]) -> Result<(), ScrapeError> {
    for (index, action) in actions.iter().enumerate() {
        debug!(index, kind = action.kind.as_str(), "executing action");
        match tokio::time::timeout(ACTION_TIMEOUT, execute_one(page, action)).await {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                return Err(ScrapeError::ActionFailed {
                    index,
                    total: actions.len(),
                    kind: action.kind.as_str().to_string(),
                    message,
                })
            }
            Err(_) => {
                return Err(ScrapeError::ActionFailed {
                    index,
                    total: actions.len(),
                    kind: action.kind.as_str().to_string(),
                    message: format!("deadline of {ACTION_TIMEOUT:?} exceeded"),
                })
            }
        }
    }
    Ok(())
}

async fn execute_one(page: &Page, action: &Action) -> Result<(), String> {
    match action.kind {
        ActionKind::Wait => exec_wait(page, action).await,
        ActionKind::Click => exec_click(page, action).await,
        ActionKind::Scroll => exec_scroll(page, action).await,
        ActionKind::ExecuteJs => exec_js(page, action).await,
        // A capture-point marker for multi-step flows; nothing to do here.
        ActionKind::Scrape => Ok(()),
    }
}

/// Sleep for the given duration, or poll until the selector matches.
async fn exec_wait(page: &Page, action: &Action) -> Result<(), String> {
    if let Some(selector) = &action.selector {
        loop {
            if page.find_element(selector.as_str()).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    if let Some(ms) = action.milliseconds {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
    Ok(())
}

async fn exec_click(page: &Page, action: &Action) -> Result<(), String> {
    let selector = action
        .selector
        .as_deref()
        .ok_or_else(|| "click action requires a selector".to_string())?;

    let element = page
        .find_element(selector)
        .await
        .map_err(|e| format!("element {selector:?} not found: {e}"))?;
    element
        .click()
        .await
        .map_err(|e| format!("click on {selector:?} failed: {e}"))?;
    Ok(())
}

/// Scroll by N viewports in the requested direction, pausing between steps.
async fn exec_scroll(page: &Page, action: &Action) -> Result<(), String> {
    let amount = action.amount.unwrap_or(1).max(1);

    let viewport_height = page
        .evaluate("window.innerHeight")
        .await
        .map_err(|e| format!("failed to get viewport height: {e}"))?
        .into_value::<f64>()
        .map_err(|e| format!("viewport height not numeric: {e}"))?;

    let delta = match action.direction {
        Some(ScrollDirection::Up) => -viewport_height,
        _ => viewport_height,
    };

    for step in 0..amount {
        page.evaluate(format!("window.scrollBy(0, {delta})"))
            .await
            .map_err(|e| format!("scroll step {step} failed: {e}"))?;
        tokio::time::sleep(SCROLL_STEP_PAUSE).await;
    }
    Ok(())
}

async fn exec_js(page: &Page, action: &Action) -> Result<(), String> {
    let code = action
        .code
        .as_deref()
        .ok_or_else(|| "execute_js action requires code".to_string())?;
    page.evaluate(code)
        .await
        .map_err(|e| format!("script evaluation failed: {e}"))?;
    Ok(())
}
