//! Request hijacking: resource-type blocking and ad filtering
//!
//! Intercepts every outgoing request from a tab via the CDP Fetch domain
//! and fails the blocked ones with a `BlockedByClient` reason. Blocking
//! images, stylesheets, fonts, and media cuts most of a page's bandwidth
//! and removes image-decode and reflow work from rendering.

use std::collections::HashSet;

use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, DisableParams, EnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::BlockedResource;
use crate::models::ScrapeError;

use super::blocklist::is_ad_host;

/// A running request interceptor. Stop it before the tab returns to the
/// pool, otherwise paused requests on the next use would hang forever.
pub struct HijackRouter {
    task: JoinHandle<()>,
}

impl HijackRouter {
    /// Install the interceptor on a tab. Returns `None` when there is
    /// nothing to block. Must run before navigation so the page's first
    /// request burst is already subject to the filter.
    pub async fn install(
        page: &Page,
        blocked_types: &[BlockedResource],
        block_ads: bool,
    ) -> Result<Option<Self>, ScrapeError> {
        if blocked_types.is_empty() && !block_ads {
            return Ok(None);
        }

        let blocked: HashSet<ResourceType> =
            blocked_types.iter().map(|b| to_resource_type(*b)).collect();

        page.execute(EnableParams::default())
            .await
            .map_err(|e| ScrapeError::BrowserCrash(format!("fetch enable: {e}")))?;

        let mut events = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| ScrapeError::BrowserCrash(format!("request listener: {e}")))?;

        let tab = page.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let deny = blocked.contains(&event.resource_type)
                    || (block_ads && url_is_ad(&event.request.url));

                if deny {
                    let fail = FailRequestParams::builder()
                        .request_id(event.request_id.clone())
                        .error_reason(ErrorReason::BlockedByClient)
                        .build();
                    match fail {
                        Ok(params) => {
                            let _ = tab.execute(params).await;
                        }
                        Err(err) => warn!(error = %err, "failed to build fail params"),
                    }
                } else {
                    let cont = ContinueRequestParams::builder()
                        .request_id(event.request_id.clone())
                        .build();
                    match cont {
                        Ok(params) => {
                            let _ = tab.execute(params).await;
                        }
                        Err(err) => warn!(error = %err, "failed to build continue params"),
                    }
                }
            }
        });

        Ok(Some(Self { task }))
    }

    /// Tear the interceptor down and release the Fetch domain on the tab.
    pub async fn stop(self, page: &Page) {
        self.task.abort();
        if let Err(err) = page.execute(DisableParams::default()).await {
            debug!(error = %err, "fetch disable failed");
        }
    }
}

fn to_resource_type(blocked: BlockedResource) -> ResourceType {
    match blocked {
        BlockedResource::Image => ResourceType::Image,
        BlockedResource::Stylesheet => ResourceType::Stylesheet,
        BlockedResource::Font => ResourceType::Font,
        BlockedResource::Media => ResourceType::Media,
        BlockedResource::Script => ResourceType::Script,
    }
}

fn url_is_ad(url: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(is_ad_host))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_is_ad() {
        assert!(url_is_ad("https://stats.g.doubleclick.net/collect?x=1"));
        assert!(url_is_ad("https://cdn.taboola.com/widget.js"));
        assert!(!url_is_ad("https://example.com/app.js"));
        assert!(!url_is_ad("not a url"));
    }

    #[test]
    fn test_resource_type_mapping() {
        assert_eq!(to_resource_type(BlockedResource::Image), ResourceType::Image);
        assert_eq!(
            to_resource_type(BlockedResource::Script),
            ResourceType::Script
        );
    }
}
