//! Browser-backed engine implementations
//!
//! These live next to the pool they borrow tabs from; the dispatcher sees
//! only the `Engine` trait. The stealth variant is the same pipeline with
//! evasions forced on, racing as its own escalation tier.

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::{Engine, FetchRequest, FetchResult};
use crate::models::ScrapeError;

use super::Scraper;

/// An `Engine` over the pooled browser pipeline.
pub struct BrowserEngine {
    scraper: Arc<Scraper>,
    force_stealth: bool,
    name: &'static str,
}

impl BrowserEngine {
    /// `force_stealth` turns this into the "browser-stealth" tier, which
    /// sets the stealth flag regardless of the request.
    pub fn new(scraper: Arc<Scraper>, force_stealth: bool) -> Self {
        Self {
            scraper,
            force_stealth,
            name: if force_stealth {
                "browser-stealth"
            } else {
                "browser"
            },
        }
    }
}

#[async_trait]
impl Engine for BrowserEngine {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResult, ScrapeError> {
        let mut req = req.clone();
        if self.force_stealth {
            req.stealth = true;
        }

        let mut result = self
            .scraper
            .scrape_browser(&req, &[])
            .await
            .map_err(|e| ScrapeError::wrap_engine(self.name, e))?;

        result.engine_name = self.name.to_string();
        Ok(result)
    }
}
