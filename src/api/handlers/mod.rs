//! HTTP API request handlers

mod scrape;
mod system;

use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::ScraperConfig;
use crate::engine::DomainMemory;
use crate::scraper::Scraper;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<Scraper>,
    pub cache: Arc<ResponseCache>,
    pub memory: Arc<DomainMemory>,
    pub scraper_cfg: ScraperConfig,
}

pub use scrape::scrape;
pub use system::{health, stats};
