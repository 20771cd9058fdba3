//! Scrape pipeline configuration

use serde::{Deserialize, Serialize};

/// Resource types the hijack router may block before they hit the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockedResource {
    Image,
    Stylesheet,
    Font,
    Media,
    Script,
}

/// Scraping behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Per-request timeout when the client does not specify one (seconds)
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Maximum timeout a client may request (seconds)
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,
    /// Resource types failed by the request interceptor
    #[serde(default = "default_blocked_resources")]
    pub blocked_resource_types: Vec<BlockedResource>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_timeout_secs() -> u64 {
    120
}

fn default_blocked_resources() -> Vec<BlockedResource> {
    vec![
        BlockedResource::Image,
        BlockedResource::Stylesheet,
        BlockedResource::Font,
        BlockedResource::Media,
    ]
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
            blocked_resource_types: default_blocked_resources(),
        }
    }
}
