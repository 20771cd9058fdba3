//! Dispatcher, page pool, and cache configuration

use serde::{Deserialize, Serialize};

/// Multi-engine racing dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Toggle the multi-engine dispatcher; when off, every scrape takes the
    /// direct browser path
    #[serde(default = "default_true")]
    pub enable_multi_engine: bool,
    /// Staged start delay for each engine tier, in milliseconds. The first
    /// entry should be 0. Missing slots are treated as 0, extras ignored.
    #[serde(default = "default_escalation_delays")]
    pub escalation_delays_ms: Vec<u64>,
    /// Dial + response deadline for the pure HTTP engine (seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_escalation_delays() -> Vec<u64> {
    vec![0, 2000, 5000]
}

fn default_http_timeout_secs() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_multi_engine: true,
            escalation_delays_ms: default_escalation_delays(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Adaptive page pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Minimum number of tabs kept alive
    #[serde(default = "default_min_pages")]
    pub min_pages: usize,
    /// Absolute maximum number of tabs
    #[serde(default = "default_hard_max")]
    pub hard_max: usize,
    /// Memory fraction (0.0-1.0] above which the pool sheds idle tabs
    #[serde(default = "default_mem_threshold")]
    pub mem_threshold: f64,
    /// Fraction of pool size to grow or shrink per scaling interval
    #[serde(default = "default_scale_step")]
    pub scale_step: f64,
}

fn default_min_pages() -> usize {
    3
}

fn default_hard_max() -> usize {
    20
}

fn default_mem_threshold() -> f64 {
    0.9
}

fn default_scale_step() -> f64 {
    0.05
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pages: default_min_pages(),
            hard_max: default_hard_max(),
            mem_threshold: default_mem_threshold(),
            scale_step: default_scale_step(),
        }
    }
}

/// Response cache and domain memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached scrape responses
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// How long a host's winning engine is remembered (seconds)
    #[serde(default = "default_domain_memory_ttl_secs")]
    pub domain_memory_ttl_secs: u64,
}

fn default_max_entries() -> usize {
    1000
}

fn default_domain_memory_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            domain_memory_ttl_secs: default_domain_memory_ttl_secs(),
        }
    }
}
