//! Configuration for distill

mod browser;
mod engine;
mod logging;
mod scraper;
mod server;

pub use browser::BrowserConfig;
pub use engine::{CacheConfig, EngineConfig, PoolConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use scraper::{BlockedResource, ScraperConfig};
pub use server::{AuthConfig, ServerConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the distill service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Browser process configuration
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Scrape pipeline configuration
    #[serde(default)]
    pub scraper: ScraperConfig,
    /// Multi-engine dispatcher configuration
    #[serde(default)]
    pub engine: EngineConfig,
    /// Adaptive page pool configuration
    #[serde(default)]
    pub pool: PoolConfig,
    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// API key authentication
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass rather than playing whack-a-mole.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.port == 0 {
            errors.push("server port must be positive".to_string());
        }

        if self.scraper.default_timeout_secs == 0 {
            errors.push("default_timeout_secs must be positive".to_string());
        }
        if self.scraper.max_timeout_secs < self.scraper.default_timeout_secs {
            errors.push("max_timeout_secs must be >= default_timeout_secs".to_string());
        }

        if self.engine.escalation_delays_ms.is_empty() {
            errors.push("escalation_delays_ms must not be empty".to_string());
        }
        if self.engine.http_timeout_secs == 0 {
            errors.push("http_timeout_secs must be positive".to_string());
        }

        if self.pool.min_pages == 0 {
            errors.push("min_pages must be positive".to_string());
        }
        if self.pool.hard_max < self.pool.min_pages {
            errors.push("hard_max must be >= min_pages".to_string());
        }
        if self.pool.mem_threshold <= 0.0 || self.pool.mem_threshold > 1.0 {
            errors.push("mem_threshold must be in (0.0, 1.0]".to_string());
        }
        if self.pool.scale_step <= 0.0 || self.pool.scale_step > 1.0 {
            errors.push("scale_step must be in (0.0, 1.0]".to_string());
        }

        if self.cache.max_entries == 0 {
            errors.push("cache max_entries must be positive".to_string());
        }
        if self.cache.domain_memory_ttl_secs == 0 {
            errors.push("domain_memory_ttl_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Invalid configuration:\n  - {}", errors.join("\n  - "))
        }
    }

    /// Render the default configuration as TOML (for `distill init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).expect("default config serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let toml_str = Config::default_toml();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.pool.hard_max, Config::default().pool.hard_max);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.pool.min_pages = 0;
        config.pool.mem_threshold = 1.5;
        config.cache.max_entries = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("min_pages"));
        assert!(err.contains("mem_threshold"));
        assert!(err.contains("max_entries"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: Config = toml::from_str("[pool]\nmin_pages = 5\n").unwrap();
        assert_eq!(parsed.pool.min_pages, 5);
        assert_eq!(parsed.pool.hard_max, 20);
        assert_eq!(parsed.engine.escalation_delays_ms, vec![0, 2000, 5000]);
    }
}
