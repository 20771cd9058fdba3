//! Log output configuration
//!
//! Controls the tracing subscriber installed at startup. Text is the
//! default for terminals; JSON emits one event per line for log shippers.
//! `RUST_LOG`, when set, overrides the configured level entirely.

use serde::{Deserialize, Serialize};

/// Output encoding for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Minimum severity emitted for distill's own spans and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output encoding
    #[serde(default)]
    pub format: LogFormat,
    /// Minimum severity for distill's own output
    #[serde(default)]
    pub level: LogLevel,
}

impl LoggingConfig {
    /// Env-filter directive for the subscriber: distill at the configured
    /// level, dependency crates (chromiumoxide is chatty at debug) capped
    /// at info.
    pub fn filter_directive(&self) -> String {
        format!("distill={},info", self.level.directive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        let cfg = LoggingConfig {
            format: LogFormat::Text,
            level: LogLevel::Debug,
        };
        assert_eq!(cfg.filter_directive(), "distill=debug,info");
        assert_eq!(LoggingConfig::default().filter_directive(), "distill=info,info");
    }

    #[test]
    fn test_serde_names_are_lowercase() {
        let cfg: LoggingConfig =
            toml::from_str("format = \"json\"\nlevel = \"warn\"\n").unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, LogLevel::Warn);
    }

    #[test]
    fn test_defaults() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.format, LogFormat::Text);
        assert_eq!(cfg.level, LogLevel::Info);
    }
}
