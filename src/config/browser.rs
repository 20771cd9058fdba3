//! Browser process configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the managed Chromium instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run the browser headless
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Disable Chrome's sandbox (required in most containers)
    #[serde(default)]
    pub no_sandbox: bool,
    /// Explicit Chromium binary path; auto-discovered when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_bin: Option<PathBuf>,
    /// Default proxy URL applied to the browser process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_proxy: Option<String>,
}

fn default_headless() -> bool {
    true
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            no_sandbox: false,
            browser_bin: None,
            default_proxy: None,
        }
    }
}
