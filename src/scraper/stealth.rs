//! Stealth: launch flags and automation-masking scripts
//!
//! The script payload runs at document start on every navigation and hides
//! the usual automation tells (navigator.webdriver, empty plugin list,
//! missing window.chrome, headless WebGL strings). Injection failures are
//! non-fatal; the scrape proceeds unmasked.

/// Chrome switches that remove automation banners and background
/// throttling. Applied to the managed browser at launch.
pub const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-features=IsolateOrigins,site-per-process,TranslateUI",
    "--disable-infobars",
    "--disable-ipc-flooding-protection",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-renderer-backgrounding",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-component-update",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-sync",
    "--metrics-recording-only",
    "--no-first-run",
    "--no-default-browser-check",
];

/// Document-startup payload masking automation signals.
pub const STEALTH_SCRIPT: &str = r#"
(() => {
    // navigator.webdriver is the loudest tell.
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });

    // Headless Chrome ships no window.chrome runtime.
    window.chrome = window.chrome || {
        runtime: {},
        loadTimes: function() {},
        csi: function() {},
        app: {}
    };

    // Plugins are empty under automation; fake the stock trio.
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' },
            { name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }
        ],
        configurable: true
    });

    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });

    // Permissions API leaks 'denied' for notifications in headless.
    const originalQuery = window.navigator.permissions.query;
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters)
    );

    // SwiftShader strings give headless away.
    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function(parameter) {
        if (parameter === 37445) return 'Intel Inc.';
        if (parameter === 37446) return 'Intel Iris OpenGL Engine';
        return getParameter.call(this, parameter);
    };

    // ChromeDriver leaves these behind.
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_covers_known_signals() {
        assert!(STEALTH_SCRIPT.contains("webdriver"));
        assert!(STEALTH_SCRIPT.contains("window.chrome"));
        assert!(STEALTH_SCRIPT.contains("plugins"));
    }

    #[test]
    fn test_args_disable_automation_banner() {
        assert!(STEALTH_ARGS
            .iter()
            .any(|a| a.contains("AutomationControlled")));
    }
}
