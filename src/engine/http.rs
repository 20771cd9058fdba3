//! Plain-HTTP fetch engine
//!
//! The fastest tier: no browser, just a client that looks like one. The
//! client is pinned to HTTP/1.1 — the ALPN offer must never include `h2`,
//! because several bot filters fingerprint the ClientHello and because a
//! negotiated h2 stream would not match the h1 request framing this engine
//! speaks. Headers simulate a current desktop Chrome.
//!
//! The engine reports failure (so the dispatcher escalates to a browser)
//! for anything that is not a sub-400 HTML response, and for pages that
//! come back as empty SPA shells.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use scraper::{Html, Selector};
use tracing::debug;

use crate::content::visible_text;
use crate::models::ScrapeError;

use super::{Engine, FetchRequest, FetchResult};

/// Hard cap on response body size.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// TCP connect deadline.
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum redirects to follow.
const MAX_REDIRECTS: usize = 10;

/// Below this much visible body text the page is flagged as a likely SPA
/// shell. Advisory threshold only; acceptance stays status + content-type.
const SPA_SHELL_TEXT_BYTES: usize = 200;

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const CHROME_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Layer-1 fetch engine over a Chrome-profiled HTTP/1.1 client.
pub struct HttpEngine {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpEngine {
    /// Build the engine. `timeout` bounds each fetch end to end;
    /// `default_proxy` applies when the request carries no override.
    pub fn new(timeout: Duration, default_proxy: Option<&str>) -> Result<Self, ScrapeError> {
        let client = build_client(default_proxy)?;
        Ok(Self { client, timeout })
    }

    async fn do_fetch(
        &self,
        client: &reqwest::Client,
        req: &FetchRequest,
    ) -> Result<FetchResult, ScrapeError> {
        let mut request = client
            .get(&req.url)
            .timeout(self.timeout.min(req.timeout));

        for (name, value) in &req.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !req.cookies.is_empty() {
            let cookie_header = req
                .cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(reqwest::header::COOKIE, cookie_header);
        }

        let response = request.send().await.map_err(classify)?;

        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = read_capped(response).await?;

        // Anything that is not successful HTML is a failure here so the
        // dispatcher can escalate to a browser engine.
        if status.as_u16() >= 400 || !is_html_content_type(&content_type) {
            return Err(ScrapeError::Fetch(format!(
                "non-html or error status {} (content-type: {})",
                status.as_u16(),
                content_type
            )));
        }

        // Advisory only: a near-empty body usually means a JS shell, but
        // short static pages are legitimate, so this never fails the fetch.
        if visible_text(&body).len() < SPA_SHELL_TEXT_BYTES {
            debug!(url = %req.url, "body has little visible text, may be an SPA shell");
        }

        Ok(FetchResult {
            title: extract_title(&body),
            html: body,
            status_code: status.as_u16(),
            final_url,
            engine_name: self.name().to_string(),
        })
    }
}

#[async_trait]
impl Engine for HttpEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResult, ScrapeError> {
        let result = match &req.proxy_url {
            // A per-request proxy needs its own client; connection reuse is
            // irrelevant for a one-shot escalation tier.
            Some(proxy) => {
                let client = build_client(Some(proxy))?;
                self.do_fetch(&client, req).await
            }
            None => self.do_fetch(&self.client, req).await,
        };
        result.map_err(|e| ScrapeError::wrap_engine(self.name(), e))
    }
}

fn build_client(proxy: Option<&str>) -> Result<reqwest::Client, ScrapeError> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(
        HeaderName::from_static("accept"),
        HeaderValue::from_static(CHROME_ACCEPT),
    );
    default_headers.insert(
        HeaderName::from_static("accept-language"),
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    // No compression: the 10 MiB cap must apply to the decoded stream.
    default_headers.insert(
        HeaderName::from_static("accept-encoding"),
        HeaderValue::from_static("identity"),
    );

    let mut builder = reqwest::Client::builder()
        .user_agent(CHROME_UA)
        .default_headers(default_headers)
        // ALPN http/1.1 only; a ClientHello offering h2 would let the
        // server negotiate a protocol this engine cannot frame.
        .http1_only()
        .connect_timeout(DIAL_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));

    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| ScrapeError::InvalidInput(format!("proxy url: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ScrapeError::Fetch(format!("client construction: {e}")))
}

/// Stream the body into a string, failing once the cap is exceeded.
async fn read_capped(response: reqwest::Response) -> Result<String, ScrapeError> {
    if let Some(len) = response.content_length() {
        if len as usize > MAX_BODY_BYTES {
            return Err(ScrapeError::Fetch(format!("content too large: {len} bytes")));
        }
    }

    let mut buf: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(classify)?;
        if buf.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(ScrapeError::Fetch(format!(
                "content too large: exceeded {MAX_BODY_BYTES} bytes"
            )));
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn classify(err: reqwest::Error) -> ScrapeError {
    if err.is_timeout() {
        ScrapeError::Timeout
    } else if err.is_redirect() {
        ScrapeError::Fetch("too many redirects".into())
    } else {
        ScrapeError::Fetch(err.to_string())
    }
}

fn is_html_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml+xml")
}

/// Text of the first `<title>` element, or empty.
fn extract_title(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").expect("static selector");
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_content_type_acceptance() {
        assert!(is_html_content_type("text/html"));
        assert!(is_html_content_type("text/html; charset=utf-8"));
        assert!(is_html_content_type("application/xhtml+xml"));
        assert!(is_html_content_type("Text/HTML"));
        assert!(!is_html_content_type("application/json"));
        assert!(!is_html_content_type("text/plain"));
        assert!(!is_html_content_type(""));
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("<html><head><title> Hi there </title></head></html>"),
            "Hi there"
        );
        assert_eq!(extract_title("<html><body>no title</body></html>"), "");
        // First title wins.
        assert_eq!(
            extract_title("<title>first</title><title>second</title>"),
            "first"
        );
    }

    #[test]
    fn test_spa_shell_threshold() {
        let shell = r#"<html><body><div id="root"></div><script src="app.js"></script></body></html>"#;
        assert!(visible_text(shell).len() < SPA_SHELL_TEXT_BYTES);

        let article = format!(
            "<html><body><p>{}</p></body></html>",
            "substantial page text. ".repeat(20)
        );
        assert!(visible_text(&article).len() >= SPA_SHELL_TEXT_BYTES);
    }

    #[tokio::test]
    async fn test_engine_name() {
        let engine = HttpEngine::new(Duration::from_secs(5), None).unwrap();
        assert_eq!(engine.name(), "http");
    }
}
