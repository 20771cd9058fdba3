//! Scrape error taxonomy
//!
//! Every failure in the fetch subsystem maps to one of these kinds. The
//! stable string codes are part of the API contract: the HTTP layer maps
//! them to response statuses, so they must not change between releases.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the fetch subsystem.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The operation deadline was exceeded at some stage.
    #[error("scrape deadline exceeded")]
    Timeout,

    /// The caller abandoned the request before completion.
    #[error("request canceled by caller")]
    Canceled,

    /// Browser unreachable, tab creation failed, or CDP connect failed.
    #[error("browser unavailable: {0}")]
    BrowserCrash(String),

    /// Navigation returned an error that is neither a timeout nor a cancel.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// A scripted action aborted; identifies which one out of how many.
    #[error("action {index} of {total} ({kind}) failed: {message}")]
    ActionFailed {
        index: usize,
        total: usize,
        kind: String,
        message: String,
    },

    /// An individual engine failed. Never fatal to the dispatcher while
    /// other engines may still succeed.
    #[error("engine {engine}: {source}")]
    Engine {
        engine: String,
        #[source]
        source: Box<ScrapeError>,
    },

    /// Every engine in the race reported failure.
    #[error("all engines failed for {url}")]
    AllEnginesFailed { url: String },

    /// The request failed validation before any fetching started.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A plain HTTP fetch failed (transport error, oversized body,
    /// unacceptable status or content type).
    #[error("http fetch failed: {0}")]
    Fetch(String),

    /// Reading the rendered page back out of the browser failed.
    #[error("content extraction failed: {0}")]
    Extraction(String),
}

impl ScrapeError {
    /// Stable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self.root() {
            ScrapeError::Timeout | ScrapeError::Canceled => "SCRAPE_TIMEOUT",
            ScrapeError::BrowserCrash(_) => "BROWSER_CRASH",
            ScrapeError::Navigation(_) => "NAVIGATION_FAILED",
            ScrapeError::ActionFailed { .. } => "ACTION_FAILED",
            ScrapeError::AllEnginesFailed { .. } => "ALL_ENGINES_FAILED",
            ScrapeError::InvalidInput(_) => "INVALID_INPUT",
            ScrapeError::Fetch(_) => "FETCH_FAILED",
            ScrapeError::Extraction(_) => "CONTENT_EXTRACTION_FAILED",
            ScrapeError::Engine { .. } => "ENGINE_FAILURE",
        }
    }

    /// True for deadline/cancel kinds, which the facade must propagate
    /// unchanged instead of falling back to another fetch path.
    pub fn is_timeout_or_canceled(&self) -> bool {
        matches!(
            self.root(),
            ScrapeError::Timeout | ScrapeError::Canceled
        )
    }

    /// Wrap an error with the engine that produced it. Errors already
    /// carrying an engine name are passed through so the name is attached
    /// exactly once.
    pub fn wrap_engine(engine: &str, err: ScrapeError) -> ScrapeError {
        match err {
            wrapped @ ScrapeError::Engine { .. } => wrapped,
            other => ScrapeError::Engine {
                engine: engine.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Unwrap engine wrappers down to the underlying kind.
    fn root(&self) -> &ScrapeError {
        let mut cur = self;
        while let ScrapeError::Engine { source, .. } = cur {
            cur = source.as_ref();
        }
        cur
    }

    /// Structured detail for the API layer.
    pub fn to_detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// The structured error carried in API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_stable() {
        assert_eq!(ScrapeError::Timeout.code(), "SCRAPE_TIMEOUT");
        assert_eq!(ScrapeError::Canceled.code(), "SCRAPE_TIMEOUT");
        assert_eq!(
            ScrapeError::BrowserCrash("gone".into()).code(),
            "BROWSER_CRASH"
        );
        assert_eq!(
            ScrapeError::AllEnginesFailed {
                url: "https://example.com".into()
            }
            .code(),
            "ALL_ENGINES_FAILED"
        );
    }

    #[test]
    fn test_engine_wrap_once() {
        let inner = ScrapeError::Fetch("status 503".into());
        let wrapped = ScrapeError::wrap_engine("http", inner);
        let rewrapped = ScrapeError::wrap_engine("browser", wrapped);
        match &rewrapped {
            ScrapeError::Engine { engine, .. } => assert_eq!(engine, "http"),
            other => panic!("expected engine wrapper, got {other:?}"),
        }
    }

    #[test]
    fn test_engine_wrapper_preserves_root_kind() {
        let err = ScrapeError::wrap_engine("browser", ScrapeError::Timeout);
        assert!(err.is_timeout_or_canceled());
        assert_eq!(err.code(), "SCRAPE_TIMEOUT");
    }

    #[test]
    fn test_action_failed_message() {
        let err = ScrapeError::ActionFailed {
            index: 0,
            total: 3,
            kind: "click".into(),
            message: "element \".btn\" not found".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("action 0 of 3"), "got: {msg}");
        assert!(msg.contains("(click)"));
        assert!(msg.contains("not found"));
    }
}
