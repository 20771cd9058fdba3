//! In-memory response cache
//!
//! Keyed by SHA-256 of `url|output_format|extract_mode`. Reads take the
//! shared lock, writes the exclusive one. A background sweeper drops stale
//! entries every five minutes; capacity overflow evicts one arbitrary
//! entry at write time (callers must not assume LRU).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::ScrapeResponse;

/// How often the sweeper wakes up.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Entries older than this are dropped by the sweeper regardless of the
/// max-age any future reader might ask for.
const MAX_ENTRY_AGE: Duration = Duration::from_secs(60 * 60);

struct Entry {
    response: ScrapeResponse,
    created_at: Instant,
}

/// Thread-safe scrape response cache with TTL and capacity eviction.
pub struct ResponseCache {
    store: RwLock<HashMap<String, Entry>>,
    max_entries: usize,
    shutdown: broadcast::Sender<()>,
}

impl ResponseCache {
    /// Create a cache and start its background sweeper. Call [`stop`] on
    /// shutdown to terminate the sweeper deterministically.
    ///
    /// [`stop`]: ResponseCache::stop
    pub fn new(max_entries: usize) -> Arc<Self> {
        let (shutdown, _) = broadcast::channel(1);
        let cache = Arc::new(Self {
            store: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            shutdown,
        });

        let sweeper = Arc::clone(&cache);
        let mut shutdown_rx = sweeper.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await; // first tick is immediate; skip it
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => sweeper.sweep(),
                }
            }
        });

        cache
    }

    /// Build the cache key for a request variant.
    pub fn key(url: &str, output_format: &str, extract_mode: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(b"|");
        hasher.update(output_format.as_bytes());
        hasher.update(b"|");
        hasher.update(extract_mode.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Return the cached response if one exists and is younger than
    /// `max_age_ms`. A non-positive max age never consults the store.
    pub fn get(&self, key: &str, max_age_ms: i64) -> Option<ScrapeResponse> {
        if max_age_ms <= 0 {
            return None;
        }
        let max_age = Duration::from_millis(max_age_ms as u64);

        let store = self.store.read();
        let entry = store.get(key)?;
        if entry.created_at.elapsed() > max_age {
            return None;
        }
        Some(entry.response.clone())
    }

    /// Insert a response. At capacity, one arbitrary entry is evicted first.
    pub fn set(&self, key: &str, response: ScrapeResponse) {
        let mut store = self.store.write();

        if store.len() >= self.max_entries && !store.contains_key(key) {
            if let Some(victim) = store.keys().next().cloned() {
                store.remove(&victim);
            }
        }

        store.insert(
            key.to_string(),
            Entry {
                response,
                created_at: Instant::now(),
            },
        );
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    /// Terminate the background sweeper.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    fn sweep(&self) {
        // Collect candidates under the shared lock, then delete one at a
        // time so readers never wait behind more than a single removal.
        let expired: Vec<String> = self
            .store
            .read()
            .iter()
            .filter(|(_, e)| e.created_at.elapsed() > MAX_ENTRY_AGE)
            .map(|(k, _)| k.clone())
            .collect();

        let mut dropped = 0usize;
        for key in expired {
            let mut store = self.store.write();
            if let Some(entry) = store.get(&key) {
                if entry.created_at.elapsed() > MAX_ENTRY_AGE {
                    store.remove(&key);
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            debug!(dropped, remaining = self.len(), "cache sweep");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CacheStatus, Timing};
    use chrono::Utc;

    fn response_for(url: &str) -> ScrapeResponse {
        ScrapeResponse {
            success: true,
            url: url.to_string(),
            final_url: url.to_string(),
            title: "t".into(),
            content: "<html></html>".into(),
            content_format: "html".into(),
            status_code: 200,
            engine: "http".into(),
            fetch_method: "http".into(),
            cache_status: CacheStatus::Miss,
            links: Vec::new(),
            images: Vec::new(),
            fingerprint: "0000000000000000".into(),
            timing: Timing::default(),
            scraped_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = ResponseCache::new(10);
        let key = ResponseCache::key("https://example.com", "html", "raw");
        cache.set(&key, response_for("https://example.com"));

        let hit = cache.get(&key, 60_000).expect("fresh entry should hit");
        assert_eq!(hit.url, "https://example.com");
        cache.stop();
    }

    #[tokio::test]
    async fn test_zero_max_age_always_misses() {
        let cache = ResponseCache::new(10);
        let key = ResponseCache::key("https://example.com", "html", "raw");
        cache.set(&key, response_for("https://example.com"));

        assert!(cache.get(&key, 0).is_none());
        assert!(cache.get(&key, -5).is_none());
        cache.stop();
    }

    #[tokio::test]
    async fn test_expired_entry_misses() {
        let cache = ResponseCache::new(10);
        let key = ResponseCache::key("https://example.com", "html", "raw");
        cache.set(&key, response_for("https://example.com"));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get(&key, 10).is_none());
        assert!(cache.get(&key, 60_000).is_some());
        cache.stop();
    }

    #[tokio::test]
    async fn test_capacity_bound_holds() {
        let cache = ResponseCache::new(3);
        for i in 0..10 {
            let url = format!("https://example.com/{i}");
            let key = ResponseCache::key(&url, "html", "raw");
            cache.set(&key, response_for(&url));
            assert!(cache.len() <= 3, "store grew past capacity at insert {i}");
        }
        cache.stop();
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict_others() {
        let cache = ResponseCache::new(2);
        let a = ResponseCache::key("https://a.example", "html", "raw");
        let b = ResponseCache::key("https://b.example", "html", "raw");
        cache.set(&a, response_for("https://a.example"));
        cache.set(&b, response_for("https://b.example"));
        // Rewriting an existing key must not push the store over or
        // needlessly evict the sibling.
        cache.set(&a, response_for("https://a.example"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&b, 60_000).is_some());
        cache.stop();
    }

    #[test]
    fn test_key_varies_by_all_parts() {
        let base = ResponseCache::key("https://example.com", "html", "raw");
        assert_ne!(base, ResponseCache::key("https://example.org", "html", "raw"));
        assert_ne!(base, ResponseCache::key("https://example.com", "text", "raw"));
        assert_eq!(base, ResponseCache::key("https://example.com", "html", "raw"));
        assert_eq!(base.len(), 64);
    }
}
