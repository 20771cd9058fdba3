//! Per-host engine memory
//!
//! Remembers which engine last won for a host so subsequent scrapes skip
//! the race. Entries carry a TTL; expired entries are removed lazily on
//! read and in bulk by an hourly sweeper.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

/// Interval for the bulk expiry sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

struct DomainEntry {
    engine: String,
    expires_at: Instant,
}

/// Concurrent host → preferred-engine map with TTL.
pub struct DomainMemory {
    store: DashMap<String, DomainEntry>,
    ttl: Duration,
    shutdown: broadcast::Sender<()>,
}

impl DomainMemory {
    /// Create the memory and start its sweeper. Call [`stop`] on shutdown.
    ///
    /// [`stop`]: DomainMemory::stop
    pub fn new(ttl: Duration) -> Arc<Self> {
        let (shutdown, _) = broadcast::channel(1);
        let memory = Arc::new(Self {
            store: DashMap::new(),
            ttl,
            shutdown,
        });

        let sweeper = Arc::clone(&memory);
        let mut shutdown_rx = sweeper.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => sweeper.sweep(),
                }
            }
        });

        memory
    }

    /// Remembered engine for a host, or `None` if absent/expired.
    /// Expired entries are deleted on the spot.
    pub fn get(&self, host: &str) -> Option<String> {
        {
            let entry = self.store.get(host)?;
            if Instant::now() <= entry.expires_at {
                return Some(entry.engine.clone());
            }
        }
        // Guard dropped above; safe to take the shard lock again.
        self.store.remove(host);
        None
    }

    /// Record the engine that just succeeded for a host.
    pub fn set(&self, host: &str, engine: &str) {
        self.store.insert(
            host.to_string(),
            DomainEntry {
                engine: engine.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Forget a host (e.g. after its remembered engine failed).
    pub fn delete(&self, host: &str) {
        self.store.remove(host);
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Terminate the sweeper.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    fn sweep(&self) {
        let now = Instant::now();
        let before = self.store.len();
        self.store.retain(|_, entry| now <= entry.expires_at);
        let dropped = before - self.store.len();
        if dropped > 0 {
            debug!(dropped, "domain memory sweep");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get() {
        let memory = DomainMemory::new(Duration::from_secs(60));
        memory.set("example.com", "http");
        assert_eq!(memory.get("example.com").as_deref(), Some("http"));
        assert_eq!(memory.get("other.com"), None);
        memory.stop();
    }

    #[tokio::test]
    async fn test_overwrite() {
        let memory = DomainMemory::new(Duration::from_secs(60));
        memory.set("example.com", "http");
        memory.set("example.com", "browser");
        assert_eq!(memory.get("example.com").as_deref(), Some("browser"));
        memory.stop();
    }

    #[tokio::test]
    async fn test_expiry_is_lazy_deleted() {
        let memory = DomainMemory::new(Duration::from_millis(10));
        memory.set("example.com", "http");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(memory.get("example.com"), None);
        assert!(memory.is_empty(), "expired entry should be removed on read");
        memory.stop();
    }

    #[tokio::test]
    async fn test_delete() {
        let memory = DomainMemory::new(Duration::from_secs(60));
        memory.set("example.com", "browser-stealth");
        memory.delete("example.com");
        assert_eq!(memory.get("example.com"), None);
        memory.stop();
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_only() {
        let memory = DomainMemory::new(Duration::from_millis(10));
        memory.set("old.example", "http");
        tokio::time::sleep(Duration::from_millis(30)).await;
        memory.set("fresh.example", "browser");
        // Sweep manually rather than waiting an hour.
        memory.sweep();
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.get("fresh.example").as_deref(), Some("browser"));
        memory.stop();
    }
}
