//! Multi-engine racing dispatcher
//!
//! Engines start in tiers: the cheapest immediately, heavier ones after
//! their escalation delay. The first success aborts every other
//! participant and is remembered per host, so the next scrape of the same
//! site skips the race entirely.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::models::ScrapeError;

use super::{DomainMemory, Engine, FetchRequest, FetchResult};

/// Coordinates the staged race across fetch engines.
pub struct Dispatcher {
    engines: Vec<Arc<dyn Engine>>,
    delays: Vec<Duration>,
    memory: Arc<DomainMemory>,
}

impl Dispatcher {
    /// `delays_ms[i]` is the start delay of `engines[i]` measured from race
    /// start; missing slots are treated as 0 and extras are ignored.
    pub fn new(
        engines: Vec<Arc<dyn Engine>>,
        delays_ms: &[u64],
        memory: Arc<DomainMemory>,
    ) -> Self {
        let delays = (0..engines.len())
            .map(|i| Duration::from_millis(delays_ms.get(i).copied().unwrap_or(0)))
            .collect();
        Self {
            engines,
            delays,
            memory,
        }
    }

    /// Run the race (or the remembered engine) and return the first
    /// successful result. If every engine fails, returns the last error.
    pub async fn dispatch(&self, req: &FetchRequest) -> Result<FetchResult, ScrapeError> {
        let host = req.host();

        // A previously successful engine short-circuits the race. Its
        // failure is informative, never fatal: forget it and race.
        if let Some(remembered) = self.memory.get(&host) {
            if let Some(engine) = self.engines.iter().find(|e| e.name() == remembered) {
                debug!(host, engine = remembered, "domain memory hit");
                match engine.fetch(req).await {
                    Ok(result) => return Ok(result),
                    Err(err) => {
                        info!(host, engine = remembered, error = %err,
                            "remembered engine failed, running full race");
                        self.memory.delete(&host);
                    }
                }
            }
        }

        self.race(req, &host).await
    }

    async fn race(&self, req: &FetchRequest, host: &str) -> Result<FetchResult, ScrapeError> {
        let (tx, mut rx) = mpsc::channel(self.engines.len().max(1));

        let mut handles = Vec::with_capacity(self.engines.len());
        for (engine, delay) in self.engines.iter().zip(&self.delays) {
            let engine = Arc::clone(engine);
            let delay = *delay;
            let req = req.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                debug!(engine = engine.name(), url = %req.url, "engine starting");
                let outcome = engine
                    .fetch(&req)
                    .await
                    .map_err(|e| ScrapeError::wrap_engine(engine.name(), e));
                let _ = tx.send(outcome).await;
            }));
        }
        drop(tx);

        // Losing engines are aborted when the guard drops: on the first
        // success, and equally when the caller's deadline drops this future
        // mid-race.
        let guard = AbortOnDrop(handles);

        let mut last_err: Option<ScrapeError> = None;
        while let Some(outcome) = rx.recv().await {
            match outcome {
                Ok(result) => {
                    drop(guard);
                    info!(engine = %result.engine_name, url = %req.url, "engine won race");
                    self.memory.set(host, &result.engine_name);
                    return Ok(result);
                }
                Err(err) => {
                    debug!(url = %req.url, error = %err, "engine failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ScrapeError::AllEnginesFailed {
            url: req.url.to_string(),
        }))
    }
}

struct AbortOnDrop(Vec<tokio::task::JoinHandle<()>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine stub with a fixed outcome, optional latency, and a call
    /// counter.
    struct StubEngine {
        name: &'static str,
        latency: Duration,
        succeed: bool,
        calls: AtomicUsize,
    }

    impl StubEngine {
        fn new(name: &'static str, latency_ms: u64, succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                latency: Duration::from_millis(latency_ms),
                succeed,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Engine for StubEngine {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self, req: &FetchRequest) -> Result<FetchResult, ScrapeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self.succeed {
                Ok(FetchResult {
                    html: format!("<html><body>from {}</body></html>", self.name),
                    title: "stub".into(),
                    status_code: 200,
                    final_url: req.url.clone(),
                    engine_name: self.name.to_string(),
                })
            } else {
                Err(ScrapeError::Fetch(format!("{} says no", self.name)))
            }
        }
    }

    fn request() -> FetchRequest {
        FetchRequest::new("https://example.com/page", Duration::from_secs(10))
    }

    fn engines(list: Vec<Arc<StubEngine>>) -> Vec<Arc<dyn Engine>> {
        list.into_iter().map(|e| e as Arc<dyn Engine>).collect()
    }

    #[tokio::test]
    async fn test_first_success_wins_and_is_remembered() {
        let memory = DomainMemory::new(Duration::from_secs(60));
        let fast = StubEngine::new("http", 0, true);
        let slow = StubEngine::new("browser", 50, true);
        let dispatcher = Dispatcher::new(
            engines(vec![fast.clone(), slow.clone()]),
            &[0, 0],
            memory.clone(),
        );

        let result = dispatcher.dispatch(&request()).await.unwrap();
        assert_eq!(result.engine_name, "http");
        assert_eq!(memory.get("example.com").as_deref(), Some("http"));
        memory.stop();
    }

    #[tokio::test]
    async fn test_escalation_after_fast_failure() {
        let memory = DomainMemory::new(Duration::from_secs(60));
        let failing = StubEngine::new("http", 0, false);
        let browser = StubEngine::new("browser", 10, true);
        let dispatcher = Dispatcher::new(
            engines(vec![failing.clone(), browser.clone()]),
            &[0, 20],
            memory.clone(),
        );

        let result = dispatcher.dispatch(&request()).await.unwrap();
        assert_eq!(result.engine_name, "browser");
        assert_eq!(memory.get("example.com").as_deref(), Some("browser"));
        assert_eq!(failing.calls(), 1);
        memory.stop();
    }

    #[tokio::test]
    async fn test_winner_aborts_still_delayed_engines() {
        let memory = DomainMemory::new(Duration::from_secs(60));
        let fast = StubEngine::new("http", 0, true);
        let stealth = StubEngine::new("browser-stealth", 0, true);
        let dispatcher = Dispatcher::new(
            engines(vec![fast, stealth.clone()]),
            &[0, 5_000],
            memory.clone(),
        );

        dispatcher.dispatch(&request()).await.unwrap();
        // Give any stray task a moment, then confirm the stealth engine
        // never started.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(stealth.calls(), 0);
        memory.stop();
    }

    #[tokio::test]
    async fn test_remembered_engine_short_circuits() {
        let memory = DomainMemory::new(Duration::from_secs(60));
        let http = StubEngine::new("http", 0, true);
        let browser = StubEngine::new("browser", 0, true);
        let dispatcher = Dispatcher::new(
            engines(vec![http.clone(), browser.clone()]),
            &[0, 0],
            memory.clone(),
        );
        memory.set("example.com", "browser");

        let result = dispatcher.dispatch(&request()).await.unwrap();
        assert_eq!(result.engine_name, "browser");
        assert_eq!(http.calls(), 0, "race should not run on a memory hit");
        memory.stop();
    }

    #[tokio::test]
    async fn test_remembered_failure_falls_back_to_race() {
        let memory = DomainMemory::new(Duration::from_secs(60));
        let http = StubEngine::new("http", 0, true);
        let browser = StubEngine::new("browser", 0, false);
        let dispatcher = Dispatcher::new(
            engines(vec![http.clone(), browser.clone()]),
            &[0, 0],
            memory.clone(),
        );
        memory.set("example.com", "browser");

        let result = dispatcher.dispatch(&request()).await.unwrap();
        assert_eq!(result.engine_name, "http");
        assert_eq!(memory.get("example.com").as_deref(), Some("http"));
        memory.stop();
    }

    #[tokio::test]
    async fn test_all_failures_return_last_error() {
        let memory = DomainMemory::new(Duration::from_secs(60));
        let a = StubEngine::new("http", 0, false);
        let b = StubEngine::new("browser", 10, false);
        let dispatcher = Dispatcher::new(engines(vec![a, b]), &[0, 0], memory.clone());

        let err = dispatcher.dispatch(&request()).await.unwrap_err();
        assert_eq!(err.code(), "ENGINE_FAILURE");
        assert!(memory.is_empty(), "no winner, no memory entry");
        memory.stop();
    }

    #[tokio::test]
    async fn test_empty_race_is_fatal() {
        let memory = DomainMemory::new(Duration::from_secs(60));
        let dispatcher = Dispatcher::new(Vec::new(), &[], memory.clone());

        let err = dispatcher.dispatch(&request()).await.unwrap_err();
        assert_eq!(err.code(), "ALL_ENGINES_FAILED");
        memory.stop();
    }

    #[tokio::test]
    async fn test_missing_delay_slots_default_to_zero() {
        let memory = DomainMemory::new(Duration::from_secs(60));
        let a = StubEngine::new("http", 0, false);
        let b = StubEngine::new("browser", 0, true);
        // Only one delay for two engines.
        let dispatcher = Dispatcher::new(engines(vec![a, b]), &[0], memory.clone());

        let result = dispatcher.dispatch(&request()).await.unwrap();
        assert_eq!(result.engine_name, "browser");
        memory.stop();
    }
}
