//! Adaptive browser page pool
//!
//! Keeps a bounded set of reusable tabs alive, tracks per-tab health, and
//! resizes itself: shedding idle tabs under memory pressure, growing when
//! utilization runs hot. Tabs that accumulate errors, age out, or hit
//! their reuse budget are retired and destroyed.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::System;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::models::{PoolStats, ScrapeError};

/// How often the scaling loop samples memory and utilization.
const SCALE_INTERVAL: Duration = Duration::from_secs(10);

/// Retirement thresholds.
const RETIRE_ERR_SCORE: f64 = 3.0;
const RETIRE_USE_COUNT: u32 = 50;
const RETIRE_AGE: Duration = Duration::from_secs(50 * 60);

/// Utilization fraction above which the pool grows.
const GROW_UTILIZATION: f64 = 0.8;

/// Creates and destroys the underlying browser resources. The pool is
/// generic over this so tests can run it without a browser.
#[async_trait]
pub trait PageFactory: Send + Sync + 'static {
    type Page: Send + Sync + 'static;

    async fn create(&self) -> Result<Self::Page, ScrapeError>;

    /// Best-effort teardown; errors are swallowed by the implementation.
    async fn destroy(&self, page: &Self::Page);
}

#[derive(Debug, Clone, Copy, Default)]
struct Health {
    err_score: f64,
    use_count: u32,
}

/// A pooled tab with health bookkeeping. Callers hold the handle only
/// between `get` and `put`; retirement is terminal.
#[derive(Debug)]
pub struct PageHandle<P> {
    id: u64,
    created: Instant,
    page: P,
    health: Mutex<Health>,
}

impl<P> PageHandle<P> {
    fn new(id: u64, page: P) -> Self {
        Self {
            id,
            created: Instant::now(),
            page,
            health: Mutex::new(Health::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn err_score(&self) -> f64 {
        self.health.lock().err_score
    }

    pub fn use_count(&self) -> u32 {
        self.health.lock().use_count
    }

    fn record(&self, success: bool) {
        let mut health = self.health.lock();
        health.use_count += 1;
        if success {
            health.err_score = (health.err_score - 0.5).max(0.0);
        } else {
            health.err_score += 1.0;
        }
    }

    fn should_retire(&self) -> bool {
        let health = self.health.lock();
        health.err_score >= RETIRE_ERR_SCORE
            || health.use_count >= RETIRE_USE_COUNT
            || self.created.elapsed() >= RETIRE_AGE
    }
}

/// Pool of reusable tabs with health-driven retirement and adaptive sizing.
pub struct AdaptivePool<F: PageFactory> {
    cfg: PoolConfig,
    factory: F,

    idle: Mutex<VecDeque<Arc<PageHandle<F::Page>>>>,
    idle_notify: Notify,
    all: Mutex<HashMap<u64, Arc<PageHandle<F::Page>>>>,
    /// Creations in flight, counted so concurrent `get`s cannot overshoot
    /// the hard max between the capacity check and the factory returning.
    creating: AtomicUsize,

    next_id: AtomicU64,
    active: AtomicUsize,
    stopped: AtomicBool,
    shutdown: broadcast::Sender<()>,
}

impl<F: PageFactory> AdaptivePool<F> {
    /// Create the pool, pre-fill `min_pages` tabs, and start the scaling
    /// loop. Pre-fill failures are logged and tolerated; the pool heals on
    /// demand.
    pub async fn new(cfg: PoolConfig, factory: F) -> Arc<Self> {
        let mut cfg = cfg;
        cfg.min_pages = cfg.min_pages.max(1);
        cfg.hard_max = cfg.hard_max.max(cfg.min_pages);
        if cfg.mem_threshold <= 0.0 || cfg.mem_threshold > 1.0 {
            cfg.mem_threshold = 0.9;
        }
        if cfg.scale_step <= 0.0 || cfg.scale_step > 1.0 {
            cfg.scale_step = 0.05;
        }

        let (shutdown, _) = broadcast::channel(1);
        let pool = Arc::new(Self {
            cfg,
            factory,
            idle: Mutex::new(VecDeque::new()),
            idle_notify: Notify::new(),
            all: Mutex::new(HashMap::new()),
            creating: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            shutdown,
        });

        for _ in 0..pool.cfg.min_pages {
            match pool.create_handle().await {
                Ok(Some(handle)) => pool.push_idle(handle),
                Ok(None) => break,
                Err(err) => warn!(error = %err, "failed to pre-create page"),
            }
        }

        let scaler = Arc::clone(&pool);
        let mut shutdown_rx = scaler.shutdown.subscribe();
        tokio::spawn(async move {
            let mut system = System::new();
            let mut ticker = tokio::time::interval(SCALE_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => scaler.scale_check(&mut system).await,
                }
            }
        });

        pool
    }

    /// Acquire a tab: idle queue first, then a fresh tab while under the
    /// hard max, else block until one is returned.
    pub async fn get(&self) -> Result<Arc<PageHandle<F::Page>>, ScrapeError> {
        loop {
            // Register interest before re-checking the queue, so a put that
            // lands between the check and the await still wakes us.
            let notified = self.idle_notify.notified();

            if self.stopped.load(Ordering::SeqCst) {
                return Err(ScrapeError::BrowserCrash("page pool is shut down".into()));
            }

            if let Some(handle) = self.idle.lock().pop_front() {
                self.active.fetch_add(1, Ordering::SeqCst);
                return Ok(handle);
            }

            match self.create_handle().await {
                Ok(Some(handle)) => {
                    self.active.fetch_add(1, Ordering::SeqCst);
                    return Ok(handle);
                }
                Ok(None) => {} // at hard max; wait for a return
                Err(err) => {
                    // Factory failure is fatal only when there is nothing
                    // left to wait for.
                    if self.live_count() == 0 && self.creating.load(Ordering::SeqCst) == 0 {
                        return Err(err);
                    }
                    warn!(error = %err, "page creation failed, waiting for an idle tab");
                }
            }

            notified.await;
        }
    }

    /// Return a tab with its health verdict. Retired tabs are destroyed
    /// and, if the pool dipped below minimum, replaced immediately.
    pub async fn put(&self, handle: Arc<PageHandle<F::Page>>, success: bool) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        handle.record(success);

        if self.stopped.load(Ordering::SeqCst) {
            self.destroy_handle(&handle).await;
            return;
        }

        if handle.should_retire() {
            debug!(
                id = handle.id(),
                err_score = handle.err_score(),
                use_count = handle.use_count(),
                "retiring page"
            );
            self.destroy_handle(&handle).await;

            if self.live_count() < self.cfg.min_pages {
                match self.create_handle().await {
                    Ok(Some(fresh)) => self.push_idle(fresh),
                    Ok(None) => {}
                    Err(err) => warn!(error = %err, "failed to replace retired page"),
                }
            }
            return;
        }

        self.push_idle(handle);
    }

    /// Live tab count, idle and checked out.
    pub fn live_count(&self) -> usize {
        self.all.lock().len()
    }

    /// Currently checked-out tab count.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max_pages: self.cfg.hard_max,
            active_pages: self.active_count(),
            live_pages: self.live_count(),
        }
    }

    /// Stop the scaling loop and destroy every tab. Idle tabs are drained
    /// first; checked-out tabs are destroyed as tracked.
    pub async fn close(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(());

        loop {
            let handle = self.idle.lock().pop_front();
            match handle {
                Some(handle) => self.destroy_handle(&handle).await,
                None => break,
            }
        }

        let remaining: Vec<_> = self.all.lock().drain().map(|(_, h)| h).collect();
        for handle in remaining {
            self.factory.destroy(handle.page()).await;
        }

        self.idle_notify.notify_waiters();
    }

    fn push_idle(&self, handle: Arc<PageHandle<F::Page>>) {
        self.idle.lock().push_back(handle);
        self.idle_notify.notify_one();
    }

    /// Create a tab if capacity allows. `Ok(None)` means the pool is at its
    /// hard max (counting creations in flight).
    async fn create_handle(&self) -> Result<Option<Arc<PageHandle<F::Page>>>, ScrapeError> {
        {
            let all = self.all.lock();
            if all.len() + self.creating.load(Ordering::SeqCst) >= self.cfg.hard_max {
                return Ok(None);
            }
            self.creating.fetch_add(1, Ordering::SeqCst);
        }

        let created = self.factory.create().await;
        match created {
            Ok(page) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let handle = Arc::new(PageHandle::new(id, page));
                self.all.lock().insert(id, Arc::clone(&handle));
                self.creating.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(handle))
            }
            Err(err) => {
                self.creating.fetch_sub(1, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    async fn destroy_handle(&self, handle: &Arc<PageHandle<F::Page>>) {
        self.all.lock().remove(&handle.id());
        self.factory.destroy(handle.page()).await;
        // A destroyed tab frees capacity a blocked `get` can use.
        self.idle_notify.notify_one();
    }

    async fn scale_check(&self, system: &mut System) {
        system.refresh_memory();
        let total = system.total_memory();
        let mem_pressure = if total > 0 {
            system.used_memory() as f64 / total as f64
        } else {
            0.0
        };

        let live = self.live_count();
        let active = self.active_count();
        let utilization = if live > 0 {
            active as f64 / live as f64
        } else {
            0.0
        };

        if mem_pressure > self.cfg.mem_threshold {
            let shed = ((live as f64) * self.cfg.scale_step).ceil() as usize;
            for _ in 0..shed {
                if self.live_count() <= self.cfg.min_pages {
                    break;
                }
                let handle = self.idle.lock().pop_front();
                match handle {
                    Some(handle) => {
                        debug!(id = handle.id(), mem_pressure, "shedding idle page");
                        self.destroy_handle(&handle).await;
                    }
                    None => break,
                }
            }
        } else if utilization > GROW_UTILIZATION {
            let grow = ((live as f64) * self.cfg.scale_step).ceil() as usize;
            for _ in 0..grow {
                match self.create_handle().await {
                    Ok(Some(handle)) => {
                        debug!(id = handle.id(), utilization, "grew pool");
                        self.push_idle(handle);
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "failed to grow pool");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubFactory {
        created: AtomicUsize,
        destroyed: AtomicUsize,
        fail: AtomicBool,
    }

    impl StubFactory {
        fn new() -> Self {
            Self {
                created: AtomicUsize::new(0),
                destroyed: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl PageFactory for StubFactory {
        type Page = u64;

        async fn create(&self) -> Result<u64, ScrapeError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ScrapeError::BrowserCrash("factory down".into()));
            }
            Ok(self.created.fetch_add(1, Ordering::SeqCst) as u64)
        }

        async fn destroy(&self, _page: &u64) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(min: usize, max: usize) -> PoolConfig {
        PoolConfig {
            min_pages: min,
            hard_max: max,
            mem_threshold: 0.9,
            scale_step: 0.05,
        }
    }

    #[tokio::test]
    async fn test_prefills_min_pages() {
        let pool = AdaptivePool::new(config(2, 5), StubFactory::new()).await;
        assert_eq!(pool.live_count(), 2);
        assert_eq!(pool.active_count(), 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_get_put_cycle_reuses_handles() {
        let pool = AdaptivePool::new(config(1, 1), StubFactory::new()).await;
        let first = pool.get().await.unwrap();
        let id = first.id();
        pool.put(first, true).await;

        let second = pool.get().await.unwrap();
        assert_eq!(second.id(), id, "healthy tab should be reused");
        assert_eq!(second.use_count(), 1);
        pool.put(second, true).await;
        pool.close().await;
    }

    #[tokio::test]
    async fn test_live_count_never_exceeds_hard_max() {
        let pool = AdaptivePool::new(config(2, 3), StubFactory::new()).await;

        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        let c = pool.get().await.unwrap();
        assert_eq!(pool.live_count(), 3);
        assert_eq!(pool.active_count(), 3);

        // A fourth caller must block until a tab is returned.
        let pool2 = Arc::clone(&pool);
        let fourth = tokio::spawn(async move { pool2.get().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fourth.is_finished(), "fourth get should block at hard max");
        assert!(pool.live_count() <= 3);

        pool.put(a, true).await;
        let d = tokio::time::timeout(Duration::from_secs(1), fourth)
            .await
            .expect("blocked get should wake")
            .unwrap()
            .unwrap();
        assert!(pool.live_count() <= 3);

        pool.put(b, true).await;
        pool.put(c, true).await;
        pool.put(d, true).await;
        pool.close().await;
    }

    #[tokio::test]
    async fn test_three_failures_retire_and_replace() {
        let factory = StubFactory::new();
        let pool = AdaptivePool::new(config(1, 2), factory).await;

        for _ in 0..2 {
            let handle = pool.get().await.unwrap();
            pool.put(handle, false).await;
        }
        let handle = pool.get().await.unwrap();
        let doomed_id = handle.id();
        assert_eq!(handle.err_score(), 2.0);

        // Third consecutive failure pushes err_score to 3.0: retirement,
        // then an immediate replacement to hold the minimum.
        pool.put(handle, false).await;
        assert_eq!(pool.live_count(), 1, "pool must not dip below min_pages");

        let fresh = pool.get().await.unwrap();
        assert_ne!(fresh.id(), doomed_id, "retired tab must not come back");
        pool.put(fresh, true).await;
        pool.close().await;
    }

    #[tokio::test]
    async fn test_err_score_floor_and_recovery() {
        let pool = AdaptivePool::new(config(1, 1), StubFactory::new()).await;

        let handle = pool.get().await.unwrap();
        pool.put(handle, true).await;
        let handle = pool.get().await.unwrap();
        assert_eq!(handle.err_score(), 0.0, "score must not go negative");

        // One failure then one success: 1.0 - 0.5 = 0.5.
        pool.put(handle, false).await;
        let handle = pool.get().await.unwrap();
        pool.put(handle, true).await;
        let handle = pool.get().await.unwrap();
        assert_eq!(handle.err_score(), 0.5);
        pool.put(handle, true).await;
        pool.close().await;
    }

    #[tokio::test]
    async fn test_use_count_retirement() {
        let pool = AdaptivePool::new(config(1, 1), StubFactory::new()).await;

        let mut last_id = 0;
        for _ in 0..RETIRE_USE_COUNT {
            let handle = pool.get().await.unwrap();
            last_id = handle.id();
            pool.put(handle, true).await;
        }

        // The 50th use retired the tab; its replacement is a fresh one.
        let fresh = pool.get().await.unwrap();
        assert_ne!(fresh.id(), last_id);
        assert_eq!(fresh.use_count(), 0);
        pool.put(fresh, true).await;
        pool.close().await;
    }

    #[tokio::test]
    async fn test_factory_failure_with_empty_pool_surfaces() {
        let factory = StubFactory::new();
        factory.fail.store(true, Ordering::SeqCst);
        let pool = AdaptivePool::new(config(1, 2), factory).await;

        assert_eq!(pool.live_count(), 0);
        let err = pool.get().await.unwrap_err();
        assert_eq!(err.code(), "BROWSER_CRASH");
        pool.close().await;
    }

    #[tokio::test]
    async fn test_close_destroys_everything() {
        let pool = AdaptivePool::new(config(2, 4), StubFactory::new()).await;
        let held = pool.get().await.unwrap();

        pool.close().await;
        assert_eq!(pool.live_count(), 0);

        // Returning a handle after close destroys rather than re-pools it.
        pool.put(held, true).await;
        assert!(pool.get().await.is_err());
    }
}
