// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dedup::DedupCache;
use crate::metrics::{MetricsSink, NoopSink};
use super::source::{AlwaysPrimary, FlagError, FlagSource, PrimaryLock};

/// Published dedup state. Readers branch on this, never on a null check.
#[derive(Debug, Clone, Default)]
pub enum CacheState {
    /// No cache: every record is treated as new
    #[default]
    Disabled,
    /// Dedup active against this cache
    Enabled(Arc<DedupCache>),
}

impl CacheState {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, CacheState::Enabled(_))
    }

    #[must_use]
    pub fn cache(&self) -> Option<&Arc<DedupCache>> {
        match self {
            CacheState::Enabled(cache) => Some(cache),
            CacheState::Disabled => None,
        }
    }
}

/// Owns the dedup cache and swaps it in and out as the flag changes.
///
/// Producers take the read lock for the length of an `Arc` clone; the poller
/// takes the write lock only on enable/disable transitions. Starts disabled
/// until the first successful poll says otherwise.
pub struct FlagManager {
    source: Arc<dyn FlagSource>,
    primary: Arc<dyn PrimaryLock>,
    poll_interval: Duration,
    state: RwLock<CacheState>,
    metrics: Arc<dyn MetricsSink>,
}

impl FlagManager {
    pub fn new(source: Arc<dyn FlagSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            primary: Arc::new(AlwaysPrimary),
            poll_interval,
            state: RwLock::new(CacheState::Disabled),
            metrics: Arc::new(NoopSink),
        }
    }

    #[must_use]
    pub fn with_primary_lock(mut self, primary: Arc<dyn PrimaryLock>) -> Self {
        self.primary = primary;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Current published state.
    #[must_use]
    pub fn state(&self) -> CacheState {
        self.state.read().clone()
    }

    /// The active cache, if dedup is enabled.
    #[must_use]
    pub fn cache(&self) -> Option<Arc<DedupCache>> {
        self.state.read().cache().cloned()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state.read().is_enabled()
    }

    /// Publish a fresh cache sized for `size_hint`. No-op if already enabled.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn enable(&self, size_hint: usize) -> bool {
        let mut state = self.state.write();
        if state.is_enabled() {
            return false;
        }
        *state = CacheState::Enabled(Arc::new(DedupCache::new(size_hint)));
        drop(state);

        self.metrics.set_cache_enabled(true);
        info!(size_hint, "Changelog dedup cache enabled");
        true
    }

    /// Drop the published cache. No-op if already disabled.
    ///
    /// The cache is freed once the last in-flight reader releases its `Arc`.
    pub fn disable(&self) -> bool {
        let previous = std::mem::take(&mut *self.state.write());
        let CacheState::Enabled(cache) = previous else {
            return false;
        };

        self.metrics.set_cache_enabled(false);
        info!(entries = cache.len(), "Changelog dedup cache disabled");
        true
    }

    /// Empty the active cache in place, keeping its capacity.
    ///
    /// Safe when disabled. Skipped on non-primary instances.
    pub async fn clear_cache(&self) {
        match self.primary.is_primary().await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Not primary, skipping dedup cache clear");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Primary check failed, skipping dedup cache clear");
                return;
            }
        }

        if let Some(cache) = self.cache() {
            cache.clear();
            info!(capacity = cache.capacity(), "Changelog dedup cache cleared");
        }
    }

    /// Poll the flag once and apply any transition.
    ///
    /// On error nothing changes: the last known state stays in force.
    pub async fn poll_once(&self) -> Result<(), FlagError> {
        let flag = self.source.poll().await?;
        let enabled = self.is_enabled();

        match (enabled, flag.enabled) {
            (false, true) => {
                if self.primary.is_primary().await? {
                    self.enable(flag.size_hint);
                } else {
                    debug!("Not primary, leaving dedup cache disabled");
                }
            }
            (true, false) => {
                self.disable();
            }
            _ => {}
        }
        Ok(())
    }

    /// Poll until `shutdown` is cancelled. The first poll runs immediately.
    pub async fn run_poller(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(interval = ?self.poll_interval, "Flag poller started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        self.metrics.record_flag_poll_error();
                        warn!(error = %e, enabled = self.is_enabled(), "Changelog flag poll failed, keeping current state");
                    }
                }
            }
        }

        debug!("Flag poller stopped");
    }

    /// Spawn [`run_poller`](Self::run_poller) on the runtime.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run_poller(shutdown).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::source::{FlagState, FnFlagSource, ManualFlag};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FixedLock(bool);

    #[async_trait]
    impl PrimaryLock for FixedLock {
        async fn is_primary(&self) -> Result<bool, FlagError> {
            Ok(self.0)
        }
    }

    fn manager(flag: Arc<ManualFlag>, interval_ms: u64) -> Arc<FlagManager> {
        Arc::new(FlagManager::new(flag, Duration::from_millis(interval_ms)))
    }

    async fn eventually<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check()
    }

    #[test]
    fn test_starts_disabled() {
        let m = FlagManager::new(Arc::new(ManualFlag::new(true, 10)), Duration::from_secs(1));
        assert!(m.cache().is_none());
        assert!(!m.state().is_enabled());
    }

    #[test]
    fn test_enable_creates_empty_sized_cache() {
        let m = FlagManager::new(Arc::new(ManualFlag::default()), Duration::from_secs(1));
        assert!(m.enable(1000));

        let cache = m.cache().unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 1000);

        // Second enable keeps the published cache
        assert!(!m.enable(5));
        assert!(Arc::ptr_eq(&cache, &m.cache().unwrap()));
    }

    #[test]
    fn test_disable_clears_cache() {
        let m = FlagManager::new(Arc::new(ManualFlag::default()), Duration::from_secs(1));
        m.enable(1000);
        assert!(m.disable());
        assert!(m.cache().is_none());
        assert!(!m.disable());
    }

    #[test]
    fn test_reenable_starts_from_empty() {
        let m = FlagManager::new(Arc::new(ManualFlag::default()), Duration::from_secs(1));
        m.enable(10);
        let cache = m.cache().unwrap();
        assert!(cache.check(1, 1));
        assert!(!cache.check(1, 1));

        m.disable();
        m.enable(10);
        assert!(m.cache().unwrap().check(1, 1));
    }

    #[test]
    fn test_concurrent_enable_disable_and_reads() {
        let m = Arc::new(FlagManager::new(Arc::new(ManualFlag::default()), Duration::from_secs(1)));
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let m = m.clone();
                std::thread::spawn(move || match i % 3 {
                    0 => {
                        m.enable(100);
                    }
                    1 => {
                        m.disable();
                    }
                    _ => {
                        if let Some(cache) = m.cache() {
                            cache.check(i as u64, 0);
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }

    #[tokio::test]
    async fn test_poller_enables_when_flag_turns_on() {
        let flag = Arc::new(ManualFlag::new(false, 10));
        let m = manager(flag.clone(), 10);
        let token = CancellationToken::new();
        let handle = m.start(token.clone());

        assert!(m.cache().is_none());
        flag.set_enabled(true);

        assert!(eventually(|| m.cache().is_some()).await);
        assert!(m.cache().unwrap().is_empty());

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_poller_disables_when_flag_turns_off() {
        let flag = Arc::new(ManualFlag::new(true, 1500));
        let m = manager(flag.clone(), 10);
        let token = CancellationToken::new();
        let handle = m.start(token.clone());

        assert!(eventually(|| m.cache().is_some()).await);
        assert_eq!(m.cache().unwrap().capacity(), 1500);

        flag.set_enabled(false);
        assert!(eventually(|| m.cache().is_none()).await);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_poll_errors_keep_last_state() {
        let flag = Arc::new(ManualFlag::new(true, 10));
        let m = manager(flag.clone(), 10);
        m.poll_once().await.unwrap();
        assert!(m.is_enabled());

        flag.set_failing(true);
        flag.set_enabled(false);
        assert!(m.poll_once().await.is_err());
        // Fail-open: still enabled
        assert!(m.is_enabled());

        flag.set_failing(false);
        m.poll_once().await.unwrap();
        assert!(!m.is_enabled());
    }

    #[tokio::test]
    async fn test_poller_recovers_after_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let source = FnFlagSource(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= 2 {
                    Err(FlagError::Unavailable("flag service unavailable".into()))
                } else {
                    Ok(FlagState::enabled(3000))
                }
            }
        });
        let m = Arc::new(FlagManager::new(Arc::new(source), Duration::from_millis(10)));
        let token = CancellationToken::new();
        let handle = m.start(token.clone());

        assert!(eventually(|| m.cache().is_some()).await);
        assert!(calls.load(Ordering::SeqCst) >= 3);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_non_primary_does_not_enable() {
        let flag = Arc::new(ManualFlag::new(true, 1000));
        let m = FlagManager::new(flag, Duration::from_millis(10))
            .with_primary_lock(Arc::new(FixedLock(false)));

        m.poll_once().await.unwrap();
        assert!(m.cache().is_none());
    }

    #[tokio::test]
    async fn test_primary_enables_with_hint() {
        let flag = Arc::new(ManualFlag::new(true, 1000));
        let m = FlagManager::new(flag, Duration::from_millis(10))
            .with_primary_lock(Arc::new(FixedLock(true)));

        m.poll_once().await.unwrap();
        assert_eq!(m.cache().unwrap().capacity(), 1000);
    }

    #[tokio::test]
    async fn test_clear_cache_on_primary() {
        let m = FlagManager::new(Arc::new(ManualFlag::default()), Duration::from_secs(3600));
        m.enable(1000);
        m.cache().unwrap().check(23, 45);

        m.clear_cache().await;

        let cache = m.cache().unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 1000);
    }

    #[tokio::test]
    async fn test_clear_cache_skipped_on_non_primary() {
        let m = FlagManager::new(Arc::new(ManualFlag::default()), Duration::from_secs(3600))
            .with_primary_lock(Arc::new(FixedLock(false)));
        m.enable(1000);
        m.cache().unwrap().check(23, 45);

        m.clear_cache().await;
        assert_eq!(m.cache().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_cache_when_disabled_is_noop() {
        let m = FlagManager::new(Arc::new(ManualFlag::default()), Duration::from_secs(3600));
        m.clear_cache().await;
        assert!(m.cache().is_none());
    }

    #[tokio::test]
    async fn test_lock_error_leaves_state() {
        struct BrokenLock(AtomicBool);

        #[async_trait]
        impl PrimaryLock for BrokenLock {
            async fn is_primary(&self) -> Result<bool, FlagError> {
                self.0.store(true, Ordering::SeqCst);
                Err(FlagError::Lock("lock table missing".into()))
            }
        }

        let lock = Arc::new(BrokenLock(AtomicBool::new(false)));
        let m = FlagManager::new(Arc::new(ManualFlag::new(true, 10)), Duration::from_millis(10))
            .with_primary_lock(lock.clone());

        assert!(matches!(m.poll_once().await, Err(FlagError::Lock(_))));
        assert!(lock.0.load(Ordering::SeqCst));
        assert!(!m.is_enabled());
    }
}
