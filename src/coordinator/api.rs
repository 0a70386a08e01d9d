//! Producer-facing API: dedup resolution, submit, stats.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::change::ChangeRecord;
use crate::dedup::CacheStats;
use crate::flag::CacheState;

use super::{Changelog, ChangelogError, ChangelogState, Disposition};

impl<R: ChangeRecord> Changelog<R> {
    /// Decide whether `record` carries new or changed state.
    ///
    /// With dedup disabled every record is new. Hash failures are returned
    /// to the caller and leave the cache untouched.
    pub fn resolve_change(&self, record: &R) -> Result<bool, ChangelogError> {
        match self.flags.state() {
            CacheState::Disabled => Ok(true),
            CacheState::Enabled(cache) => {
                let submit = cache.should_submit(record)?;
                self.metrics.record_cache_lookup(!submit);
                Ok(submit)
            }
        }
    }

    /// Queue `record` for flushing, waiting up to `wait` for channel space.
    ///
    /// Returns `false` if the record was not accepted in time or the
    /// changelog has been stopped.
    pub async fn submit(&self, record: R, wait: Duration) -> bool {
        self.ingest.submit(record, wait).await
    }

    /// Like [`submit`](Self::submit), but gives up early when `cancel` fires.
    pub async fn submit_until(&self, record: R, cancel: &CancellationToken, wait: Duration) -> bool {
        self.ingest.submit_until(record, cancel, wait).await
    }

    /// Resolve then submit in one call.
    pub async fn record(&self, record: R, wait: Duration) -> Result<Disposition, ChangelogError> {
        match self.state() {
            ChangelogState::Created | ChangelogState::Running => {}
            state => return Err(ChangelogError::NotRunning(state)),
        }

        if !self.resolve_change(&record)? {
            return Ok(Disposition::Unchanged);
        }
        if self.submit(record, wait).await {
            Ok(Disposition::Queued)
        } else {
            Err(ChangelogError::Rejected(wait))
        }
    }

    /// Hit/miss counters of the active cache (zero when disabled).
    #[must_use]
    pub fn get_stats(&self) -> CacheStats {
        self.flags.cache().map(|cache| cache.stats()).unwrap_or_default()
    }

    /// Snapshot the counters, log them and reset to zero.
    pub fn flush_stats(&self) -> CacheStats {
        let Some(cache) = self.flags.cache() else {
            return CacheStats::default();
        };

        let stats = cache.reset_stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = stats.hit_rate(),
            entries = cache.len(),
            "Changelog dedup stats"
        );
        stats
    }

    /// Whether dedup is currently active.
    #[must_use]
    pub fn is_dedup_enabled(&self) -> bool {
        self.flags.is_enabled()
    }

    /// Empty the dedup cache in place (primary instance only).
    pub async fn clear_cache(&self) {
        self.flags.clear_cache().await;
    }

    /// Poll the flag immediately instead of waiting for the next tick.
    pub async fn refresh_flag(&self) -> Result<(), ChangelogError> {
        self.flags.poll_once().await?;
        Ok(())
    }

    /// Records accepted but not yet picked up by a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.ingest.queued()
    }
}
