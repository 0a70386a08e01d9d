// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Content-addressed dedup cache.
//!
//! Maps identity key → last content hash seen for that identity. A record
//! whose hash matches the stored one is a repeat and is skipped; anything
//! else (unknown identity or a different hash) is accepted and becomes the
//! new stored hash.
//!
//! There is no eviction. The cache grows for the lifetime of one enable
//! cycle and is dropped wholesale when the feature flag turns off.
//!
//! # Example
//!
//! ```
//! use changelog_engine::DedupCache;
//!
//! let cache = DedupCache::new(16);
//! assert!(cache.check(1, 0xAA));   // new identity
//! assert!(!cache.check(1, 0xAA));  // exact repeat
//! assert!(cache.check(1, 0xBB));   // content changed
//!
//! let stats = cache.stats();
//! assert_eq!((stats.hits, stats.misses), (1, 2));
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use crate::change::{ChangeRecord, HashError};

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an identical stored hash (record skipped)
    pub hits: u64,
    /// Lookups that found nothing or a different hash (record submitted)
    pub misses: u64,
}

impl CacheStats {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of lookups that were repeats (0.0 when nothing was looked up).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

#[derive(Debug)]
struct CacheInner {
    data: HashMap<u64, u64>,
    stats: CacheStats,
}

/// Identity → content hash map guarded by a single mutex.
///
/// The lookup, compare and upsert happen under one lock acquisition so two
/// concurrent callers with the same identity can never both see "new".
#[derive(Debug)]
pub struct DedupCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl DedupCache {
    /// Create an empty cache pre-sized for `capacity_hint` identities.
    #[must_use]
    pub fn new(capacity_hint: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                data: HashMap::with_capacity(capacity_hint),
                stats: CacheStats::default(),
            }),
            capacity: capacity_hint,
        }
    }

    /// Decide whether `record` carries persistable state.
    ///
    /// Hash failures are returned before the cache is touched, so a broken
    /// record is neither stored nor counted.
    pub fn should_submit<R>(&self, record: &R) -> Result<bool, HashError>
    where
        R: ChangeRecord + ?Sized,
    {
        let identity = record.identity_key()?;
        let content = record.content_hash()?;
        Ok(self.check(identity, content))
    }

    /// Core lookup-compare-upsert on precomputed hashes.
    pub fn check(&self, identity: u64, content: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.data.insert(identity, content) {
            Some(previous) if previous == content => {
                inner.stats.hits += 1;
                false
            }
            _ => {
                inner.stats.misses += 1;
                true
            }
        }
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    /// Snapshot the counters and zero them in the same critical section.
    pub fn reset_stats(&self) -> CacheStats {
        std::mem::take(&mut self.inner.lock().stats)
    }

    /// Drop every entry but keep the allocation and the capacity hint.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.data.len();
        inner.data.clear();
        debug!(dropped, capacity = self.capacity, "Dedup cache cleared");
    }

    /// Size hint this cache was created with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }
}
