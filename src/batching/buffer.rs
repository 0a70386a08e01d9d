// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-worker pending buffer.
//!
//! A [`PendingBuffer`] collects accepted records in arrival order and hands
//! them out as a [`FlushBatch`] once a [`FlushTrigger`] fires. It is owned by
//! exactly one ingest worker and never shared.
//!
//! # Example
//!
//! ```
//! use changelog_engine::{FlushTrigger, PendingBuffer};
//!
//! let mut buffer: PendingBuffer<u32> = PendingBuffer::new(2);
//! assert_eq!(buffer.push(1), None);
//! assert_eq!(buffer.push(2), Some(FlushTrigger::Size));
//!
//! let batch = buffer.flush(FlushTrigger::Size).unwrap();
//! assert_eq!(batch.records, vec![1, 2]);
//! assert!(buffer.is_empty());
//! ```

use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Why a batch left the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushTrigger {
    /// Buffer reached the configured batch size
    Size,
    /// No arrivals for a full flush interval
    Idle,
    /// Final flush on cancellation or channel close
    Shutdown,
}

impl FlushTrigger {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Idle => "idle",
            Self::Shutdown => "shutdown",
        }
    }

    /// Idle and shutdown flushes go out whatever the buffer length.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        !matches!(self, Self::Size)
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records handed to the flusher together with the trigger that released them.
#[derive(Debug)]
pub struct FlushBatch<R> {
    pub records: Vec<R>,
    pub trigger: FlushTrigger,
}

impl<R> FlushBatch<R> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Ordered records awaiting flush.
#[derive(Debug)]
pub struct PendingBuffer<R> {
    records: Vec<R>,
    batch_size: usize,
    oldest: Option<Instant>,
}

impl<R> PendingBuffer<R> {
    /// `batch_size` is clamped to at least one.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            records: Vec::with_capacity(batch_size),
            batch_size,
            oldest: None,
        }
    }

    /// Append a record. Returns [`FlushTrigger::Size`] once the buffer is full.
    pub fn push(&mut self, record: R) -> Option<FlushTrigger> {
        if self.records.is_empty() {
            self.oldest = Some(Instant::now());
        }
        self.records.push(record);
        self.is_full().then_some(FlushTrigger::Size)
    }

    /// Take the buffered records if `trigger` allows it.
    ///
    /// Empty buffers never produce a batch. A size trigger only releases a
    /// full buffer; idle and shutdown triggers release whatever is there.
    pub fn flush(&mut self, trigger: FlushTrigger) -> Option<FlushBatch<R>> {
        if self.records.is_empty() {
            return None;
        }
        if !trigger.is_forced() && !self.is_full() {
            return None;
        }

        let age = self.age();
        let records = std::mem::replace(&mut self.records, Vec::with_capacity(self.batch_size));
        self.oldest = None;
        debug!(count = records.len(), reason = %trigger, ?age, "Batch taken for flush");
        Some(FlushBatch { records, trigger })
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.batch_size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Time since the oldest buffered record arrived.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.oldest.map(|t| t.elapsed()).unwrap_or_default()
    }
}
