// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the changelog pipeline.
//!
//! Components never call a global registry directly: they hold an
//! `Arc<dyn MetricsSink>` handed in at construction. [`RecorderSink`] forwards
//! to the `metrics` crate so the host process picks the exporter
//! (Prometheus, OTEL, ...). [`NoopSink`] drops everything.
//!
//! # Metric Naming Convention
//! - `changelog_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `result`: hit, miss
//! - `trigger`: size, idle, shutdown
//! - `status`: success, error, accepted, rejected

use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::Duration;

use crate::batching::FlushTrigger;

/// Destination for pipeline measurements.
pub trait MetricsSink: Send + Sync {
    /// A dedup lookup finished. `hit` means the record was skipped.
    fn record_cache_lookup(&self, hit: bool);

    /// Whether a dedup cache is currently published.
    fn set_cache_enabled(&self, enabled: bool);

    /// A flag poll failed.
    fn record_flag_poll_error(&self);

    /// A submit attempt finished.
    fn record_submit(&self, accepted: bool);

    /// A batch reached the flusher.
    fn record_flush(&self, trigger: FlushTrigger, count: usize, success: bool, elapsed: Duration);
}

/// Forwards to the process-wide `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderSink;

impl MetricsSink for RecorderSink {
    fn record_cache_lookup(&self, hit: bool) {
        counter!(
            "changelog_cache_lookups_total",
            "result" => if hit { "hit" } else { "miss" }
        )
        .increment(1);
    }

    fn set_cache_enabled(&self, enabled: bool) {
        gauge!("changelog_cache_enabled").set(if enabled { 1.0 } else { 0.0 });
    }

    fn record_flag_poll_error(&self) {
        counter!("changelog_flag_poll_errors_total").increment(1);
    }

    fn record_submit(&self, accepted: bool) {
        counter!(
            "changelog_submits_total",
            "status" => if accepted { "accepted" } else { "rejected" }
        )
        .increment(1);
    }

    fn record_flush(&self, trigger: FlushTrigger, count: usize, success: bool, elapsed: Duration) {
        let status = if success { "success" } else { "error" };
        counter!(
            "changelog_flushes_total",
            "trigger" => trigger.as_str(),
            "status" => status
        )
        .increment(1);
        counter!("changelog_flushed_records_total", "status" => status).increment(count as u64);
        histogram!("changelog_flush_batch_size", "trigger" => trigger.as_str()).record(count as f64);
        histogram!("changelog_flush_seconds").record(elapsed.as_secs_f64());
    }
}

/// Discards every measurement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record_cache_lookup(&self, _hit: bool) {}
    fn set_cache_enabled(&self, _enabled: bool) {}
    fn record_flag_poll_error(&self) {}
    fn record_submit(&self, _accepted: bool) {}
    fn record_flush(&self, _trigger: FlushTrigger, _count: usize, _success: bool, _elapsed: Duration) {}
}

/// Sink used when the caller does not supply one.
#[must_use]
pub fn default_sink() -> Arc<dyn MetricsSink> {
    Arc::new(RecorderSink)
}
