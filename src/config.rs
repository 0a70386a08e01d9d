// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the changelog pipeline.
//!
//! # Example
//!
//! ```
//! use changelog_engine::{ChangelogConfig, FlushMode};
//! use std::time::Duration;
//!
//! // Minimal config (uses defaults)
//! let config = ChangelogConfig::default();
//! assert_eq!(config.batch_size, 1000);
//! assert_eq!(config.flush_interval(), Duration::from_secs(5));
//!
//! // Throughput setup with a worker pool
//! let config = ChangelogConfig {
//!     batch_size: 500,
//!     flush_mode: FlushMode::Pool { workers: 4 },
//!     ..Default::default()
//! };
//! assert_eq!(config.channel_capacity(), 1000);
//! ```

use serde::Deserialize;
use std::time::Duration;

/// How accepted records are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FlushMode {
    /// One consumer; flush order matches arrival order
    #[default]
    Single,
    /// N competing consumers, each with its own buffer; no cross-worker ordering
    Pool { workers: usize },
}

impl FlushMode {
    /// Number of consumer tasks this mode spawns (at least 1).
    #[must_use]
    pub fn workers(&self) -> usize {
        match self {
            Self::Single => 1,
            Self::Pool { workers } => (*workers).max(1),
        }
    }
}

/// Configuration for the changelog pipeline.
///
/// All fields have defaults, so an empty document deserializes to
/// [`ChangelogConfig::default()`].
#[derive(Debug, Clone, Deserialize)]
pub struct ChangelogConfig {
    /// Size-trigger threshold
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Idle-trigger threshold: quiet period after the last arrival
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Feature flag poll cadence
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub flush_mode: FlushMode,

    /// Input channel bound (default: 2 × batch_size)
    #[serde(default)]
    pub channel_capacity: Option<usize>,

    /// Upper bound on the final flush run during shutdown
    #[serde(default = "default_shutdown_flush_timeout_ms")]
    pub shutdown_flush_timeout_ms: u64,

    /// Extra attempts for a failed flush before the batch is dropped
    #[serde(default)]
    pub flush_retries: usize,
}

fn default_batch_size() -> usize { 1000 }
fn default_flush_interval_ms() -> u64 { 5_000 }
fn default_poll_interval_ms() -> u64 { 10_000 }
fn default_shutdown_flush_timeout_ms() -> u64 { 30_000 }

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            flush_mode: FlushMode::default(),
            channel_capacity: None,
            shutdown_flush_timeout_ms: default_shutdown_flush_timeout_ms(),
            flush_retries: 0,
        }
    }
}

impl ChangelogConfig {
    /// Batch size clamped to at least 1.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[must_use]
    pub fn shutdown_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_flush_timeout_ms)
    }

    /// Configured channel bound, or twice the batch size.
    #[must_use]
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
            .unwrap_or_else(|| self.batch_size().saturating_mul(2))
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChangelogConfig::default();
        assert_eq!(config.batch_size(), 1000);
        assert_eq!(config.flush_interval(), Duration::from_secs(5));
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.shutdown_flush_timeout(), Duration::from_secs(30));
        assert_eq!(config.channel_capacity(), 2000);
        assert_eq!(config.flush_mode, FlushMode::Single);
        assert_eq!(config.flush_retries, 0);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ChangelogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.flush_interval_ms, 5_000);
        assert_eq!(config.channel_capacity, None);
    }

    #[test]
    fn test_deserialize_pool_mode() {
        let config: ChangelogConfig = serde_json::from_str(
            r#"{
                "batch_size": 3,
                "flush_interval_ms": 100,
                "poll_interval_ms": 50,
                "flush_mode": { "kind": "pool", "workers": 4 },
                "channel_capacity": 64
            }"#,
        )
        .unwrap();

        assert_eq!(config.batch_size(), 3);
        assert_eq!(config.flush_interval(), Duration::from_millis(100));
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.flush_mode, FlushMode::Pool { workers: 4 });
        assert_eq!(config.flush_mode.workers(), 4);
        assert_eq!(config.channel_capacity(), 64);
    }

    #[test]
    fn test_deserialize_single_mode() {
        let config: ChangelogConfig =
            serde_json::from_str(r#"{ "flush_mode": { "kind": "single" } }"#).unwrap();
        assert_eq!(config.flush_mode, FlushMode::Single);
    }

    #[test]
    fn test_clamps_degenerate_values() {
        let config = ChangelogConfig {
            batch_size: 0,
            flush_interval_ms: 0,
            channel_capacity: Some(0),
            flush_mode: FlushMode::Pool { workers: 0 },
            ..Default::default()
        };

        assert_eq!(config.batch_size(), 1);
        assert_eq!(config.flush_interval(), Duration::from_millis(1));
        assert_eq!(config.channel_capacity(), 1);
        assert_eq!(config.flush_mode.workers(), 1);
    }
}
