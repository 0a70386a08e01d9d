//! # Changelog Engine
//!
//! Change deduplication and batched persistence for high-volume graph ingest.
//!
//! ## Architecture
//!
//! Every observed record is checked against a content-addressed cache before
//! it is written. Exact repeats are dropped; new or modified records are
//! buffered and flushed to the store in batches.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Producers (any number)                  │
//! │  • resolve_change(): identity key + content hash lookup    │
//! │  • submit(): bounded enqueue with a deadline               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  FlagManager + DedupCache                   │
//! │  • Feature flag polled on an interval                      │
//! │  • Enabled: identity → last content hash                   │
//! │  • Disabled: every record passes through                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (bounded mpsc channel)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        IngestLoop                           │
//! │  • Single consumer or pool of competing workers            │
//! │  • Flush on size, idle timeout, or shutdown                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    (Flusher → WriteBatch)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         GraphStore                          │
//! │  • One atomic commit per batch                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use changelog_engine::{
//!     Change, Changelog, ChangelogConfig, InMemoryGraphStore, ManualFlag,
//!     NodeChange, Properties,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryGraphStore::new());
//!     let flag = Arc::new(ManualFlag::new(true, 10_000));
//!     let changelog: Changelog<Change> =
//!         Changelog::for_store(ChangelogConfig::default(), flag, store);
//!
//!     changelog.start().expect("Failed to start");
//!
//!     let record: Change = NodeChange::new(
//!         "S-1-5-21-1000",
//!         ["User"],
//!         Properties::new().with("name", "alice"),
//!     )
//!     .into();
//!     changelog.record(record, Duration::from_secs(1)).await.expect("Failed to record");
//!
//!     changelog.stop(Duration::from_secs(30)).await.expect("Failed to stop");
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`ChangelogConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`Changelog`] facade
//! - [`change`]: Change records and hashing
//! - [`dedup`]: Identity → content hash cache
//! - [`flag`]: Feature-flag driven cache lifecycle
//! - [`batching`]: Pending buffers, flushers and the ingest loop
//! - [`storage`]: Backing store abstraction and in-memory store
//! - [`resilience`]: Retry with exponential backoff
//! - [`metrics`]: Injected metrics sink

pub mod config;
pub mod change;
pub mod storage;
pub mod dedup;
pub mod flag;
pub mod batching;
pub mod resilience;
pub mod coordinator;
pub mod metrics;

pub use config::{ChangelogConfig, FlushMode};
pub use coordinator::{Changelog, ChangelogError, ChangelogOptions, ChangelogState, Disposition};
pub use change::{
    Change, ChangeRecord, EdgeChange, HashError, IgnoreSet, NodeChange, Properties,
    DEFAULT_IGNORED_KEYS,
};
pub use dedup::{CacheStats, DedupCache};
pub use flag::{
    AlwaysPrimary, CacheState, FlagError, FlagManager, FlagSource, FlagState, FnFlagSource,
    ManualFlag, PrimaryLock,
};
pub use batching::{
    FlushBatch, FlushError, FlushTrigger, Flusher, IngestLoop, IngestSettings, PendingBuffer,
    StoreFlusher,
};
pub use storage::{GraphStore, InMemoryGraphStore, StorageError, WriteBatch, WriteOp};
pub use resilience::RetryConfig;
pub use metrics::{MetricsSink, NoopSink, RecorderSink};
