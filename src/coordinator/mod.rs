// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Changelog coordinator.
//!
//! The [`Changelog`] ties the pieces together:
//! - [`FlagManager`] owning the dedup cache and polling the feature flag
//! - [`IngestLoop`] buffering accepted records and flushing them in batches
//! - an injected [`MetricsSink`]
//!
//! # Lifecycle
//!
//! ```text
//! Created → Running → ShuttingDown → Stopped
//! ```
//!
//! # Example
//!
//! ```rust
//! use changelog_engine::{
//!     Change, Changelog, ChangelogConfig, ChangelogState, InMemoryGraphStore,
//!     ManualFlag, NodeChange, Properties,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(InMemoryGraphStore::new());
//! let flag = Arc::new(ManualFlag::new(false, 0));
//! let changelog: Changelog<Change> =
//!     Changelog::for_store(ChangelogConfig::default(), flag, store.clone());
//!
//! changelog.start().unwrap();
//! assert_eq!(changelog.state(), ChangelogState::Running);
//!
//! let record: Change = NodeChange::new("u1", ["User"], Properties::new()).into();
//! if changelog.resolve_change(&record).unwrap() {
//!     changelog.submit(record, Duration::from_secs(1)).await;
//! }
//!
//! changelog.stop(Duration::from_secs(5)).await.unwrap();
//! assert_eq!(store.len(), 1);
//! # }
//! ```

mod api;
mod lifecycle;
mod types;

pub use types::{ChangelogError, ChangelogState, Disposition};

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::batching::{Flusher, IngestLoop, IngestSettings, StoreFlusher};
use crate::change::ChangeRecord;
use crate::config::ChangelogConfig;
use crate::flag::{AlwaysPrimary, FlagManager, FlagSource, PrimaryLock};
use crate::metrics::{default_sink, MetricsSink};
use crate::storage::GraphStore;

/// Optional collaborators for [`Changelog::with_options`].
#[derive(Clone)]
pub struct ChangelogOptions {
    /// High-availability gate for cache enable/clear
    pub primary: Arc<dyn PrimaryLock>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl Default for ChangelogOptions {
    fn default() -> Self {
        Self {
            primary: Arc::new(AlwaysPrimary),
            metrics: default_sink(),
        }
    }
}

/// Dedup-then-batch pipeline in front of a backing store.
///
/// # Thread Safety
///
/// `Changelog` is `Send + Sync`; `resolve_change` and `submit` may be called
/// from any number of tasks at once. Wrap it in an `Arc` to share.
pub struct Changelog<R: ChangeRecord> {
    pub(super) config: ChangelogConfig,
    /// Sole owner of the dedup cache
    pub(super) flags: Arc<FlagManager>,
    pub(super) ingest: IngestLoop<R>,
    pub(super) metrics: Arc<dyn MetricsSink>,
    /// Stops the poller and every ingest worker
    pub(super) shutdown: CancellationToken,
    pub(super) state: watch::Sender<ChangelogState>,
    pub(super) state_rx: watch::Receiver<ChangelogState>,
    pub(super) poller: Mutex<Option<JoinHandle<()>>>,
}

impl<R: ChangeRecord> Changelog<R> {
    /// Build with the default metrics sink and no HA lock.
    pub fn new(
        config: ChangelogConfig,
        source: Arc<dyn FlagSource>,
        flusher: Arc<dyn Flusher<R>>,
    ) -> Self {
        Self::with_options(config, source, flusher, ChangelogOptions::default())
    }

    /// Build with a [`StoreFlusher`] over `store`.
    pub fn for_store<S>(config: ChangelogConfig, source: Arc<dyn FlagSource>, store: Arc<S>) -> Self
    where
        S: GraphStore + 'static,
    {
        Self::new(config, source, Arc::new(StoreFlusher::new(store)))
    }

    pub fn with_options(
        config: ChangelogConfig,
        source: Arc<dyn FlagSource>,
        flusher: Arc<dyn Flusher<R>>,
        options: ChangelogOptions,
    ) -> Self {
        let flags = FlagManager::new(source, config.poll_interval())
            .with_primary_lock(options.primary)
            .with_metrics(Arc::clone(&options.metrics));
        let ingest = IngestLoop::new(
            IngestSettings::from(&config),
            flusher,
            Arc::clone(&options.metrics),
        );
        let (state, state_rx) = watch::channel(ChangelogState::Created);

        Self {
            config,
            flags: Arc::new(flags),
            ingest,
            metrics: options.metrics,
            shutdown: CancellationToken::new(),
            state,
            state_rx,
            poller: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ChangelogConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> ChangelogState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ChangelogState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ChangelogState::Running
    }

    /// The flag manager that owns the dedup cache.
    #[must_use]
    pub fn flags(&self) -> &Arc<FlagManager> {
        &self.flags
    }
}

impl<R: ChangeRecord> Drop for Changelog<R> {
    fn drop(&mut self) {
        // Workers still get their final flush
        self.shutdown.cancel();
    }
}
