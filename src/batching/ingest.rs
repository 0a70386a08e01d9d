// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Channel-fed ingest loop.
//!
//! Producers push accepted records into a bounded channel. One or more
//! workers pull from it, each buffering into its own [`PendingBuffer`] and
//! flushing when:
//!
//! - the buffer reaches `batch_size` (size trigger)
//! - no record arrived for `flush_interval` (idle trigger, re-armed on every arrival)
//! - shutdown was requested or the channel closed (shutdown trigger)
//!
//! ```text
//!  submit() ──► mpsc (bounded) ──┬──► worker 0 ──► PendingBuffer ──► Flusher
//!                                ├──► worker 1 ──► PendingBuffer ──► Flusher
//!                                └──► ...        (FlushMode::Pool only)
//! ```
//!
//! Pool workers compete for records, so ordering only holds inside one
//! worker's batches.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::change::ChangeRecord;
use crate::config::{ChangelogConfig, FlushMode};
use crate::metrics::MetricsSink;
use crate::resilience::{retry, RetryConfig};
use super::buffer::{FlushBatch, FlushTrigger, PendingBuffer};
use super::flusher::{FlushError, Flusher};

type SharedReceiver<R> = Arc<AsyncMutex<mpsc::Receiver<R>>>;

/// Resolved runtime settings for the ingest workers.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub channel_capacity: usize,
    pub shutdown_flush_timeout: Duration,
    pub mode: FlushMode,
    pub retry: RetryConfig,
}

impl From<&ChangelogConfig> for IngestSettings {
    fn from(config: &ChangelogConfig) -> Self {
        Self {
            batch_size: config.batch_size(),
            flush_interval: config.flush_interval(),
            channel_capacity: config.channel_capacity(),
            shutdown_flush_timeout: config.shutdown_flush_timeout(),
            mode: config.flush_mode,
            retry: RetryConfig::flush(config.flush_retries),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from(&ChangelogConfig::default())
    }
}

struct WorkerShared<R: ChangeRecord> {
    settings: IngestSettings,
    flusher: Arc<dyn Flusher<R>>,
    metrics: Arc<dyn MetricsSink>,
    /// Records sent into the channel and not yet taken out by a worker.
    queued: AtomicUsize,
    /// Workers spawned and not yet finished.
    live: watch::Sender<usize>,
}

/// Counts a worker out when its task ends, however it ends.
struct LiveGuard<R: ChangeRecord> {
    id: usize,
    shared: Arc<WorkerShared<R>>,
}

impl<R: ChangeRecord> Drop for LiveGuard<R> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(worker = self.id, "Ingest worker terminated abnormally");
        }
        self.shared.live.send_modify(|live| *live = live.saturating_sub(1));
    }
}

/// Bounded channel plus the workers that drain it.
pub struct IngestLoop<R: ChangeRecord> {
    sender: RwLock<Option<mpsc::Sender<R>>>,
    receiver: SharedReceiver<R>,
    shared: Arc<WorkerShared<R>>,
    started: AtomicBool,
}

impl<R: ChangeRecord> IngestLoop<R> {
    /// Create the channel. Nothing is consumed until [`start`](Self::start).
    pub fn new(
        settings: IngestSettings,
        flusher: Arc<dyn Flusher<R>>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
        Self {
            sender: RwLock::new(Some(tx)),
            receiver: Arc::new(AsyncMutex::new(rx)),
            shared: Arc::new(WorkerShared {
                settings,
                flusher,
                metrics,
                queued: AtomicUsize::new(0),
                live: watch::Sender::new(0),
            }),
            started: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &IngestSettings {
        &self.shared.settings
    }

    /// Spawn the workers. Returns `false` if they were already started.
    pub fn start(&self, shutdown: CancellationToken) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }

        let workers = self.shared.settings.mode.workers();
        self.shared.live.send_modify(|live| *live += workers);
        for id in 0..workers {
            let guard = LiveGuard { id, shared: Arc::clone(&self.shared) };
            let worker = run_worker(
                id,
                Arc::clone(&self.shared),
                Arc::clone(&self.receiver),
                shutdown.clone(),
            );
            tokio::spawn(async move {
                let _guard = guard;
                worker.await;
            });
        }

        info!(
            workers,
            batch_size = self.shared.settings.batch_size,
            flush_interval = ?self.shared.settings.flush_interval,
            "Ingest loop started"
        );
        true
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether new submits can still be accepted.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.sender.read().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Records accepted but not yet picked up by a worker.
    ///
    /// Still counts what sits in the channel after [`close`](Self::close).
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    /// Number of workers that have not finished yet.
    #[must_use]
    pub fn live_workers(&self) -> usize {
        *self.shared.live.borrow()
    }

    /// Enqueue `record`, waiting at most `wait` for channel space.
    ///
    /// Returns `false` if the deadline passed or the loop is closed. A
    /// `true` return means a worker will include the record in a flush,
    /// at the latest in its final one.
    pub async fn submit(&self, record: R, wait: Duration) -> bool {
        let Some(sender) = self.sender.read().clone() else {
            self.shared.metrics.record_submit(false);
            return false;
        };

        // Count before the record becomes visible so a worker never takes it first
        let accepted = match tokio::time::timeout(wait, sender.reserve()).await {
            Ok(Ok(permit)) => {
                self.shared.queued.fetch_add(1, Ordering::SeqCst);
                permit.send(record);
                true
            }
            _ => false,
        };
        self.shared.metrics.record_submit(accepted);
        if !accepted {
            debug!(?wait, "Record not accepted before deadline");
        }
        accepted
    }

    /// Like [`submit`](Self::submit), but also gives up when `cancel` fires.
    pub async fn submit_until(&self, record: R, cancel: &CancellationToken, wait: Duration) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.shared.metrics.record_submit(false);
                false
            }
            accepted = self.submit(record, wait) => accepted,
        }
    }

    /// Refuse further submits. Workers finish what is queued, then exit.
    ///
    /// Returns `true` if this call closed the loop.
    pub fn close(&self) -> bool {
        self.sender.write().take().is_some()
    }

    /// Wait for every spawned worker to finish its final flush.
    ///
    /// Cancel safe: dropping this future leaves the workers running, and a
    /// later call waits for them again.
    pub async fn join(&self) {
        let mut live = self.shared.live.subscribe();
        // The sender lives in `self.shared`, so this cannot observe a closed channel
        let _ = live.wait_for(|live| *live == 0).await;
    }
}

async fn recv_shared<R: ChangeRecord>(
    receiver: &AsyncMutex<mpsc::Receiver<R>>,
    shared: &WorkerShared<R>,
) -> Option<R> {
    let record = receiver.lock().await.recv().await;
    if record.is_some() {
        shared.queued.fetch_sub(1, Ordering::SeqCst);
    }
    record
}

/// Body of every worker, in single and pool mode alike.
async fn run_worker<R: ChangeRecord>(
    id: usize,
    shared: Arc<WorkerShared<R>>,
    receiver: SharedReceiver<R>,
    shutdown: CancellationToken,
) {
    let flush_interval = shared.settings.flush_interval;
    let mut buffer = PendingBuffer::new(shared.settings.batch_size);
    let idle = tokio::time::sleep(flush_interval);
    tokio::pin!(idle);
    let mut idle_armed = false;

    debug!(worker = id, "Ingest worker started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                // Closing first fails blocked and later sends; everything
                // already accepted is still received and joins the final flush
                let mut rx = receiver.lock().await;
                rx.close();
                let mut drained = 0usize;
                while let Some(record) = rx.recv().await {
                    shared.queued.fetch_sub(1, Ordering::SeqCst);
                    buffer.push(record);
                    drained += 1;
                }
                debug!(worker = id, drained, "Shutdown requested");
                break;
            }

            received = recv_shared(&receiver, &shared) => match received {
                Some(record) => {
                    if let Some(trigger) = buffer.push(record) {
                        shared.flush_buffer(&mut buffer, trigger, id).await;
                    }
                    idle.as_mut().reset(Instant::now() + flush_interval);
                    idle_armed = true;
                }
                None => {
                    debug!(worker = id, "Input channel closed");
                    break;
                }
            },

            _ = &mut idle, if idle_armed => {
                idle_armed = false;
                shared.flush_buffer(&mut buffer, FlushTrigger::Idle, id).await;
            }
        }
    }

    shared.final_flush(&mut buffer, id).await;
    debug!(worker = id, "Ingest worker stopped");
}

impl<R: ChangeRecord> WorkerShared<R> {
    async fn flush_buffer(&self, buffer: &mut PendingBuffer<R>, trigger: FlushTrigger, worker: usize) {
        if let Some(batch) = buffer.flush(trigger) {
            // Logged and counted inside
            let _ = self.flush(batch, worker).await;
        }
    }

    async fn flush(&self, batch: FlushBatch<R>, worker: usize) -> Result<(), FlushError> {
        let count = batch.len();
        let trigger = batch.trigger;
        let start = std::time::Instant::now();

        let result = retry("changelog_flush", &self.settings.retry, || {
            self.flusher.apply(&batch.records)
        })
        .await;

        let elapsed = start.elapsed();
        self.metrics.record_flush(trigger, count, result.is_ok(), elapsed);

        match &result {
            Ok(()) => debug!(worker, count, reason = %trigger, ?elapsed, "Batch flushed"),
            Err(e) => error!(
                worker,
                batch_size = count,
                reason = %trigger,
                error = %e,
                "Flush failed, batch dropped"
            ),
        }
        result
    }

    /// Exactly one flush on the way out, bounded by its own timeout.
    async fn final_flush(&self, buffer: &mut PendingBuffer<R>, worker: usize) {
        let Some(batch) = buffer.flush(FlushTrigger::Shutdown) else {
            return;
        };

        let count = batch.len();
        let limit = self.settings.shutdown_flush_timeout;
        match tokio::time::timeout(limit, self.flush(batch, worker)).await {
            Ok(Ok(())) => info!(worker, count, "Final flush complete"),
            Ok(Err(_)) => {}
            Err(_) => {
                self.metrics.record_flush(FlushTrigger::Shutdown, count, false, limit);
                error!(
                    worker,
                    batch_size = count,
                    error = %FlushError::Timeout(limit),
                    "Final flush abandoned, batch dropped"
                );
            }
        }
    }
}
