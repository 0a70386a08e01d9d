//! Changelog lifecycle: start and stop.

use std::time::Duration;
use tracing::{info, warn};

use crate::change::ChangeRecord;

use super::{Changelog, ChangelogError, ChangelogState};

impl<R: ChangeRecord> Changelog<R> {
    /// Spawn the flag poller and the ingest workers.
    ///
    /// Must be called from inside a tokio runtime. A changelog starts once;
    /// later calls return [`ChangelogError::AlreadyStarted`].
    #[tracing::instrument(skip(self))]
    pub fn start(&self) -> Result<(), ChangelogError> {
        let mut previous = ChangelogState::Created;
        let started = self.state.send_if_modified(|state| {
            previous = *state;
            if *state == ChangelogState::Created {
                *state = ChangelogState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ChangelogError::AlreadyStarted(previous));
        }

        let poller = self.flags.start(self.shutdown.clone());
        *self.poller.lock() = Some(poller);
        self.ingest.start(self.shutdown.clone());

        info!(
            batch_size = self.config.batch_size(),
            flush_interval = ?self.config.flush_interval(),
            poll_interval = ?self.config.poll_interval(),
            workers = self.config.flush_mode.workers(),
            "Changelog started"
        );
        Ok(())
    }

    /// Stop accepting records, run the final flush and wait for it.
    ///
    /// Waits at most `deadline`. On timeout the workers keep flushing in the
    /// background under their own bound,
    /// [`ChangelogError::ShutdownTimeout`] is returned and the state stays
    /// [`ChangelogState::ShuttingDown`]. Calling `stop` again waits for those
    /// workers before reporting [`ChangelogState::Stopped`]; once stopped,
    /// further calls are no-ops.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self, deadline: Duration) -> Result<(), ChangelogError> {
        let mut previous = ChangelogState::Created;
        self.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                ChangelogState::Running => {
                    *state = ChangelogState::ShuttingDown;
                    true
                }
                ChangelogState::Created => {
                    *state = ChangelogState::Stopped;
                    true
                }
                _ => false,
            }
        });

        match previous {
            ChangelogState::Stopped => return Ok(()),
            ChangelogState::Created => {
                self.ingest.close();
                self.shutdown.cancel();
                info!("Changelog stopped before it was started");
                return Ok(());
            }
            ChangelogState::Running | ChangelogState::ShuttingDown => {}
        }

        info!("Changelog shutting down");
        self.ingest.close();
        self.shutdown.cancel();

        let mut poller = self.poller.lock().take();
        let wait = async {
            self.ingest.join().await;
            if let Some(handle) = poller.as_mut() {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Flag poller terminated abnormally");
                }
            }
        };

        if tokio::time::timeout(deadline, wait).await.is_err() {
            // The next stop waits on whatever is still running
            *self.poller.lock() = poller;
            warn!(
                ?deadline,
                live_workers = self.ingest.live_workers(),
                "Shutdown deadline passed before final flush completed"
            );
            return Err(ChangelogError::ShutdownTimeout(deadline));
        }

        self.state.send_replace(ChangelogState::Stopped);
        info!("Changelog stopped");
        Ok(())
    }
}
