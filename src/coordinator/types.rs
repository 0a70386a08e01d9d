//! Public types for the changelog coordinator.

use std::time::Duration;
use thiserror::Error;

use crate::change::HashError;
use crate::flag::FlagError;

/// Changelog lifecycle state.
///
/// Use [`super::Changelog::state()`] to check the current state or
/// [`super::Changelog::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangelogState {
    /// Just created, not yet started
    Created,
    /// Poller and ingest workers running
    Running,
    /// Final flush in progress
    ShuttingDown,
    /// All workers finished
    Stopped,
}

impl std::fmt::Display for ChangelogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChangelogError {
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Flag(#[from] FlagError),
    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),
    #[error("changelog is not running (state: {0})")]
    NotRunning(ChangelogState),
    #[error("changelog already started (state: {0})")]
    AlreadyStarted(ChangelogState),
    #[error("record not accepted within {0:?}")]
    Rejected(Duration),
}

/// What happened to a record passed to [`super::Changelog::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// New or changed, and now queued for flush
    Queued,
    /// Identical to the last stored state, dropped
    Unchanged,
}
