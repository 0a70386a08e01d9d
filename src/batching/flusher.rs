// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::change::ChangeRecord;
use crate::storage::{GraphStore, StorageError, WriteBatch};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlushError {
    #[error("record {index} in batch could not be applied: {source}")]
    Apply {
        index: usize,
        #[source]
        source: StorageError,
    },
    #[error("commit of {count} records failed: {source}")]
    Commit {
        count: usize,
        #[source]
        source: StorageError,
    },
    #[error("flush did not finish within {0:?}")]
    Timeout(Duration),
}

/// Persists one batch of records.
#[async_trait]
pub trait Flusher<R: ChangeRecord>: Send + Sync {
    async fn apply(&self, batch: &[R]) -> Result<(), FlushError>;
}

/// Writes batches into a [`GraphStore`] as a single unit of work.
///
/// Records with nothing to write are skipped. The first record that fails to
/// apply aborts the whole batch before anything is committed.
pub struct StoreFlusher<S: ?Sized> {
    store: Arc<S>,
}

impl<S: GraphStore + ?Sized> StoreFlusher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[async_trait]
impl<R, S> Flusher<R> for StoreFlusher<S>
where
    R: ChangeRecord,
    S: GraphStore + ?Sized,
{
    async fn apply(&self, batch: &[R]) -> Result<(), FlushError> {
        let mut unit = WriteBatch::with_capacity(batch.len());
        let mut skipped = 0usize;

        for (index, record) in batch.iter().enumerate() {
            if record.is_empty() {
                skipped += 1;
                continue;
            }
            record
                .apply(&mut unit)
                .map_err(|source| FlushError::Apply { index, source })?;
        }

        if unit.is_empty() {
            debug!(skipped, "Nothing to commit");
            return Ok(());
        }

        let count = unit.len();
        self.store
            .commit(unit.into_ops())
            .await
            .map_err(|source| FlushError::Commit { count, source })?;

        debug!(count, skipped, "Batch committed");
        Ok(())
    }
}
