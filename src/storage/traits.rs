// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// A single mutation queued inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or replace a node keyed by its external object id.
    UpsertNode {
        object_id: String,
        kinds: Vec<String>,
        properties: BTreeMap<String, Value>,
        deleted: Vec<String>,
    },
    /// Create or replace an edge keyed by (source, target, kind).
    UpsertEdge {
        source: String,
        target: String,
        kind: String,
        properties: BTreeMap<String, Value>,
        deleted: Vec<String>,
    },
}

/// One unit of work against a [`GraphStore`].
///
/// Records write themselves into the batch; nothing reaches the store until
/// the whole batch is committed, so a failure part-way through leaves the
/// store untouched.
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { ops: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Backing store the pipeline persists into.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Apply every op as one atomic unit. Returns the number of ops written.
    async fn commit(&self, ops: Vec<WriteOp>) -> Result<usize, StorageError>;

    /// Number of distinct nodes currently stored.
    async fn node_count(&self) -> Result<u64, StorageError>;

    /// Number of distinct edges currently stored.
    async fn edge_count(&self) -> Result<u64, StorageError>;
}
