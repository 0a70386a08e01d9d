// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backing store abstraction.
//!
//! The pipeline never talks to a database directly: records write themselves
//! into a [`WriteBatch`] and the batch is committed through a [`GraphStore`].
//! [`InMemoryGraphStore`] is the in-process implementation used by tests and
//! the demo.

pub mod traits;
pub mod memory;

pub use traits::{GraphStore, StorageError, WriteBatch, WriteOp};
pub use memory::{InMemoryGraphStore, StoredEdge, StoredNode};
