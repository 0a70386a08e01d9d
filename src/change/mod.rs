// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change records flowing through the pipeline.
//!
//! A [`ChangeRecord`] is anything that can say *who* it is (identity key),
//! *what* it looks like (content hash) and how to write itself into a
//! [`WriteBatch`]. The pipeline only ever sees this trait; [`Change`] is the
//! stock implementation covering graph nodes and edges.
//!
//! # Example
//!
//! ```
//! use changelog_engine::{ChangeRecord, NodeChange, Properties};
//!
//! let first = NodeChange::new("S-1-5-21-1000", ["User"], Properties::new()
//!     .with("name", "alice")
//!     .with("lastseen", "2025-01-01T00:00:00Z"));
//! let again = NodeChange::new("S-1-5-21-1000", ["User"], Properties::new()
//!     .with("name", "alice")
//!     .with("lastseen", "2025-02-01T00:00:00Z"));
//!
//! // Same entity, and the only difference is a volatile field
//! assert_eq!(first.identity_key().unwrap(), again.identity_key().unwrap());
//! assert_eq!(first.content_hash().unwrap(), again.content_hash().unwrap());
//! ```

pub mod properties;
pub mod record;

pub use properties::{IgnoreSet, Properties, DEFAULT_IGNORED_KEYS};
pub use record::{Change, EdgeChange, NodeChange};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::storage::{StorageError, WriteBatch};

/// Failure computing an identity key or content hash.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("record has no identity: {0}")]
    MissingIdentity(&'static str),
    #[error("failed to encode property '{key}': {reason}")]
    Encode { key: String, reason: String },
}

/// The minimal contract a record must satisfy to enter the pipeline.
pub trait ChangeRecord: Send + Sync + 'static {
    /// Stable hash over the business key. Equal keys mean the same entity.
    fn identity_key(&self) -> Result<u64, HashError>;

    /// Hash over comparable, non-volatile attributes.
    fn content_hash(&self) -> Result<u64, HashError>;

    /// Write this record into one unit of work.
    fn apply(&self, batch: &mut WriteBatch) -> Result<(), StorageError>;

    /// Records with nothing to write are skipped at flush time.
    fn is_empty(&self) -> bool {
        false
    }
}

/// Truncate a SHA-256 digest to its first eight bytes.
pub(crate) fn digest_u64(hasher: Sha256) -> u64 {
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Length-prefixed so ("ab", "c") and ("a", "bc") never collide.
pub(crate) fn update_field(hasher: &mut Sha256, field: &str) {
    update_bytes(hasher, field.as_bytes());
}

pub(crate) fn update_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
