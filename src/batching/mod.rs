// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

pub mod buffer;
pub mod flusher;
pub mod ingest;

pub use buffer::{FlushBatch, FlushTrigger, PendingBuffer};
pub use flusher::{FlushError, Flusher, StoreFlusher};
pub use ingest::{IngestLoop, IngestSettings};
