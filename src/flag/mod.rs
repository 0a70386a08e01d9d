// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Feature-flag driven lifecycle of the dedup cache.
//!
//! The [`FlagManager`] polls a [`FlagSource`] and owns the only
//! [`DedupCache`](crate::DedupCache) in the process. Flag on → a fresh,
//! pre-sized cache is published; flag off → the cache is dropped and every
//! lookup passes through.

pub mod manager;
pub mod source;

pub use manager::{CacheState, FlagManager};
pub use source::{
    AlwaysPrimary, FlagError, FlagSource, FlagState, FnFlagSource, ManualFlag, PrimaryLock,
};
