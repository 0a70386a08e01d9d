// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlagError {
    #[error("flag source unavailable: {0}")]
    Unavailable(String),
    #[error("primary lock check failed: {0}")]
    Lock(String),
}

/// One observation of the external flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagState {
    pub enabled: bool,
    /// Expected number of identities, used to pre-size a new cache
    pub size_hint: usize,
}

impl FlagState {
    #[must_use]
    pub fn enabled(size_hint: usize) -> Self {
        Self { enabled: true, size_hint }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { enabled: false, size_hint: 0 }
    }
}

/// Where the enable/disable signal and sizing hint come from.
#[async_trait]
pub trait FlagSource: Send + Sync {
    async fn poll(&self) -> Result<FlagState, FlagError>;
}

/// Adapts an async closure into a [`FlagSource`].
pub struct FnFlagSource<F>(pub F);

#[async_trait]
impl<F, Fut> FlagSource for FnFlagSource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<FlagState, FlagError>> + Send,
{
    async fn poll(&self) -> Result<FlagState, FlagError> {
        (self.0)().await
    }
}

/// In-process flag flipped by hand. Counts how often it was polled.
#[derive(Debug, Default)]
pub struct ManualFlag {
    enabled: AtomicBool,
    size_hint: AtomicUsize,
    failing: AtomicBool,
    polls: AtomicU64,
}

impl ManualFlag {
    #[must_use]
    pub fn new(enabled: bool, size_hint: usize) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            size_hint: AtomicUsize::new(size_hint),
            failing: AtomicBool::new(false),
            polls: AtomicU64::new(0),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_size_hint(&self, size_hint: usize) {
        self.size_hint.store(size_hint, Ordering::SeqCst);
    }

    /// While set, every poll returns [`FlagError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn poll_count(&self) -> u64 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlagSource for ManualFlag {
    async fn poll(&self) -> Result<FlagState, FlagError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FlagError::Unavailable("manual flag set to fail".into()));
        }
        Ok(FlagState {
            enabled: self.enabled.load(Ordering::SeqCst),
            size_hint: self.size_hint.load(Ordering::SeqCst),
        })
    }
}

/// High-availability gate: only the primary instance mutates the cache.
#[async_trait]
pub trait PrimaryLock: Send + Sync {
    async fn is_primary(&self) -> Result<bool, FlagError>;
}

/// Single-instance deployments are always primary.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysPrimary;

#[async_trait]
impl PrimaryLock for AlwaysPrimary {
    async fn is_primary(&self) -> Result<bool, FlagError> {
        Ok(true)
    }
}
