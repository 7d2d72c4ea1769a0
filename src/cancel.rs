//! Cooperative cancellation for capture and restore
//!
//! A [`CancellationToken`] is cloned into every recursive step. Workers check
//! it before touching the filesystem and bail out with
//! [`SnapError::Cancelled`](crate::SnapError::Cancelled).

use crate::error::{Result, SnapError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag signalling that an operation should stop
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every operation holding a clone of this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fail with [`SnapError::Cancelled`] once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SnapError::Cancelled)
        } else {
            Ok(())
        }
    }
}
