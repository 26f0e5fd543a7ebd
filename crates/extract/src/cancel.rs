//! Cooperative cancellation for in-flight runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Checked before every capability call. Calls already dispatched are left to
/// finish and their results are discarded by the caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
