//! Cooperative cancellation for the iterative loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{EngineError, Result};

/// Shareable abort flag.
///
/// The job dispatcher holds a clone and calls [`CancelHandle::cancel`] on
/// timeout. Every fixed-point loop checks the flag once per pass.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag before a retry.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Fail with [`EngineError::Cancelled`] if cancellation was requested.
    pub fn check(&self, table: &str) -> Result<()> {
        if self.is_cancelled() {
            tracing::debug!(table = table, "cancellation observed");
            return Err(EngineError::Cancelled(table.to_string()));
        }
        Ok(())
    }
}
