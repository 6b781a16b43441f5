//! # Run Context
//!
//! Identity and cancellation state shared by every step of one run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::errors::{ProvisionError, ProvisionResult};

/// Handle that cancels the run it was taken from
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Context for a single provisioning run
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    cancelled: Arc<AtomicBool>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` once cancellation was requested
    pub fn ensure_active(&self) -> ProvisionResult<()> {
        if self.is_cancelled() {
            tracing::warn!(run_id = %self.run_id, "run cancelled");
            return Err(ProvisionError::Cancelled);
        }
        Ok(())
    }
}
