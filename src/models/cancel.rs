use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use thiserror::Error;

/// Raised through the pipeline when the flag is set. Resolved back to the
/// not-started phase at the orchestrator boundary, unlike genuine failures.
#[derive(Debug, Error)]
#[error("download cancelled")]
pub struct Cancelled;

/// Cooperative cancellation flag shared between the orchestrator and its
/// worker. Polled between pipeline steps and between streamed chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Cancelled.into())
        } else {
            Ok(())
        }
    }
}
