use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag. The signal handler sets it; the training loop polls it
/// between batches and between epochs.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What to do with the model of an interrupted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDecision {
    /// Write the current weights to the checkpoint and keep the report.
    Save,
    /// Remove every artifact of the experiment.
    Discard,
}

/// Asked once when a run is interrupted.
pub trait InterruptHandler {
    fn decide(&mut self) -> SaveDecision;
}

impl<F: FnMut() -> SaveDecision> InterruptHandler for F {
    fn decide(&mut self) -> SaveDecision {
        self()
    }
}
