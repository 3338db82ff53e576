use std::path::{Path, PathBuf};

use crate::checkpoint::{CheckpointManager, CheckpointMetadata};
use crate::error::TrainingError;
use crate::experiment::ExperimentPaths;
use crate::training::accuracy::TopKAccuracy;
use crate::training::cancel::CancellationToken;

/// Outcome of one pass over a batch source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pass {
    /// Mean loss over every example of the pass.
    Completed(f64),
    /// The cancellation token was set before the pass finished.
    Interrupted,
}

/// Loss and accuracy counters of the final test pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub loss: f64,
    pub accuracy: TopKAccuracy,
}

/// The model-side operations the orchestrator drives. Implemented by the
/// burn-backed [`TrainingSession`](crate::training::TrainingSession).
pub trait Learner {
    /// Class names; index `i` is output `i` of the network.
    fn classes(&self) -> &[String];

    fn num_train(&self) -> usize;

    fn num_test(&self) -> usize;

    /// One pass over the training set with parameter updates at `lr`.
    fn train_epoch(&mut self, lr: f64, cancel: &CancellationToken) -> Result<Pass, TrainingError>;

    /// One pass over the validation set, no updates.
    fn validate_epoch(&mut self, cancel: &CancellationToken) -> Result<Pass, TrainingError>;

    /// Full pass over the test set.
    fn test(&mut self) -> Result<TestReport, TrainingError>;

    /// Replace the current weights with the ones stored at `path`.
    fn load_weights(&mut self, path: &Path) -> Result<(), TrainingError>;

    fn save_checkpoint(
        &self,
        checkpoints: &CheckpointManager,
        metadata: &CheckpointMetadata,
    ) -> Result<PathBuf, TrainingError>;

    /// Write the complete network under the experiment's `whole_model` dir.
    fn save_full_model(&self, paths: &ExperimentPaths) -> Result<PathBuf, TrainingError>;
}
