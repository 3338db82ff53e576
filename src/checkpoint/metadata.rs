use serde::{Deserialize, Serialize};

/// Sidecar written next to `<model>_<id>.mpk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub experiment_id: u32,
    pub model: String,
    /// Epoch the weights were saved after; 0 for an interrupted run saved
    /// before the first epoch finished.
    pub epoch: usize,
    /// Validation loss of the saved weights, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_loss: Option<f64>,
    pub learning_rate: f64,
    pub timestamp: u64,
    #[serde(default)]
    pub classes: Vec<String>,
    /// Saved from an interrupted run rather than on improvement.
    #[serde(default)]
    pub interrupted: bool,
}
