use std::path::{Path, PathBuf};

/// Filesystem layout of one experiment under the performance output root.
///
/// ```text
/// <root>/Exp_data/Test Report_<id>.txt
/// <root>/Checkpoints/<model>_<id>.mpk        (+ .json metadata)
/// <root>/Model_Stats/exp_<id>/scalars.jsonl
/// <root>/whole_model/Complete_model_<id>.mpk (+ .json network config)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentPaths {
    root: PathBuf,
    id: u32,
}

impl ExperimentPaths {
    pub fn new(root: impl Into<PathBuf>, id: u32) -> Self {
        ExperimentPaths {
            root: root.into(),
            id,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn exp_data_dir(&self) -> PathBuf {
        self.root.join("Exp_data")
    }

    pub fn log_file(&self) -> PathBuf {
        self.exp_data_dir()
            .join(format!("Test Report_{}.txt", self.id))
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("Checkpoints")
    }

    /// Checkpoint path without extension; the burn recorder appends `.mpk`.
    pub fn checkpoint_stem(&self, model: &str) -> PathBuf {
        self.checkpoints_dir().join(format!("{}_{}", model, self.id))
    }

    pub fn checkpoint_file(&self, model: &str) -> PathBuf {
        self.checkpoint_stem(model).with_extension("mpk")
    }

    pub fn checkpoint_metadata(&self, model: &str) -> PathBuf {
        self.checkpoint_stem(model).with_extension("json")
    }

    pub fn model_stats_dir(&self) -> PathBuf {
        self.root
            .join("Model_Stats")
            .join(format!("exp_{}", self.id))
    }

    pub fn whole_model_dir(&self) -> PathBuf {
        self.root.join("whole_model")
    }

    /// Full-model snapshot path without extension.
    pub fn whole_model_stem(&self) -> PathBuf {
        self.whole_model_dir()
            .join(format!("Complete_model_{}", self.id))
    }
}
