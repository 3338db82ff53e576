//! Experiment bookkeeping: the on-disk layout, the text report, the scalar
//! series and the cleanup of discarded runs.

mod cleanup;
mod log;
mod paths;
mod scalars;

pub use cleanup::ArtifactCleanup;
pub use self::log::{ExperimentLog, PREFIX_LEN, SEPARATOR};
pub use paths::ExperimentPaths;
pub use scalars::{ScalarEvent, ScalarWriter};

use std::path::PathBuf;

/// Identity of a run and where its artifacts go.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub id: u32,
    /// Root of `Exp_data/`, `Checkpoints/`, `Model_Stats/` and `whole_model/`.
    pub performance_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            id: 1,
            performance_dir: PathBuf::from("performance"),
        }
    }
}
