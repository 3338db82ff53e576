use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::ExperimentError;
use crate::experiment::ExperimentPaths;

/// Removes the artifacts of an experiment that must not survive a failed or
/// discarded run.
#[derive(Debug, Clone)]
pub struct ArtifactCleanup {
    root: PathBuf,
}

impl ArtifactCleanup {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactCleanup { root: root.into() }
    }

    /// Remove the metrics directory (when `delete_metrics`) and every report
    /// file of `experiment_id`. Returns the number of report files removed.
    ///
    /// A missing metrics directory only logs a warning. An `Exp_data`
    /// directory without any report at all is an error.
    pub fn purge(&self, experiment_id: u32, delete_metrics: bool) -> Result<usize, ExperimentError> {
        let paths = ExperimentPaths::new(&self.root, experiment_id);

        if delete_metrics {
            let stats_dir = paths.model_stats_dir();
            match fs::remove_dir_all(&stats_dir) {
                Ok(()) => info!(dir = %stats_dir.display(), "removed metrics directory"),
                Err(e) => warn!(dir = %stats_dir.display(), error = %e, "could not remove metrics directory"),
            }
        }

        let exp_data = paths.exp_data_dir();
        let reports = report_files(&exp_data)?;
        if reports.is_empty() {
            return Err(ExperimentError::NothingToPurge(exp_data));
        }

        let mut removed = 0;
        for path in reports {
            if report_id(&path) == Some(experiment_id) {
                fs::remove_file(&path)?;
                info!(file = %path.display(), "removed experiment log");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove the checkpoint and its metadata sidecar, if present.
    pub fn purge_checkpoints(&self, experiment_id: u32, model: &str) -> Result<(), ExperimentError> {
        let paths = ExperimentPaths::new(&self.root, experiment_id);
        for path in [paths.checkpoint_file(model), paths.checkpoint_metadata(model)] {
            if path.exists() {
                fs::remove_file(&path)?;
                info!(file = %path.display(), "removed checkpoint artifact");
            }
        }
        Ok(())
    }
}

fn report_files(dir: &Path) -> Result<Vec<PathBuf>, ExperimentError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    Ok(files)
}

/// Experiment id encoded as the `_<id>` suffix of a report file stem.
fn report_id(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let (_, id) = stem.rsplit_once('_')?;
    id.parse().ok()
}
