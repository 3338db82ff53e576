use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use burn::prelude::*;
use burn::record::DefaultRecorder;
use tracing::info;

use crate::checkpoint::metadata::CheckpointMetadata;
use crate::error::CheckpointError;
use crate::experiment::ExperimentPaths;
use crate::model::TransferNetConfig;

/// Saves and loads the single checkpoint of one experiment, overwriting it in
/// place on every save.
pub struct CheckpointManager {
    paths: ExperimentPaths,
    model: String,
}

impl CheckpointManager {
    pub fn new(paths: ExperimentPaths, model: impl Into<String>) -> Self {
        CheckpointManager {
            paths,
            model: model.into(),
        }
    }

    pub fn weights_path(&self) -> PathBuf {
        self.paths.checkpoint_file(&self.model)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.paths.checkpoint_metadata(&self.model)
    }

    /// Write `module` and its metadata. Both go to temporary files first and
    /// are renamed over the previous checkpoint.
    pub fn save<B: Backend, M: Module<B>>(
        &self,
        module: &M,
        metadata: &CheckpointMetadata,
    ) -> Result<PathBuf, CheckpointError> {
        let dir = self.paths.checkpoints_dir();
        fs::create_dir_all(&dir)?;

        let tmp_stem = dir.join(format!(".{}_{}_partial", self.model, self.paths.id()));
        let recorder = DefaultRecorder::default();
        module
            .clone()
            .save_file(tmp_stem.clone(), &recorder)
            .map_err(|e| CheckpointError::ModelSave(e.to_string()))?;

        let tmp_meta = tmp_stem.with_extension("json");
        fs::write(&tmp_meta, serde_json::to_string_pretty(metadata)?)?;

        let weights = self.weights_path();
        fs::rename(tmp_stem.with_extension("mpk"), &weights)?;
        fs::rename(&tmp_meta, self.metadata_path())?;

        info!(path = %weights.display(), epoch = metadata.epoch, "checkpoint saved");
        Ok(weights)
    }

    pub fn read_metadata(&self) -> Result<CheckpointMetadata, CheckpointError> {
        read_metadata(&self.metadata_path())
    }

    pub fn exists(&self) -> bool {
        self.weights_path().is_file()
    }
}

/// Load weights from a record file. The extension of `path` is ignored; the
/// recorder's own extension is used.
pub fn load_weights<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    device: &B::Device,
) -> Result<M, CheckpointError> {
    let file = path.with_extension("mpk");
    if !file.is_file() {
        return Err(CheckpointError::ModelLoad {
            path: file,
            reason: "file not found".into(),
        });
    }
    let recorder = DefaultRecorder::default();
    module
        .load_file(file.with_extension(""), &recorder, device)
        .map_err(|e| CheckpointError::ModelLoad {
            path: file,
            reason: e.to_string(),
        })
}

pub fn read_metadata(path: &Path) -> Result<CheckpointMetadata, CheckpointError> {
    let json = fs::read_to_string(path).map_err(|e| CheckpointError::MetadataRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&json)?)
}

/// Write the complete network (weights plus architecture config) to
/// `whole_model/Complete_model_<id>.{mpk,json}`.
pub fn save_full_model<B: Backend, M: Module<B>>(
    paths: &ExperimentPaths,
    module: &M,
    config: &TransferNetConfig,
) -> Result<PathBuf, CheckpointError> {
    fs::create_dir_all(paths.whole_model_dir())?;
    let stem = paths.whole_model_stem();
    let recorder = DefaultRecorder::default();
    module
        .clone()
        .save_file(stem.clone(), &recorder)
        .map_err(|e| CheckpointError::ModelSave(e.to_string()))?;
    config.save(stem.with_extension("json"))?;

    let path = stem.with_extension("mpk");
    info!(path = %path.display(), "full model saved");
    Ok(path)
}

pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
