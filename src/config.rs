use std::path::Path;

use tracing::warn;

use crate::data::DataConfig;
use crate::error::ConfigError;
use crate::experiment::ExperimentConfig;
use crate::model::ModelConfig;
use crate::optim::OptimConfig;
use crate::training::TrainingConfig;

/// Top-level application configuration, loadable from TOML.
///
/// Optimizer, scheduler and backbone names are not checked here: an unknown
/// name is reported while the experiment is being set up, after its partial
/// report has been removed.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub experiment: ExperimentConfig,
    pub data: DataConfig,
    pub model: ModelConfig,
    pub optim: OptimConfig,
    pub training: TrainingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data.batch_size == 0 {
            return Err(ConfigError::Validation(
                "data.batch_size must be > 0".into(),
            ));
        }
        if self.data.valid_fraction <= 0.0 || self.data.valid_fraction >= 1.0 {
            return Err(ConfigError::Validation(
                "data.valid_fraction must be in (0, 1)".into(),
            ));
        }
        if self.data.num_workers == 0 {
            return Err(ConfigError::Validation(
                "data.num_workers must be >= 1".into(),
            ));
        }
        if self.data.image_size == 0 {
            return Err(ConfigError::Validation(
                "data.image_size must be > 0".into(),
            ));
        }
        if self.data.resize < self.data.image_size {
            return Err(ConfigError::Validation(
                "data.resize must be >= data.image_size".into(),
            ));
        }

        if self.model.head_layers == 0 {
            return Err(ConfigError::Validation(
                "model.head_layers must be >= 1".into(),
            ));
        }
        if self.model.hidden_units.contains(&0) {
            return Err(ConfigError::Validation(
                "model.hidden_units must all be > 0".into(),
            ));
        }

        if self.optim.learning_rate <= 0.0 {
            return Err(ConfigError::Validation(
                "optim.learning_rate must be > 0".into(),
            ));
        }
        if self.optim.factor <= 0.0 || self.optim.factor >= 1.0 {
            return Err(ConfigError::Validation(
                "optim.factor must be in (0, 1)".into(),
            ));
        }
        if self.optim.threshold < 0.0 {
            return Err(ConfigError::Validation(
                "optim.threshold must be >= 0".into(),
            ));
        }
        if self.optim.step_size == 0 {
            return Err(ConfigError::Validation(
                "optim.step_size must be > 0".into(),
            ));
        }
        if self.optim.gamma <= 0.0 || self.optim.gamma > 1.0 {
            return Err(ConfigError::Validation(
                "optim.gamma must be in (0, 1]".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.optim.momentum) {
            return Err(ConfigError::Validation(
                "optim.momentum must be in [0, 1)".into(),
            ));
        }

        if self.training.epochs == 0 {
            return Err(ConfigError::Validation(
                "training.epochs must be > 0".into(),
            ));
        }
        if let Some(loss) = self.training.prior_valid_loss {
            if !loss.is_finite() || loss < 0.0 {
                return Err(ConfigError::Validation(
                    "training.prior_valid_loss must be a finite, non-negative loss".into(),
                ));
            }
        }

        Ok(())
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&AppConfig::default()).expect("default config serializes")
    }
}
