use std::path::PathBuf;

/// Errors raised by the experiment report and artifact bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error("directory not found: {0}")]
    DirNotFound(PathBuf),

    #[error("experiment log not found: {0}")]
    LogNotFound(PathBuf),

    #[error("no line in {path} matches the record prefix '{prefix}'")]
    RecordNotFound { path: PathBuf, prefix: String },

    #[error("no experiment logs to remove in {0}")]
    NothingToPurge(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to save model: {0}")]
    ModelSave(String),

    #[error("failed to load model from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("failed to read checkpoint metadata from {path}: {source}")]
    MetadataRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while scanning and decoding the image dataset.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("data not arranged in class folders: expected {0}/<class>/<image>")]
    DataLayout(PathBuf),

    #[error("test class '{0}' has no matching training class")]
    UnknownClass(String),

    #[error("no images found under {0}")]
    Empty(PathBuf),

    #[error("{split} would be empty: {images} training images with valid_fraction {valid_fraction}")]
    EmptySplit {
        split: &'static str,
        images: usize,
        valid_fraction: f64,
    },

    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("failed to build loader worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),

    #[error("no such model: {0}")]
    ModelNotFound(String),

    #[error("{layers} fully connected layers requested but {given} hidden unit sizes given (need {needed})")]
    FeaturesNotProvided {
        layers: usize,
        given: usize,
        needed: usize,
    },

    #[error("unsupported optimizer '{0}' (expected 'adam' or 'sgd')")]
    UnsupportedOptimizer(String),

    #[error("unsupported scheduler '{0}' (expected 'reduce_on_plateau' or 'step_lr')")]
    UnsupportedScheduler(String),

    #[error("resuming from {0} requires the previous minimum validation loss")]
    MissingPriorLoss(PathBuf),
}

/// Errors that can occur while setting up or running training.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("experiment error: {0}")]
    Experiment(#[from] ExperimentError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("failed to read tensor data: {0}")]
    TensorData(String),

    #[error("{0} is empty, nothing to iterate")]
    EmptySource(&'static str),
}
