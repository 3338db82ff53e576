mod manager;
mod metadata;

pub use manager::{load_weights, read_metadata, save_full_model, unix_timestamp, CheckpointManager};
pub use metadata::CheckpointMetadata;
