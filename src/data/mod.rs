//! Dataset loading: class-folder scanning, the train/validation split, image
//! transforms and the parallel batch sources.

mod folder;
mod loader;
mod split;
mod transform;

use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::ThreadPoolBuilder;
use tracing::info;

use crate::error::DataError;

pub use folder::{class_roster, ImageFolder, Sample};
pub use loader::{BatchSource, Batches, ImageBatch};
pub use split::{split_indices, validation_size};
pub use transform::{CropMode, ImageTransform, MEANS, STDEVS};

/// Dataset and loader settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub dataset_dir: PathBuf,
    pub batch_size: usize,
    /// Fraction of the training folder held out for validation.
    pub valid_fraction: f64,
    /// Size of the decode worker pool.
    pub num_workers: usize,
    /// Side of the square crop fed to the network.
    pub image_size: u32,
    /// Short side images are resized to before cropping.
    pub resize: u32,
    /// Seed for the split and the per-epoch shuffles; random when unset.
    pub seed: Option<u64>,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            dataset_dir: PathBuf::from("data"),
            batch_size: 128,
            valid_fraction: 0.2,
            num_workers: 1,
            image_size: 224,
            resize: 255,
            seed: None,
        }
    }
}

/// Everything the training loop needs from the dataset.
pub struct LoadedData {
    pub classes: Vec<String>,
    pub train: BatchSource,
    pub valid: BatchSource,
    pub test: BatchSource,
    pub rng: StdRng,
}

impl LoadedData {
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

/// Scan `<dataset_dir>/train` and `<dataset_dir>/test` and build the three
/// batch sources. Validation is carved out of the training folder.
pub fn load(config: &DataConfig) -> Result<LoadedData, DataError> {
    let train_dir = config.dataset_dir.join("train");
    let test_dir = config.dataset_dir.join("test");
    for dir in [&train_dir, &test_dir] {
        if !dir.is_dir() {
            return Err(DataError::DataLayout(dir.clone()));
        }
    }

    let train_folder = ImageFolder::scan(&train_dir)?;
    let test_folder = ImageFolder::scan_with_roster(&test_dir, &train_folder.classes)?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let (train_idx, valid_idx) = split_indices(train_folder.len(), config.valid_fraction, &mut rng);
    for (split, indices) in [("training set", &train_idx), ("validation set", &valid_idx)] {
        if indices.is_empty() {
            return Err(DataError::EmptySplit {
                split,
                images: train_folder.len(),
                valid_fraction: config.valid_fraction,
            });
        }
    }

    let pool = Arc::new(
        ThreadPoolBuilder::new()
            .num_threads(config.num_workers.max(1))
            .thread_name(|i| format!("loader-{i}"))
            .build()?,
    );

    let train_transform = ImageTransform::train(config.resize, config.image_size);
    let eval_transform = ImageTransform::eval(config.resize, config.image_size);

    let train_samples: Arc<[Sample]> = train_folder.samples.into();
    let test_len = test_folder.len();
    let test_samples: Arc<[Sample]> = test_folder.samples.into();

    info!(
        train = train_idx.len(),
        valid = valid_idx.len(),
        test = test_len,
        classes = train_folder.classes.len(),
        "dataset loaded"
    );

    Ok(LoadedData {
        classes: train_folder.classes,
        train: BatchSource::new(
            "training set",
            train_samples.clone(),
            train_idx,
            config.batch_size,
            true,
            train_transform,
            pool.clone(),
        ),
        valid: BatchSource::new(
            "validation set",
            train_samples,
            valid_idx,
            config.batch_size,
            true,
            eval_transform,
            pool.clone(),
        ),
        test: BatchSource::new(
            "test set",
            test_samples,
            (0..test_len).collect(),
            config.batch_size,
            false,
            eval_transform,
            pool,
        ),
        rng,
    })
}
