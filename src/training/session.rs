use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, TensorData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::checkpoint::{self, CheckpointManager, CheckpointMetadata};
use crate::config::AppConfig;
use crate::data::{BatchSource, LoadedData};
use crate::error::{DataError, TrainingError};
use crate::experiment::ExperimentPaths;
use crate::model::{self, TransferNet, TransferNetConfig};
use crate::optim::ModelOptimizer;
use crate::training::accuracy::TopKAccuracy;
use crate::training::cancel::{CancellationToken, InterruptHandler};
use crate::training::learner::{Learner, Pass, TestReport};
use crate::training::orchestrator::{Experiment, RunOutcome, Trainer};

/// Top-k reported next to top-1 (clamped to the class count).
pub const TOP_K: usize = 5;

/// Everything one run trains with: device, network, optimizer and the batch
/// sources with their class roster.
pub struct TrainingSession<B: AutodiffBackend> {
    device: B::Device,
    model: TransferNet<B>,
    net_config: TransferNetConfig,
    optimizer: ModelOptimizer<TransferNet<B>, B>,
    data: LoadedData,
}

impl<B: AutodiffBackend> TrainingSession<B> {
    pub fn new(
        model: TransferNet<B>,
        net_config: TransferNetConfig,
        optimizer: ModelOptimizer<TransferNet<B>, B>,
        data: LoadedData,
        device: B::Device,
    ) -> Self {
        TrainingSession {
            device,
            model,
            net_config,
            optimizer,
            data,
        }
    }

    pub fn model(&self) -> &TransferNet<B> {
        &self.model
    }

    pub fn net_config(&self) -> &TransferNetConfig {
        &self.net_config
    }

    /// Class probabilities for one image file, most likely first.
    pub fn predict(&mut self, image_path: &Path) -> Result<Vec<(String, f32)>, TrainingError> {
        let image = image::open(image_path).map_err(|source| DataError::Decode {
            path: image_path.to_path_buf(),
            source,
        })?;
        let transform = self.data.test.transform();
        let pixels = transform.apply(&image, &mut self.data.rng);
        let s = transform.crop as usize;

        let input = Tensor::<B::InnerBackend, 1>::from_data(TensorData::from(pixels.as_slice()), &self.device)
            .reshape([1, 3, s, s]);
        let probs = to_f32_vec(self.model.valid().probabilities(input))?;

        let mut ranked: Vec<(String, f32)> = self.data.classes.iter().cloned().zip(probs).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(ranked)
    }

    fn eval_pass(
        &self,
        source: &BatchSource,
        mut rng: StdRng,
        cancel: Option<&CancellationToken>,
        mut accuracy: Option<&mut TopKAccuracy>,
    ) -> Result<Pass, TrainingError> {
        let model = self.model.valid();
        let loss_fn = CrossEntropyLossConfig::new().init::<B::InnerBackend>(&self.device);

        let mut total = 0.0;
        let mut seen = 0;
        for batch in source.epoch(&mut rng) {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Ok(Pass::Interrupted);
            }
            let batch = batch?;
            let (images, targets) = batch.to_tensors::<B::InnerBackend>(&self.device);
            let logits = model.forward(images);
            let loss: f64 = loss_fn
                .forward(logits.clone(), targets)
                .into_scalar()
                .elem();
            if let Some(acc) = accuracy.as_deref_mut() {
                acc.record_batch(&to_f32_vec(logits)?, &batch.labels);
            }
            total += loss * batch.len() as f64;
            seen += batch.len();
        }
        mean_loss(total, seen, source.name()).map(Pass::Completed)
    }
}

impl<B: AutodiffBackend> Learner for TrainingSession<B> {
    fn classes(&self) -> &[String] {
        &self.data.classes
    }

    fn num_train(&self) -> usize {
        self.data.train.len()
    }

    fn num_test(&self) -> usize {
        self.data.test.len()
    }

    fn train_epoch(&mut self, lr: f64, cancel: &CancellationToken) -> Result<Pass, TrainingError> {
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let mut total = 0.0;
        let mut seen = 0;

        for (i, batch) in self.data.train.epoch(&mut self.data.rng).enumerate() {
            if cancel.is_cancelled() {
                return Ok(Pass::Interrupted);
            }
            let batch = batch?;
            let (images, targets) = batch.to_tensors::<B>(&self.device);
            let logits = self.model.forward(images);
            let loss = loss_fn.forward(logits, targets);
            let value: f64 = loss.clone().into_scalar().elem();

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self.optimizer.step(lr, self.model.clone(), grads);

            total += value * batch.len() as f64;
            seen += batch.len();
            debug!(batch = i, loss = value, "training batch");
        }
        mean_loss(total, seen, self.data.train.name()).map(Pass::Completed)
    }

    fn validate_epoch(&mut self, cancel: &CancellationToken) -> Result<Pass, TrainingError> {
        // Fresh order every epoch, drawn from the session's seeded stream.
        let rng = StdRng::seed_from_u64(self.data.rng.random());
        self.eval_pass(&self.data.valid, rng, Some(cancel), None)
    }

    fn test(&mut self) -> Result<TestReport, TrainingError> {
        let mut accuracy = TopKAccuracy::new(self.data.num_classes(), TOP_K);
        let rng = StdRng::seed_from_u64(self.data.rng.random());
        let loss = match self.eval_pass(&self.data.test, rng, None, Some(&mut accuracy))? {
            Pass::Completed(loss) => loss,
            Pass::Interrupted => unreachable!("test pass runs without a cancellation token"),
        };
        Ok(TestReport { loss, accuracy })
    }

    fn load_weights(&mut self, path: &Path) -> Result<(), TrainingError> {
        self.model = checkpoint::load_weights(self.model.clone(), path, &self.device)?;
        Ok(())
    }

    fn save_checkpoint(
        &self,
        checkpoints: &CheckpointManager,
        metadata: &CheckpointMetadata,
    ) -> Result<PathBuf, TrainingError> {
        Ok(checkpoints.save(&self.model, metadata)?)
    }

    fn save_full_model(&self, paths: &ExperimentPaths) -> Result<PathBuf, TrainingError> {
        Ok(checkpoint::save_full_model(paths, &self.model, &self.net_config)?)
    }
}

fn mean_loss(total: f64, seen: usize, source: &'static str) -> Result<f64, TrainingError> {
    if seen == 0 {
        return Err(TrainingError::EmptySource(source));
    }
    Ok(total / seen as f64)
}

fn to_f32_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>, TrainingError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TrainingError::TensorData(format!("{e:?}")))
}

/// Set up an experiment from `config` and train it to completion.
///
/// Setup failures (dataset layout, empty splits, head sizes, optimizer or
/// scheduler names, missing prior loss) remove the partial report before
/// returning. Failures once training has started remove the report, the
/// metrics and any checkpoint this run wrote.
pub fn run_experiment<B: AutodiffBackend>(
    config: &AppConfig,
    device: &B::Device,
    cancel: &CancellationToken,
    on_interrupt: &mut dyn InterruptHandler,
) -> Result<RunOutcome, TrainingError> {
    let experiment = Experiment::open(
        &config.experiment.performance_dir,
        config.experiment.id,
        &config.model.backbone,
        &config.data.dataset_dir,
    )?;

    let data = experiment.load_data(&config.data)?;
    let hidden = experiment.record_head(config.model.head_layers, config.model.head_hidden_units())?;
    let kind = config.model.backbone_kind().map_err(|e| experiment.fail(e))?;
    let net_config = TransferNetConfig::new(kind, data.num_classes()).with_hidden_units(hidden);
    let network = model::adapt::<B>(&config.model, data.num_classes(), device)
        .map_err(|e| experiment.fail(e))?;

    let optimization = experiment.configure_optimization(&config.optim)?;
    let mut scheduler = optimization.build_scheduler();
    let optimizer: ModelOptimizer<TransferNet<B>, B> =
        ModelOptimizer::new(optimization.optimizer, optimization.momentum);

    info!(
        experiment = experiment.id(),
        backbone = %kind,
        classes = data.num_classes(),
        optimizer = %optimizer.kind(),
        "session ready"
    );
    let mut session = TrainingSession::new(network, net_config, optimizer, data, device.clone());
    Trainer::new(&experiment, &config.training).run(
        &mut session,
        scheduler.as_mut(),
        cancel,
        on_interrupt,
    )
}
