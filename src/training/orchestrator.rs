use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::checkpoint::{unix_timestamp, CheckpointManager, CheckpointMetadata};
use crate::data::{self, DataConfig, LoadedData};
use crate::error::{ConfigError, ExperimentError, TrainingError};
use crate::experiment::{ArtifactCleanup, ExperimentLog, ExperimentPaths, ScalarWriter};
use crate::optim::{self, LrScheduler, OptimConfig, Optimization};
use crate::training::cancel::{CancellationToken, InterruptHandler, SaveDecision};
use crate::training::learner::{Learner, Pass, TestReport};
use crate::training::metrics::{EpochTimer, History};

pub const TAG_PREVIOUS_MIN: &str = "Previous Min Valid loss";
pub const TAG_MIN_VALID: &str = "Minimum Valid loss";
pub const TAG_BEST_LR: &str = "Best Learning rate that gave min valid loss";

/// Scalar tags written to the metrics directory.
pub const SCALAR_LR: &str = "Learning rate";
pub const SCALAR_TRAIN_LOSS: &str = "Training loss";
pub const SCALAR_VALID_LOSS: &str = "Validation loss";

const BANNER: &str = "##############################################";

/// Epoch loop settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    /// Also write the complete network under `whole_model/` after testing.
    pub save_full_model: bool,
    /// Continue from the checkpoint of an earlier run.
    pub resume_from: Option<PathBuf>,
    /// Start from an arbitrary weight file.
    pub custom_checkpoint: Option<PathBuf>,
    /// Best validation loss reached by the weights being resumed.
    pub prior_valid_loss: Option<f64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 30,
            save_full_model: false,
            resume_from: None,
            custom_checkpoint: None,
            prior_valid_loss: None,
        }
    }
}

impl TrainingConfig {
    /// A custom checkpoint takes precedence over a resumed one.
    pub fn start_point(&self) -> StartPoint {
        match (&self.custom_checkpoint, &self.resume_from) {
            (Some(path), _) => StartPoint::Custom {
                path: path.clone(),
                valid_loss: self.prior_valid_loss,
            },
            (None, Some(path)) => StartPoint::Previous {
                path: path.clone(),
                valid_loss: self.prior_valid_loss,
            },
            (None, None) => StartPoint::Fresh,
        }
    }
}

/// Where the weights of a run come from.
#[derive(Debug, Clone, PartialEq)]
pub enum StartPoint {
    Fresh,
    Previous {
        path: PathBuf,
        valid_loss: Option<f64>,
    },
    Custom {
        path: PathBuf,
        valid_loss: Option<f64>,
    },
}

impl StartPoint {
    /// Weight file the run starts from, if any.
    pub fn weights_path(&self) -> Option<&Path> {
        match self {
            StartPoint::Fresh => None,
            StartPoint::Previous { path, .. } | StartPoint::Custom { path, .. } => Some(path),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub history: History,
    pub improvements: usize,
    pub best_valid_loss: f64,
    pub best_learning_rate: f64,
    pub checkpoint: PathBuf,
    pub test: TestReport,
    pub full_model: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(Box<TrainReport>),
    /// No epoch improved on the starting loss; every artifact was removed.
    NoImprovement { history: History },
    Interrupted { saved: bool, history: History },
}

/// One experiment's report, artifact layout and cleanup.
///
/// Opening an experiment writes the header block of the report. Setup steps
/// run through the methods here so that a failure removes the partial
/// report before the error is returned.
pub struct Experiment {
    paths: ExperimentPaths,
    log: ExperimentLog,
    cleanup: ArtifactCleanup,
    model: String,
}

impl Experiment {
    pub fn open(
        performance_dir: &Path,
        id: u32,
        model: &str,
        dataset_dir: &Path,
    ) -> Result<Self, TrainingError> {
        for dir in [performance_dir, dataset_dir] {
            if !dir.is_dir() {
                return Err(ExperimentError::DirNotFound(dir.to_path_buf()).into());
            }
        }

        let paths = ExperimentPaths::new(performance_dir, id);
        let log = ExperimentLog::new(&paths);
        let dataset_name = dataset_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| dataset_dir.display().to_string());
        log.append(
            &[
                BANNER.to_string(),
                format!("\tModel Data for experiment: {id}"),
                format!("\tModel Trained: {model}"),
                format!("\tData set used: {dataset_name}"),
                BANNER.to_string(),
            ],
            true,
        )?;
        info!(experiment = id, model, log = %log.path().display(), "experiment opened");

        Ok(Experiment {
            cleanup: ArtifactCleanup::new(performance_dir),
            paths,
            log,
            model: model.to_string(),
        })
    }

    pub fn id(&self) -> u32 {
        self.paths.id()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn paths(&self) -> &ExperimentPaths {
        &self.paths
    }

    pub fn log(&self) -> &ExperimentLog {
        &self.log
    }

    pub fn checkpoints(&self) -> CheckpointManager {
        CheckpointManager::new(self.paths.clone(), self.model.clone())
    }

    /// Remove the partial report (metrics are kept) and hand back `err`.
    pub fn fail(&self, err: impl Into<TrainingError>) -> TrainingError {
        let err = err.into();
        warn!(experiment = self.id(), error = %err, "setup failed, removing experiment report");
        if let Err(purge_err) = self.cleanup.purge(self.id(), false) {
            warn!(error = %purge_err, "cleanup after failed setup did not complete");
        }
        err
    }

    /// Remove every artifact of the experiment: metrics, report, checkpoint.
    ///
    /// The checkpoint survives when it is the file at `keep`, the weights the
    /// run was started from.
    pub fn purge_all(&self, keep: Option<&Path>) -> Result<(), TrainingError> {
        self.cleanup.purge(self.id(), true)?;
        let weights = self.checkpoints().weights_path();
        if keep.is_some_and(|path| same_weights_file(path, &weights)) {
            info!(path = %weights.display(), "keeping the checkpoint the run started from");
        } else {
            self.cleanup.purge_checkpoints(self.id(), &self.model)?;
        }
        Ok(())
    }

    /// Remove every artifact after a failure past setup and hand back `err`.
    pub fn abort(&self, err: TrainingError, keep: Option<&Path>) -> TrainingError {
        warn!(experiment = self.id(), error = %err, "run failed, removing experiment artifacts");
        if let Err(purge_err) = self.purge_all(keep) {
            warn!(error = %purge_err, "cleanup after failed run did not complete");
        }
        err
    }

    /// Load the dataset and record its size in the report.
    pub fn load_data(&self, config: &DataConfig) -> Result<LoadedData, TrainingError> {
        let data = data::load(config).map_err(|e| self.fail(e))?;
        self.log.append(
            &[
                format!("Number of Training Examples: {}", data.train.len()),
                format!("Number of Testing Examples: {}", data.test.len()),
                format!("Number of classes: {}", data.num_classes()),
            ],
            true,
        )?;
        Ok(data)
    }

    /// Record the head size; a head that cannot be built fails the setup.
    pub fn record_head(
        &self,
        head_layers: usize,
        hidden: Result<Vec<usize>, ConfigError>,
    ) -> Result<Vec<usize>, TrainingError> {
        self.log
            .append_line(&format!("Number of Fully connected layers: {head_layers}"))?;
        hidden.map_err(|e| self.fail(e))
    }

    pub fn configure_optimization(&self, config: &OptimConfig) -> Result<Optimization, TrainingError> {
        optim::configure(config, &self.log).map_err(|e| self.fail(e))
    }
}

/// Drives the epochs of one experiment over any [`Learner`].
pub struct Trainer<'a> {
    experiment: &'a Experiment,
    epochs: usize,
    start: StartPoint,
    save_full_model: bool,
}

impl<'a> Trainer<'a> {
    pub fn new(experiment: &'a Experiment, config: &TrainingConfig) -> Self {
        Trainer {
            experiment,
            epochs: config.epochs,
            start: config.start_point(),
            save_full_model: config.save_full_model,
        }
    }

    pub fn with_start(mut self, start: StartPoint) -> Self {
        self.start = start;
        self
    }

    /// Train, validate and checkpoint for the configured number of epochs,
    /// then test the best-so-far model.
    pub fn run<L: Learner>(
        &self,
        learner: &mut L,
        scheduler: &mut dyn LrScheduler,
        cancel: &CancellationToken,
        on_interrupt: &mut dyn InterruptHandler,
    ) -> Result<RunOutcome, TrainingError> {
        let best = self.begin(learner)?;
        self.train_from(best, learner, scheduler, cancel, on_interrupt)
            .map_err(|e| self.experiment.abort(e, self.start.weights_path()))
    }

    fn train_from<L: Learner>(
        &self,
        mut best: f64,
        learner: &mut L,
        scheduler: &mut dyn LrScheduler,
        cancel: &CancellationToken,
        on_interrupt: &mut dyn InterruptHandler,
    ) -> Result<RunOutcome, TrainingError> {
        let experiment = self.experiment;
        let log = experiment.log();

        let mut scalars = ScalarWriter::create(&experiment.paths().model_stats_dir())?;
        let checkpoints = experiment.checkpoints();
        let mut history = History::new();
        let mut timer = EpochTimer::new();
        let mut improvements = 0;
        let mut best_lr = scheduler.lr();
        let mut last_lr = scheduler.lr();

        info!(
            experiment = experiment.id(),
            epochs = self.epochs,
            train = learner.num_train(),
            "training started"
        );

        for epoch in 1..=self.epochs {
            if cancel.is_cancelled() {
                drop(scalars);
                return self.interrupted(learner, &checkpoints, epoch - 1, last_lr, best, history, on_interrupt);
            }

            let lr = scheduler.lr();
            last_lr = lr;
            scalars.add_scalar(SCALAR_LR, lr, epoch)?;

            timer.start();
            let train_loss = match learner.train_epoch(lr, cancel)? {
                Pass::Completed(loss) => loss,
                Pass::Interrupted => {
                    drop(scalars);
                    return self.interrupted(learner, &checkpoints, epoch - 1, lr, best, history, on_interrupt);
                }
            };
            timer.finish_train();

            let valid_loss = match learner.validate_epoch(cancel)? {
                Pass::Completed(loss) => loss,
                Pass::Interrupted => {
                    drop(scalars);
                    return self.interrupted(learner, &checkpoints, epoch - 1, lr, best, history, on_interrupt);
                }
            };
            timer.finish_valid();

            scalars.add_scalar(SCALAR_TRAIN_LOSS, train_loss, epoch)?;
            scalars.add_scalar(SCALAR_VALID_LOSS, valid_loss, epoch)?;
            history.record_epoch(train_loss, valid_loss, lr);
            scheduler.step(valid_loss);

            info!(
                epoch,
                train_loss,
                valid_loss,
                lr,
                train_secs = timer.train_time().as_secs(),
                valid_secs = timer.valid_time().as_secs(),
                "epoch complete"
            );

            if valid_loss <= best {
                info!(previous = best, current = valid_loss, "validation loss decreased, saving model");
                let metadata = CheckpointMetadata {
                    experiment_id: experiment.id(),
                    model: experiment.model().to_string(),
                    epoch,
                    valid_loss: Some(valid_loss),
                    learning_rate: lr,
                    timestamp: unix_timestamp(),
                    classes: learner.classes().to_vec(),
                    interrupted: false,
                };
                learner.save_checkpoint(&checkpoints, &metadata)?;

                if improvements == 0 {
                    log.append(
                        &[
                            format!("{TAG_PREVIOUS_MIN}: {best}"),
                            format!("{TAG_MIN_VALID}: {valid_loss}"),
                        ],
                        true,
                    )?;
                    log.append_tagged(TAG_BEST_LR, lr, false)?;
                } else {
                    log.replace_tagged(TAG_PREVIOUS_MIN, best)?;
                    log.replace_tagged(TAG_MIN_VALID, valid_loss)?;
                    log.replace_tagged(TAG_BEST_LR, lr)?;
                }
                best = valid_loss;
                best_lr = lr;
                improvements += 1;
            }

            debug!(eta_secs = timer.eta(self.epochs - epoch).as_secs(), "estimated time left");
        }
        scalars.flush()?;
        drop(scalars);

        if improvements == 0 {
            warn!(experiment = experiment.id(), "no improvement over the starting loss, removing experiment");
            experiment.purge_all(self.start.weights_path())?;
            return Ok(RunOutcome::NoImprovement { history });
        }

        info!("testing");
        let test = learner.test()?;
        if cancel.is_cancelled() {
            warn!("stop requested during the test pass, the run was completed");
        }
        self.write_test_report(learner.classes(), &test)?;

        let full_model = if self.save_full_model {
            Some(learner.save_full_model(experiment.paths())?)
        } else {
            None
        };

        Ok(RunOutcome::Completed(Box::new(TrainReport {
            history,
            improvements,
            best_valid_loss: best,
            best_learning_rate: best_lr,
            checkpoint: checkpoints.weights_path(),
            test,
            full_model,
        })))
    }

    /// Resolve the start point: load weights and pick the loss to beat.
    fn begin<L: Learner>(&self, learner: &mut L) -> Result<f64, TrainingError> {
        let experiment = self.experiment;
        let (path, valid_loss, line) = match &self.start {
            StartPoint::Fresh => {
                experiment.log().append_line("Trained From beginning")?;
                info!("training from the beginning");
                return Ok(f64::INFINITY);
            }
            StartPoint::Custom { path, valid_loss } => (
                path,
                valid_loss,
                format!("Model Loaded from Custom path: {}", path.display()),
            ),
            StartPoint::Previous { path, valid_loss } => (
                path,
                valid_loss,
                format!("Model Loaded from previous checkpoint: {}", path.display()),
            ),
        };

        let Some(valid_loss) = *valid_loss else {
            return Err(experiment.fail(ConfigError::MissingPriorLoss(path.clone())));
        };
        learner.load_weights(path).map_err(|e| experiment.fail(e))?;
        experiment.log().append_line(&line)?;
        info!(path = %path.display(), prior_valid_loss = valid_loss, "resuming from saved weights");
        Ok(valid_loss)
    }

    #[allow(clippy::too_many_arguments)]
    fn interrupted<L: Learner>(
        &self,
        learner: &mut L,
        checkpoints: &CheckpointManager,
        epoch: usize,
        lr: f64,
        best: f64,
        history: History,
        on_interrupt: &mut dyn InterruptHandler,
    ) -> Result<RunOutcome, TrainingError> {
        let experiment = self.experiment;
        warn!(experiment = experiment.id(), epoch, "training interrupted");

        match on_interrupt.decide() {
            SaveDecision::Save => {
                let metadata = CheckpointMetadata {
                    experiment_id: experiment.id(),
                    model: experiment.model().to_string(),
                    epoch,
                    valid_loss: best.is_finite().then_some(best),
                    learning_rate: lr,
                    timestamp: unix_timestamp(),
                    classes: learner.classes().to_vec(),
                    interrupted: true,
                };
                learner.save_checkpoint(checkpoints, &metadata)?;
                experiment.log().append_line("Training interrupted.")?;
                Ok(RunOutcome::Interrupted {
                    saved: true,
                    history,
                })
            }
            SaveDecision::Discard => {
                experiment.purge_all(self.start.weights_path())?;
                Ok(RunOutcome::Interrupted {
                    saved: false,
                    history,
                })
            }
        }
    }

    fn write_test_report(&self, classes: &[String], test: &TestReport) -> Result<(), TrainingError> {
        let log = self.experiment.log();
        let k = test.accuracy.k();

        info!(loss = test.loss, "test loss");
        log.append_line(&format!("Testing loss: {}", test.loss))?;

        for class in test.accuracy.per_class() {
            let name = classes
                .get(class.class)
                .map(String::as_str)
                .unwrap_or("?");
            match (class.top1, class.topk) {
                (Some(top1), Some(topk)) => {
                    info!(class = name, top1, topk, total = class.total, "class accuracy");
                    log.append(
                        &[
                            format!("Top-1 Accuracy of class {name} : {top1}"),
                            format!("Top-{k} Accuracy of class {name} : {topk}"),
                        ],
                        true,
                    )?;
                }
                _ => info!(class = name, "no test examples for class"),
            }
        }

        let overall_top1 = test.accuracy.overall_top1().unwrap_or(0.0);
        let overall_topk = test.accuracy.overall_topk().unwrap_or(0.0);
        info!(top1 = overall_top1, topk = overall_topk, "overall test accuracy");
        log.append(
            &[
                format!("Overall Top-1 accuracy : {overall_top1}"),
                format!("Overall Top-{k} accuracy: {overall_topk}"),
            ],
            false,
        )?;
        Ok(())
    }
}

/// Whether `path`, as given for loading, names the record at `weights`.
fn same_weights_file(path: &Path, weights: &Path) -> bool {
    let path = path.with_extension("mpk");
    match (fs::canonicalize(&path), fs::canonicalize(weights)) {
        (Ok(a), Ok(b)) => a == b,
        _ => path == weights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::fs;

    use crate::experiment::{ScalarEvent, SEPARATOR};
    use crate::optim::PlateauScheduler;
    use crate::training::accuracy::TopKAccuracy;

    /// Replays fixed losses; checkpoint writes go to real files.
    struct ScriptedLearner {
        classes: Vec<String>,
        train_losses: VecDeque<f64>,
        valid_losses: VecDeque<f64>,
        interrupt_on_epoch: Option<usize>,
        fail_test: bool,
        epoch: usize,
        saves: Cell<usize>,
        loaded: Vec<PathBuf>,
    }

    impl ScriptedLearner {
        fn new(valid_losses: &[f64]) -> Self {
            ScriptedLearner {
                classes: vec!["cat".into(), "dog".into(), "owl".into()],
                train_losses: valid_losses.iter().map(|l| l + 0.1).collect(),
                valid_losses: valid_losses.iter().copied().collect(),
                interrupt_on_epoch: None,
                fail_test: false,
                epoch: 0,
                saves: Cell::new(0),
                loaded: Vec::new(),
            }
        }
    }

    impl Learner for ScriptedLearner {
        fn classes(&self) -> &[String] {
            &self.classes
        }

        fn num_train(&self) -> usize {
            12
        }

        fn num_test(&self) -> usize {
            3
        }

        fn train_epoch(&mut self, _lr: f64, cancel: &CancellationToken) -> Result<Pass, TrainingError> {
            self.epoch += 1;
            if self.interrupt_on_epoch == Some(self.epoch) {
                cancel.cancel();
                return Ok(Pass::Interrupted);
            }
            Ok(Pass::Completed(self.train_losses.pop_front().unwrap()))
        }

        fn validate_epoch(&mut self, _cancel: &CancellationToken) -> Result<Pass, TrainingError> {
            Ok(Pass::Completed(self.valid_losses.pop_front().unwrap()))
        }

        fn test(&mut self) -> Result<TestReport, TrainingError> {
            if self.fail_test {
                return Err(TrainingError::EmptySource("test set"));
            }
            let mut accuracy = TopKAccuracy::new(self.classes.len(), 5);
            accuracy.record(&[0.7, 0.2, 0.1], 0);
            accuracy.record(&[0.7, 0.2, 0.1], 1);
            Ok(TestReport {
                loss: 0.25,
                accuracy,
            })
        }

        fn load_weights(&mut self, path: &Path) -> Result<(), TrainingError> {
            self.loaded.push(path.to_path_buf());
            Ok(())
        }

        fn save_checkpoint(
            &self,
            checkpoints: &CheckpointManager,
            metadata: &CheckpointMetadata,
        ) -> Result<PathBuf, TrainingError> {
            let path = checkpoints.weights_path();
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, format!("epoch {}", metadata.epoch)).unwrap();
            fs::write(
                checkpoints.metadata_path(),
                serde_json::to_string(metadata).unwrap(),
            )
            .unwrap();
            self.saves.set(self.saves.get() + 1);
            Ok(path)
        }

        fn save_full_model(&self, paths: &ExperimentPaths) -> Result<PathBuf, TrainingError> {
            let path = paths.whole_model_stem().with_extension("mpk");
            fs::create_dir_all(paths.whole_model_dir()).unwrap();
            fs::write(&path, "model").unwrap();
            Ok(path)
        }
    }

    struct Fixture {
        root: tempfile::TempDir,
        dataset: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                root: tempfile::tempdir().unwrap(),
                dataset: tempfile::tempdir().unwrap(),
            }
        }

        fn open(&self, id: u32) -> Experiment {
            Experiment::open(self.root.path(), id, "resnet18", self.dataset.path()).unwrap()
        }
    }

    fn epochs(n: usize) -> TrainingConfig {
        TrainingConfig {
            epochs: n,
            ..Default::default()
        }
    }

    fn never_asked() -> SaveDecision {
        panic!("interrupt handler called without an interruption")
    }

    fn run(
        experiment: &Experiment,
        config: &TrainingConfig,
        learner: &mut ScriptedLearner,
    ) -> RunOutcome {
        let mut scheduler = PlateauScheduler::new(0.01, 0.1, 1e-4, 5);
        let mut handler = never_asked;
        Trainer::new(experiment, config)
            .run(learner, &mut scheduler, &CancellationToken::new(), &mut handler)
            .unwrap()
    }

    #[test]
    fn test_header_block() {
        let fx = Fixture::new();
        let experiment = fx.open(7);
        let text = experiment.log().read().unwrap();
        let dataset_name = fx.dataset.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(text.starts_with(&format!(
            "{BANNER}\n\tModel Data for experiment: 7\n\tModel Trained: resnet18\n\tData set used: {dataset_name}\n{BANNER}\n"
        )));
    }

    #[test]
    fn test_refuses_missing_directories() {
        let fx = Fixture::new();
        let missing = fx.root.path().join("nope");
        let err = Experiment::open(&missing, 1, "resnet18", fx.dataset.path()).err().unwrap();
        assert!(matches!(err, TrainingError::Experiment(ExperimentError::DirNotFound(p)) if p == missing));

        let err = Experiment::open(fx.root.path(), 1, "resnet18", &missing).err().unwrap();
        assert!(matches!(err, TrainingError::Experiment(ExperimentError::DirNotFound(_))));
    }

    #[test]
    fn test_improvement_then_replace() {
        let fx = Fixture::new();
        let experiment = fx.open(3);
        let mut learner = ScriptedLearner::new(&[0.8, 0.5]);

        let outcome = run(&experiment, &epochs(2), &mut learner);
        let RunOutcome::Completed(report) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(learner.saves.get(), 2);
        assert_eq!(report.improvements, 2);
        assert_eq!(report.best_valid_loss, 0.5);
        assert_eq!(report.history.valid_losses, vec![0.8, 0.5]);

        let log = experiment.log();
        assert_eq!(log.tagged_value(TAG_MIN_VALID).unwrap().as_deref(), Some("0.5"));
        assert_eq!(log.tagged_value(TAG_PREVIOUS_MIN).unwrap().as_deref(), Some("0.8"));
        let records = log.records().unwrap();
        let count = |tag: &str| records.iter().filter(|r| r.starts_with(tag)).count();
        assert_eq!(count(TAG_MIN_VALID), 1);
        assert_eq!(count(TAG_PREVIOUS_MIN), 1);
        assert_eq!(count(TAG_BEST_LR), 1);

        let metadata = experiment.checkpoints().read_metadata().unwrap();
        assert_eq!(metadata.epoch, 2);
        assert_eq!(metadata.valid_loss, Some(0.5));
    }

    #[test]
    fn test_equal_loss_counts_as_improvement() {
        let fx = Fixture::new();
        let experiment = fx.open(3);
        let mut learner = ScriptedLearner::new(&[0.5, 0.6, 0.5]);

        let RunOutcome::Completed(report) = run(&experiment, &epochs(3), &mut learner) else {
            panic!("expected a completed run");
        };
        assert_eq!(report.improvements, 2);
        assert_eq!(learner.saves.get(), 2);
    }

    #[test]
    fn test_test_report_lines() {
        let fx = Fixture::new();
        let experiment = fx.open(5);
        let mut learner = ScriptedLearner::new(&[0.8]);
        run(&experiment, &epochs(1), &mut learner);

        let text = experiment.log().read().unwrap();
        assert!(text.contains("Testing loss: 0.25\n"));
        assert!(text.contains("Top-1 Accuracy of class cat : 100\nTop-3 Accuracy of class cat : 100\n"));
        assert!(text.contains("Top-1 Accuracy of class dog : 0\n"));
        assert!(!text.contains("class owl"));
        assert!(text.contains("Overall Top-1 accuracy : 50\n"));
        assert!(text.contains("Overall Top-3 accuracy: 100\n"));
    }

    #[test]
    fn test_scalars_written_per_epoch() {
        let fx = Fixture::new();
        let experiment = fx.open(2);
        let mut learner = ScriptedLearner::new(&[0.9, 0.7]);
        run(&experiment, &epochs(2), &mut learner);

        let path = experiment.paths().model_stats_dir().join(ScalarWriter::FILE_NAME);
        let events = ScalarWriter::read_events(&path).unwrap();
        let valid: Vec<&ScalarEvent> = events.iter().filter(|e| e.tag == SCALAR_VALID_LOSS).collect();
        assert_eq!(valid.len(), 2);
        assert_eq!(valid[1].value, 0.7);
        assert_eq!(events.iter().filter(|e| e.tag == SCALAR_LR).count(), 2);
    }

    #[test]
    fn test_no_improvement_removes_everything() {
        let fx = Fixture::new();
        let experiment = fx.open(4);
        let mut learner = ScriptedLearner::new(&[0.9, 0.8]);
        let start = StartPoint::Custom {
            path: PathBuf::from("weights/custom.mpk"),
            valid_loss: Some(0.1),
        };

        let mut scheduler = PlateauScheduler::new(0.01, 0.1, 1e-4, 5);
        let mut handler = never_asked;
        let outcome = Trainer::new(&experiment, &epochs(2))
            .with_start(start)
            .run(&mut learner, &mut scheduler, &CancellationToken::new(), &mut handler)
            .unwrap();

        assert!(matches!(outcome, RunOutcome::NoImprovement { .. }));
        assert_eq!(learner.saves.get(), 0);
        assert_eq!(learner.loaded, vec![PathBuf::from("weights/custom.mpk")]);
        assert!(matches!(
            experiment.log().read(),
            Err(ExperimentError::LogNotFound(_))
        ));
        assert!(!experiment.paths().model_stats_dir().exists());
    }

    #[test]
    fn test_resume_without_prior_loss() {
        let fx = Fixture::new();
        let experiment = fx.open(6);
        let mut learner = ScriptedLearner::new(&[0.5]);
        let mut scheduler = PlateauScheduler::new(0.01, 0.1, 1e-4, 5);
        let mut handler = never_asked;

        let err = Trainer::new(&experiment, &epochs(1))
            .with_start(StartPoint::Previous {
                path: PathBuf::from("Checkpoints/resnet18_5.mpk"),
                valid_loss: None,
            })
            .run(&mut learner, &mut scheduler, &CancellationToken::new(), &mut handler)
            .unwrap_err();

        assert!(matches!(err, TrainingError::Config(ConfigError::MissingPriorLoss(_))));
        assert!(learner.loaded.is_empty());
        assert!(!experiment.log().exists());
    }

    #[test]
    fn test_unsupported_optimizer_purges_before_training() {
        let fx = Fixture::new();
        let experiment = fx.open(9);
        let config = OptimConfig {
            optimizer: "rmsprop".into(),
            ..Default::default()
        };

        let err = experiment.configure_optimization(&config).unwrap_err();
        assert!(matches!(
            err,
            TrainingError::Config(ConfigError::UnsupportedOptimizer(name)) if name == "rmsprop"
        ));
        assert!(!experiment.log().exists());
        assert!(!experiment.checkpoints().exists());
    }

    #[test]
    fn test_missing_hidden_sizes_purge_report() {
        let fx = Fixture::new();
        let experiment = fx.open(8);
        let hidden = Err(ConfigError::FeaturesNotProvided {
            layers: 2,
            given: 0,
            needed: 1,
        });
        let err = experiment.record_head(2, hidden).unwrap_err();
        assert!(matches!(err, TrainingError::Config(ConfigError::FeaturesNotProvided { .. })));
        assert!(!experiment.log().exists());
    }

    #[test]
    fn test_interrupt_and_save() {
        let fx = Fixture::new();
        let experiment = fx.open(11);
        let mut learner = ScriptedLearner::new(&[0.8, 0.7, 0.6]);
        learner.interrupt_on_epoch = Some(2);

        let mut scheduler = PlateauScheduler::new(0.01, 0.1, 1e-4, 5);
        let mut handler = || SaveDecision::Save;
        let outcome = Trainer::new(&experiment, &epochs(3))
            .run(&mut learner, &mut scheduler, &CancellationToken::new(), &mut handler)
            .unwrap();

        let RunOutcome::Interrupted { saved, history } = outcome else {
            panic!("expected an interrupted run");
        };
        assert!(saved);
        assert_eq!(history.epochs(), 1);
        assert_eq!(learner.saves.get(), 2);

        let records = experiment.log().records().unwrap();
        assert_eq!(records.last().map(String::as_str), Some("Training interrupted."));
        let metadata = experiment.checkpoints().read_metadata().unwrap();
        assert!(metadata.interrupted);
        assert_eq!(metadata.valid_loss, Some(0.8));
    }

    #[test]
    fn test_interrupt_and_discard() {
        let fx = Fixture::new();
        let experiment = fx.open(12);
        let mut learner = ScriptedLearner::new(&[0.8, 0.7]);
        learner.interrupt_on_epoch = Some(2);

        let mut scheduler = PlateauScheduler::new(0.01, 0.1, 1e-4, 5);
        let mut handler = || SaveDecision::Discard;
        let outcome = Trainer::new(&experiment, &epochs(2))
            .run(&mut learner, &mut scheduler, &CancellationToken::new(), &mut handler)
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Interrupted { saved: false, .. }));
        assert!(!experiment.log().exists());
        assert!(!experiment.checkpoints().exists());
        assert!(!experiment.paths().model_stats_dir().exists());
    }

    #[test]
    fn test_cancelled_before_first_epoch() {
        let fx = Fixture::new();
        let experiment = fx.open(13);
        let mut learner = ScriptedLearner::new(&[0.8]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut scheduler = PlateauScheduler::new(0.01, 0.1, 1e-4, 5);
        let mut handler = || SaveDecision::Save;
        let outcome = Trainer::new(&experiment, &epochs(1))
            .run(&mut learner, &mut scheduler, &cancel, &mut handler)
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Interrupted { saved: true, .. }));
        assert_eq!(learner.epoch, 0);
        assert_eq!(experiment.checkpoints().read_metadata().unwrap().valid_loss, None);
    }

    #[test]
    fn test_full_model_saved_on_request() {
        let fx = Fixture::new();
        let experiment = fx.open(14);
        let mut learner = ScriptedLearner::new(&[0.4]);
        let config = TrainingConfig {
            epochs: 1,
            save_full_model: true,
            ..Default::default()
        };
        let RunOutcome::Completed(report) = run(&experiment, &config, &mut learner) else {
            panic!("expected a completed run");
        };
        let path = report.full_model.unwrap();
        assert!(path.ends_with("whole_model/Complete_model_14.mpk"));
        assert!(path.exists());
    }

    #[test]
    fn test_best_record_layout() {
        let fx = Fixture::new();
        let experiment = fx.open(15);
        let mut learner = ScriptedLearner::new(&[0.8, 0.5]);
        run(&experiment, &epochs(2), &mut learner);

        let text = experiment.log().read().unwrap();
        assert!(text.contains(&format!(
            "{TAG_PREVIOUS_MIN}: 0.8\n{TAG_MIN_VALID}: 0.5\n{SEPARATOR}{TAG_BEST_LR}: 0.01\n{SEPARATOR}"
        )));
    }

    #[test]
    fn test_no_improvement_keeps_resumed_checkpoint() {
        let fx = Fixture::new();
        let experiment = fx.open(5);
        let resumed = experiment.checkpoints().weights_path();
        fs::create_dir_all(resumed.parent().unwrap()).unwrap();
        fs::write(&resumed, "best weights").unwrap();

        let mut learner = ScriptedLearner::new(&[0.9]);
        let mut scheduler = PlateauScheduler::new(0.01, 0.1, 1e-4, 5);
        let mut handler = never_asked;
        let outcome = Trainer::new(&experiment, &epochs(1))
            .with_start(StartPoint::Previous {
                path: resumed.clone(),
                valid_loss: Some(0.5),
            })
            .run(&mut learner, &mut scheduler, &CancellationToken::new(), &mut handler)
            .unwrap();

        assert!(matches!(outcome, RunOutcome::NoImprovement { .. }));
        assert!(!experiment.log().exists());
        assert_eq!(fs::read_to_string(&resumed).unwrap(), "best weights");
    }

    #[test]
    fn test_failure_after_training_removes_artifacts() {
        let fx = Fixture::new();
        let experiment = fx.open(16);
        let mut learner = ScriptedLearner::new(&[0.8]);
        learner.fail_test = true;

        let mut scheduler = PlateauScheduler::new(0.01, 0.1, 1e-4, 5);
        let mut handler = never_asked;
        let err = Trainer::new(&experiment, &epochs(1))
            .run(&mut learner, &mut scheduler, &CancellationToken::new(), &mut handler)
            .unwrap_err();

        assert!(matches!(err, TrainingError::EmptySource("test set")));
        assert_eq!(learner.saves.get(), 1);
        assert!(!experiment.log().exists());
        assert!(!experiment.checkpoints().exists());
        assert!(!experiment.paths().model_stats_dir().exists());
    }

    #[test]
    fn test_start_point_precedence() {
        let config = TrainingConfig {
            resume_from: Some(PathBuf::from("a.mpk")),
            custom_checkpoint: Some(PathBuf::from("b.mpk")),
            prior_valid_loss: Some(0.3),
            ..Default::default()
        };
        assert_eq!(
            config.start_point(),
            StartPoint::Custom {
                path: PathBuf::from("b.mpk"),
                valid_loss: Some(0.3)
            }
        );
        assert_eq!(TrainingConfig::default().start_point(), StartPoint::Fresh);
    }
}
