//! Training: the epoch loop with its best-loss bookkeeping, the burn-backed
//! session that runs the passes, accuracy counters and cancellation.

pub mod accuracy;
pub mod cancel;
pub mod learner;
pub mod metrics;
pub mod orchestrator;
pub mod session;

pub use accuracy::{ClassAccuracy, TopKAccuracy};
pub use cancel::{CancellationToken, InterruptHandler, SaveDecision};
pub use learner::{Learner, Pass, TestReport};
pub use metrics::{EpochTimer, History};
pub use orchestrator::{
    Experiment, RunOutcome, StartPoint, TrainReport, Trainer, TrainingConfig, SCALAR_LR,
    SCALAR_TRAIN_LOSS, SCALAR_VALID_LOSS, TAG_BEST_LR, TAG_MIN_VALID, TAG_PREVIOUS_MIN,
};
pub use session::{run_experiment, TrainingSession, TOP_K};
