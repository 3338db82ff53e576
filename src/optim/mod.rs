//! Optimization configurator: optimizer and learning-rate schedule selection.
//!
//! The loss is multi-class cross-entropy, built by the training session.

mod optimizer;
mod scheduler;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConfigError, ExperimentError, TrainingError};
use crate::experiment::ExperimentLog;

pub use optimizer::ModelOptimizer;
pub use scheduler::{LrScheduler, PlateauScheduler, StepScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
    /// SGD with momentum.
    Sgd,
}

impl OptimizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerKind::Adam => "adam",
            OptimizerKind::Sgd => "sgd",
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "sgd" => Ok(OptimizerKind::Sgd),
            _ => Err(ConfigError::UnsupportedOptimizer(s.to_string())),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    ReduceOnPlateau,
    StepLr,
}

impl SchedulerKind {
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerKind::ReduceOnPlateau => "reduce_on_plateau",
            SchedulerKind::StepLr => "step_lr",
        }
    }
}

impl FromStr for SchedulerKind {
    type Err = ConfigError;

    /// Case and underscores are ignored, so `reduceOnPlateau` and `StepLR`
    /// parse too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "reduceonplateau" => Ok(SchedulerKind::ReduceOnPlateau),
            "steplr" => Ok(SchedulerKind::StepLr),
            _ => Err(ConfigError::UnsupportedScheduler(s.to_string())),
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optimizer and scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimConfig {
    pub optimizer: String,
    pub scheduler: String,
    pub learning_rate: f64,
    /// Plateau: multiplier applied to the learning rate.
    pub factor: f64,
    /// Plateau: relative improvement required to reset patience.
    pub threshold: f64,
    /// Plateau: epochs without improvement before reducing.
    pub patience: usize,
    /// Step: epochs between decays.
    pub step_size: usize,
    /// Step: decay multiplier.
    pub gamma: f64,
    /// SGD momentum; 0 disables it.
    pub momentum: f64,
}

impl Default for OptimConfig {
    fn default() -> Self {
        OptimConfig {
            optimizer: "sgd".to_string(),
            scheduler: "reduce_on_plateau".to_string(),
            learning_rate: 0.01,
            factor: 0.1,
            threshold: 1e-4,
            patience: 5,
            step_size: 30,
            gamma: 0.1,
            momentum: 0.9,
        }
    }
}

/// Resolved optimization choice.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimization {
    pub optimizer: OptimizerKind,
    pub scheduler: SchedulerKind,
    pub learning_rate: f64,
    pub momentum: f64,
    factor: f64,
    threshold: f64,
    patience: usize,
    step_size: usize,
    gamma: f64,
}

impl Optimization {
    /// Parse the configured names. Nothing is written on failure.
    pub fn resolve(config: &OptimConfig) -> Result<Self, ConfigError> {
        Ok(Optimization {
            optimizer: config.optimizer.parse()?,
            scheduler: config.scheduler.parse()?,
            learning_rate: config.learning_rate,
            momentum: config.momentum,
            factor: config.factor,
            threshold: config.threshold,
            patience: config.patience,
            step_size: config.step_size,
            gamma: config.gamma,
        })
    }

    pub fn build_scheduler(&self) -> Box<dyn LrScheduler> {
        match self.scheduler {
            SchedulerKind::ReduceOnPlateau => Box::new(PlateauScheduler::new(
                self.learning_rate,
                self.factor,
                self.threshold,
                self.patience,
            )),
            SchedulerKind::StepLr => Box::new(StepScheduler::new(
                self.learning_rate,
                self.step_size,
                self.gamma,
            )),
        }
    }

    /// Record the choice in the experiment report: names and starting rate as
    /// one block, then the scheduler's parameters as another.
    pub fn write_to(&self, log: &ExperimentLog) -> Result<(), ExperimentError> {
        log.append(
            &[
                format!("Optimizer name: {}", self.optimizer),
                format!("Scheduler name: {}", self.scheduler),
                format!("Starting Learning rate: {}", self.learning_rate),
            ],
            true,
        )?;

        let params = match self.scheduler {
            SchedulerKind::StepLr => vec![
                "StepLR scheduler Parameters:-".to_string(),
                format!("Step size: {}", self.step_size),
                format!("Gamma: {}", self.gamma),
            ],
            SchedulerKind::ReduceOnPlateau => vec![
                "reduceOnPlateau Scheduler parameters:-".to_string(),
                format!("Factor: {}", self.factor),
                format!("Threshold: {}", self.threshold),
                format!("Patience: {}", self.patience),
            ],
        };
        log.append(&params, true)?;

        info!(
            optimizer = %self.optimizer,
            scheduler = %self.scheduler,
            lr = self.learning_rate,
            "optimization configured"
        );
        Ok(())
    }
}

/// Resolve the optimization settings and record them in `log`.
pub fn configure(config: &OptimConfig, log: &ExperimentLog) -> Result<Optimization, TrainingError> {
    let optimization = Optimization::resolve(config)?;
    optimization.write_to(log)?;
    Ok(optimization)
}
