use std::time::{Duration, Instant};

/// Per-epoch losses and learning rates of one run.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct History {
    pub train_losses: Vec<f64>,
    pub valid_losses: Vec<f64>,
    pub learning_rates: Vec<f64>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_epoch(&mut self, train_loss: f64, valid_loss: f64, lr: f64) {
        self.train_losses.push(train_loss);
        self.valid_losses.push(valid_loss);
        self.learning_rates.push(lr);
    }

    pub fn epochs(&self) -> usize {
        self.valid_losses.len()
    }

    /// Lowest validation loss and the 1-based epoch it was reached in.
    pub fn best_epoch(&self) -> Option<(usize, f64)> {
        self.valid_losses
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, loss)| (i + 1, loss))
    }
}

/// Times the training and validation halves of each epoch.
pub struct EpochTimer {
    started: Instant,
    train: Duration,
    valid: Duration,
    completed: Vec<Duration>,
}

impl EpochTimer {
    pub fn new() -> Self {
        EpochTimer {
            started: Instant::now(),
            train: Duration::ZERO,
            valid: Duration::ZERO,
            completed: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.started = Instant::now();
    }

    pub fn finish_train(&mut self) {
        self.train = self.started.elapsed();
        self.started = Instant::now();
    }

    pub fn finish_valid(&mut self) {
        self.valid = self.started.elapsed();
        self.completed.push(self.train + self.valid);
    }

    pub fn train_time(&self) -> Duration {
        self.train
    }

    pub fn valid_time(&self) -> Duration {
        self.valid
    }

    /// Remaining time for `remaining` epochs at the pace of the last one.
    pub fn eta(&self, remaining: usize) -> Duration {
        self.completed
            .last()
            .map(|last| *last * remaining as u32)
            .unwrap_or_default()
    }
}

impl Default for EpochTimer {
    fn default() -> Self {
        Self::new()
    }
}
