/// Learning-rate schedule stepped once per epoch with that epoch's
/// validation loss.
pub trait LrScheduler {
    /// Learning rate for the next epoch.
    fn lr(&self) -> f64;

    fn step(&mut self, valid_loss: f64);
}

/// Multiply the learning rate by `factor` once the validation loss has not
/// improved for more than `patience` epochs.
///
/// An epoch counts as an improvement when its loss is below
/// `best * (1 - threshold)` (relative threshold, minimising).
#[derive(Debug, Clone)]
pub struct PlateauScheduler {
    lr: f64,
    factor: f64,
    threshold: f64,
    patience: usize,
    best: f64,
    bad_epochs: usize,
}

/// Reductions smaller than this are ignored.
const MIN_LR_DELTA: f64 = 1e-8;

impl PlateauScheduler {
    pub fn new(lr: f64, factor: f64, threshold: f64, patience: usize) -> Self {
        PlateauScheduler {
            lr,
            factor,
            threshold,
            patience,
            best: f64::INFINITY,
            bad_epochs: 0,
        }
    }

    pub fn bad_epochs(&self) -> usize {
        self.bad_epochs
    }

    fn is_better(&self, loss: f64) -> bool {
        loss < self.best * (1.0 - self.threshold)
    }
}

impl LrScheduler for PlateauScheduler {
    fn lr(&self) -> f64 {
        self.lr
    }

    fn step(&mut self, valid_loss: f64) {
        if self.is_better(valid_loss) {
            self.best = valid_loss;
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
        }

        if self.bad_epochs > self.patience {
            let reduced = self.lr * self.factor;
            if self.lr - reduced > MIN_LR_DELTA {
                tracing::info!(from = self.lr, to = reduced, "reducing learning rate");
                self.lr = reduced;
            }
            self.bad_epochs = 0;
        }
    }
}

/// Decay the learning rate by `gamma` every `step_size` epochs.
#[derive(Debug, Clone)]
pub struct StepScheduler {
    initial_lr: f64,
    step_size: usize,
    gamma: f64,
    epoch: usize,
}

impl StepScheduler {
    pub fn new(lr: f64, step_size: usize, gamma: f64) -> Self {
        StepScheduler {
            initial_lr: lr,
            step_size: step_size.max(1),
            gamma,
            epoch: 0,
        }
    }
}

impl LrScheduler for StepScheduler {
    fn lr(&self) -> f64 {
        self.initial_lr * self.gamma.powi((self.epoch / self.step_size) as i32)
    }

    fn step(&mut self, _valid_loss: f64) {
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plateau_waits_for_patience() {
        let mut sched = PlateauScheduler::new(0.1, 0.5, 1e-4, 2);
        sched.step(1.0);
        assert_eq!(sched.lr(), 0.1);

        // Three epochs without improvement; reduction after the third.
        sched.step(1.0);
        sched.step(1.0);
        assert_eq!(sched.lr(), 0.1);
        assert_eq!(sched.bad_epochs(), 2);
        sched.step(1.0);
        assert!((sched.lr() - 0.05).abs() < 1e-12);
        assert_eq!(sched.bad_epochs(), 0);
    }

    #[test]
    fn test_plateau_relative_threshold() {
        let mut sched = PlateauScheduler::new(0.1, 0.1, 0.01, 0);
        sched.step(1.0);
        // Within 1% of the best: not an improvement, patience 0 reduces at once.
        sched.step(0.995);
        assert!((sched.lr() - 0.01).abs() < 1e-12);

        let mut sched = PlateauScheduler::new(0.1, 0.1, 0.01, 0);
        sched.step(1.0);
        sched.step(0.98);
        assert_eq!(sched.lr(), 0.1);
    }

    #[test]
    fn test_step_decay() {
        let mut sched = StepScheduler::new(1.0, 2, 0.1);
        let mut lrs = Vec::new();
        for _ in 0..5 {
            lrs.push(sched.lr());
            sched.step(0.0);
        }
        let expected = [1.0, 1.0, 0.1, 0.1, 0.01];
        for (lr, want) in lrs.iter().zip(expected) {
            assert!((lr - want).abs() < 1e-12, "{lr} != {want}");
        }
    }
}
