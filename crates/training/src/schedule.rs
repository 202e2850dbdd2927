//! Adversarial weight ramp and plateau learning-rate schedule.

use serde::{Deserialize, Serialize};

/// Weight of the reversed domain gradient for batch `i` of `epoch`.
///
/// `p = (i + epoch * len_train) / n_epochs / len_train` and
/// `alpha = 2 / (1 + exp(-10 p)) - 1`. Returns 0 when `n_epochs` or `len_train` is 0.
pub fn alpha_ramp(i: usize, epoch: usize, n_epochs: usize, len_train: usize) -> f64 {
    if n_epochs == 0 || len_train == 0 {
        return 0.0;
    }
    let p = (i as f64 + epoch as f64 * len_train as f64) / n_epochs as f64 / len_train as f64;
    let alpha = 2.0 / (1.0 + (-10.0 * p).exp()) - 1.0;
    alpha.clamp(0.0, 1.0 - f64::EPSILON)
}

/// Reduce the learning rate when a minimized metric stops improving.
///
/// Relative threshold mode: a value improves on `best` when it is below `best * (1 - threshold)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateauScheduler {
    lr: f64,
    factor: f64,
    patience: usize,
    threshold: f64,
    cooldown: usize,
    min_lr: f64,
    eps: f64,
    best: Option<f64>,
    num_bad_epochs: usize,
    cooldown_counter: usize,
}

impl PlateauScheduler {
    pub fn new(lr: f64, patience: usize, factor: f64) -> Self {
        Self {
            lr,
            factor,
            patience,
            threshold: 1e-4,
            cooldown: 0,
            min_lr: 0.0,
            eps: 1e-8,
            best: None,
            num_bad_epochs: 0,
            cooldown_counter: 0,
        }
    }

    pub fn with_cooldown(mut self, cooldown: usize) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_min_lr(mut self, min_lr: f64) -> Self {
        self.min_lr = min_lr;
        self
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn num_bad_epochs(&self) -> usize {
        self.num_bad_epochs
    }

    fn is_better(&self, metric: f64) -> bool {
        match self.best {
            None => true,
            Some(best) => metric < best * (1.0 - self.threshold),
        }
    }

    /// Feed one epoch's metric; returns the learning rate for the next epoch.
    pub fn step(&mut self, metric: f64) -> f64 {
        if metric.is_nan() {
            self.num_bad_epochs += 1;
        } else if self.is_better(metric) {
            self.best = Some(metric);
            self.num_bad_epochs = 0;
        } else {
            self.num_bad_epochs += 1;
        }

        if self.cooldown_counter > 0 {
            self.cooldown_counter -= 1;
            self.num_bad_epochs = 0;
        }

        if self.num_bad_epochs > self.patience {
            let new_lr = (self.lr * self.factor).max(self.min_lr);
            if self.lr - new_lr > self.eps {
                tracing::info!("reducing learning rate {:.3e} -> {:.3e}", self.lr, new_lr);
                self.lr = new_lr;
            }
            self.cooldown_counter = self.cooldown;
            self.num_bad_epochs = 0;
        }
        self.lr
    }
}
