//! Running-average loss tracking shared between the training loop and the
//! logging callback.

use serde::{Deserialize, Serialize};

/// Running mean the training loop feeds and the logging callback drains.
pub trait LossAccumulator {
    fn observe(&mut self, value: f64);

    fn mean(&self) -> f64;

    fn count(&self) -> u64;

    fn reset(&mut self);
}

/// Computes and stores the latest value and the running average.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageMeter {
    pub val: f64,
    pub avg: f64,
    pub sum: f64,
    pub count: u64,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `val` as the mean of `n` samples.
    pub fn update(&mut self, val: f64, n: u64) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
        if self.count > 0 {
            self.avg = self.sum / self.count as f64;
        }
    }
}

impl LossAccumulator for AverageMeter {
    fn observe(&mut self, value: f64) {
        self.update(value, 1);
    }

    fn mean(&self) -> f64 {
        self.avg
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
