//! Interfaces to the external pieces the callbacks drive: the backbone
//! network, the partial-FC classification head, the verification routine,
//! and the mixed-precision loss scaler.

use crate::error::CallbackError;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// Train/eval mode of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelMode {
    Train,
    Eval,
}

/// Embedding network being trained.
pub trait Backbone {
    fn set_mode(&mut self, mode: ModelMode);

    fn mode(&self) -> ModelMode;

    /// Persist the network parameters to `path`. The on-disk format belongs
    /// to the implementation.
    fn save_params(&self, path: &Path) -> Result<(), CallbackError>;
}

/// Trainable classification layer; owns where and how its state is stored.
pub trait ClassificationHead {
    fn save_params(&mut self) -> Result<(), CallbackError>;
}

/// Result of running one verification benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub accuracy: f64,
    pub accuracy_std: f64,
    /// Accuracy with horizontally flipped embeddings summed in.
    pub flip_accuracy: f64,
    pub flip_accuracy_std: f64,
    /// Mean embedding norm over the benchmark.
    pub xnorm: f64,
}

/// Pair-matching verification routine.
pub trait Verifier {
    /// A preloaded benchmark (sample pairs plus same/different labels).
    type Dataset;

    fn load_bin(&self, path: &Path, image_size: [usize; 2]) -> Result<Self::Dataset, CallbackError>;

    fn test<B: Backbone + ?Sized>(
        &self,
        dataset: &Self::Dataset,
        backbone: &B,
        folds: usize,
        threads: usize,
    ) -> Result<VerificationOutcome, CallbackError>;
}

/// Source of the current dynamic loss-scale factor in reduced-precision training.
pub trait LossScaler {
    fn scale(&self) -> f64;
}

impl LossScaler for f64 {
    fn scale(&self) -> f64 {
        *self
    }
}

/// Holds a backbone in eval mode; puts it back in train mode when dropped.
///
/// Restoration covers a normal scope exit and an early `?` return, and also
/// a panic when the build unwinds. Builds with `panic = "abort"` (the
/// release profile) terminate without running the drop.
pub struct EvalModeGuard<'a, B: Backbone + ?Sized> {
    backbone: &'a mut B,
}

impl<'a, B: Backbone + ?Sized> EvalModeGuard<'a, B> {
    pub fn new(backbone: &'a mut B) -> Self {
        backbone.set_mode(ModelMode::Eval);
        Self { backbone }
    }
}

impl<B: Backbone + ?Sized> Deref for EvalModeGuard<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backbone
    }
}

impl<B: Backbone + ?Sized> DerefMut for EvalModeGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backbone
    }
}

impl<B: Backbone + ?Sized> Drop for EvalModeGuard<'_, B> {
    fn drop(&mut self) {
        self.backbone.set_mode(ModelMode::Train);
    }
}

/// Location of a benchmark file: `<dir>/<name>.bin`.
pub fn benchmark_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.bin"))
}
