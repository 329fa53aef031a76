//! Periodic persistence of backbone and classification-head parameters.

use crate::callbacks::is_due;
use crate::collaborators::{Backbone, ClassificationHead};
use crate::config::CheckpointConfig;
use crate::error::CallbackError;
use crate::role::ProcessRole;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

/// How often a checkpoint is written once warm-up has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveInterval {
    EveryStep,
    Every(NonZeroU64),
}

impl SaveInterval {
    /// `None` maps to `EveryStep`; `Some(0)` is rejected.
    pub fn from_option(interval: Option<u64>) -> Result<Self, CallbackError> {
        match interval {
            None => Ok(Self::EveryStep),
            Some(n) => NonZeroU64::new(n)
                .map(Self::Every)
                .ok_or_else(|| CallbackError::invalid_input("checkpoint interval must be positive")),
        }
    }

    pub fn is_due(self, step: u64) -> bool {
        match self {
            Self::EveryStep => true,
            Self::Every(n) => is_due(step, n.get()),
        }
    }
}

/// What a `checkpoint_if_due` call wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointOutcome {
    pub backbone: Option<PathBuf>,
    pub head_saved: bool,
}

impl CheckpointOutcome {
    pub fn is_empty(&self) -> bool {
        self.backbone.is_none() && !self.head_saved
    }
}

/// Writes `<output>/backbone.pth` and asks the head to save itself.
///
/// Nothing is written at or below `warmup_steps`. The backbone file is only
/// written by the coordinator; the head is saved on every process since each
/// rank holds its own shard of it.
#[derive(Debug, Clone)]
pub struct CheckpointCallback {
    role: ProcessRole,
    output: PathBuf,
    warmup_steps: u64,
}

impl CheckpointCallback {
    pub const BACKBONE_FILE: &'static str = "backbone.pth";
    pub const DEFAULT_WARMUP_STEPS: u64 = 100;

    pub fn new(role: ProcessRole, output: impl Into<PathBuf>) -> Self {
        Self {
            role,
            output: output.into(),
            warmup_steps: Self::DEFAULT_WARMUP_STEPS,
        }
    }

    pub fn from_config(role: ProcessRole, config: &CheckpointConfig) -> Self {
        Self::new(role, config.output.clone()).with_warmup_steps(config.warmup_steps)
    }

    pub fn with_warmup_steps(mut self, warmup_steps: u64) -> Self {
        self.warmup_steps = warmup_steps;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn backbone_path(&self) -> PathBuf {
        self.output.join(Self::BACKBONE_FILE)
    }

    pub fn checkpoint_if_due<B: Backbone + ?Sized>(
        &self,
        step: u64,
        backbone: &B,
        head: Option<&mut dyn ClassificationHead>,
        interval: SaveInterval,
    ) -> Result<CheckpointOutcome, CallbackError> {
        let mut outcome = CheckpointOutcome::default();
        if step <= self.warmup_steps || !interval.is_due(step) {
            return Ok(outcome);
        }

        if self.role.is_coordinator() {
            std::fs::create_dir_all(&self.output)?;
            let path = self.backbone_path();
            backbone.save_params(&path)?;
            tracing::info!("Model saved in '{}'", path.display());
            outcome.backbone = Some(path);
        }

        if let Some(head) = head {
            head.save_params()?;
            tracing::debug!(step, "Classification head parameters saved");
            outcome.head_saved = true;
        }

        Ok(outcome)
    }
}
