//! Configuration for the training callbacks.
//!
//! Uses `figment` for layered configuration: defaults -> workspace config ->
//! explicit config file -> environment. The workspace file lives at
//! `<workspace>/.facetrain/config.toml`; environment variables use the
//! `FACETRAIN_` prefix with `__` as the section separator
//! (e.g. `FACETRAIN_ROLE__RANK=1`).

use crate::callbacks::checkpoint::SaveInterval;
use crate::error::CallbackError;
use crate::role::ProcessRole;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetrainConfig {
    #[serde(default)]
    pub role: RoleConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

/// Position of this process in the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default)]
    pub rank: usize,
    #[serde(default = "default_world_size")]
    pub world_size: usize,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            rank: 0,
            world_size: default_world_size(),
        }
    }
}

impl RoleConfig {
    pub fn role(&self) -> ProcessRole {
        ProcessRole::from_rank(self.rank)
    }
}

fn default_world_size() -> usize {
    1
}

/// Held-out benchmark evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Evaluate every `frequent` steps.
    #[serde(default = "default_verification_frequent")]
    pub frequent: u64,
    /// Benchmark names, each resolved to `<rec_prefix>/<name>.bin`.
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
    #[serde(default = "default_rec_prefix")]
    pub rec_prefix: PathBuf,
    #[serde(default = "default_image_size")]
    pub image_size: [usize; 2],
    /// Where best-scoring backbone snapshots are written.
    #[serde(default = "default_best_snapshot_dir")]
    pub best_snapshot_dir: PathBuf,
    #[serde(default = "default_folds")]
    pub folds: usize,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            frequent: default_verification_frequent(),
            targets: default_targets(),
            rec_prefix: default_rec_prefix(),
            image_size: default_image_size(),
            best_snapshot_dir: default_best_snapshot_dir(),
            folds: default_folds(),
            threads: default_threads(),
        }
    }
}

fn default_verification_frequent() -> u64 {
    2000
}

fn default_targets() -> Vec<String> {
    ["lfw", "cfp_fp", "agedb_30"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_rec_prefix() -> PathBuf {
    PathBuf::from("data")
}

fn default_image_size() -> [usize; 2] {
    [112, 112]
}

fn default_best_snapshot_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_folds() -> usize {
    10
}

fn default_threads() -> usize {
    10
}

/// Throughput and loss reporting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_frequent")]
    pub frequent: u64,
    /// Planned number of optimizer steps for the whole run.
    #[serde(default = "default_total_step")]
    pub total_step: u64,
    /// Per-process batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            frequent: default_logging_frequent(),
            total_step: default_total_step(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_logging_frequent() -> u64 {
    10
}

fn default_total_step() -> u64 {
    100_000
}

fn default_batch_size() -> usize {
    128
}

/// Model checkpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// No checkpoint is written at or below this step.
    #[serde(default = "default_warmup_steps")]
    pub warmup_steps: u64,
    /// Save period in steps; absent means every step past warm-up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            warmup_steps: default_warmup_steps(),
            interval: None,
        }
    }
}

impl CheckpointConfig {
    pub fn save_interval(&self) -> Result<SaveInterval, CallbackError> {
        SaveInterval::from_option(self.interval)
    }
}

fn default_output() -> PathBuf {
    PathBuf::from(".")
}

fn default_warmup_steps() -> u64 {
    100
}

impl FacetrainConfig {
    /// Reject settings that would make the step gates or ETA math meaningless.
    pub fn validate(&self) -> Result<(), CallbackError> {
        if self.role.world_size == 0 {
            return Err(CallbackError::invalid_input("world_size must be at least 1"));
        }
        if self.role.rank >= self.role.world_size {
            return Err(CallbackError::invalid_input(format!(
                "rank {} out of range for world_size {}",
                self.role.rank, self.role.world_size
            )));
        }
        if self.verification.frequent == 0 {
            return Err(CallbackError::invalid_input(
                "verification.frequent must be positive",
            ));
        }
        if self.logging.frequent == 0 {
            return Err(CallbackError::invalid_input("logging.frequent must be positive"));
        }
        if self.logging.total_step == 0 {
            return Err(CallbackError::invalid_input("logging.total_step must be positive"));
        }
        if self.logging.batch_size == 0 {
            return Err(CallbackError::invalid_input("logging.batch_size must be positive"));
        }
        self.checkpoint.save_interval()?;
        Ok(())
    }
}

/// Path of the workspace-local config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".facetrain").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `FACETRAIN_`)
/// 2. Explicit config file
/// 3. Workspace-local config (`.facetrain/config.toml`)
/// 4. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<FacetrainConfig, CallbackError> {
    let mut figment = Figment::from(Serialized::defaults(FacetrainConfig::default()));

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(file) = config_file {
        if !file.exists() {
            return Err(CallbackError::invalid_input(format!(
                "config file '{}' does not exist",
                file.display()
            )));
        }
        figment = figment.merge(Toml::file(file));
    }

    figment = figment.merge(Env::prefixed("FACETRAIN_").split("__"));

    let config: FacetrainConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}
