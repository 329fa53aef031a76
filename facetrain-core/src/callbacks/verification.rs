//! Periodic evaluation on held-out verification benchmarks with
//! best-snapshot tracking.

use crate::callbacks::is_due;
use crate::collaborators::{Backbone, ClassificationHead, EvalModeGuard, Verifier, benchmark_path};
use crate::config::VerificationConfig;
use crate::error::CallbackError;
use crate::persist::{atomic_write_json, load_json};
use crate::role::ProcessRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Scores of one benchmark at one evaluation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub name: String,
    pub flip_accuracy: f64,
    pub flip_accuracy_std: f64,
    /// Best flip accuracy seen so far for this benchmark, this step included.
    pub highest: f64,
    pub xnorm: f64,
    /// The XNorm, Accuracy-Flip, and Accuracy-Highest lines, as logged.
    pub log_lines: Vec<String>,
}

/// Everything one evaluation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    pub step: u64,
    pub results: Vec<BenchmarkResult>,
    /// Benchmarks whose evaluation failed, with the error message.
    pub failures: Vec<(String, String)>,
    /// Sum of flip accuracies over the benchmarks evaluated this step.
    pub score: f64,
    /// Best score after this step.
    pub highest_score: f64,
    /// Snapshot written this step, if the score matched or beat the best.
    pub saved: Option<PathBuf>,
    /// The `Score / Score-Highest` line written to the log.
    pub summary: String,
}

/// Ledger entry for a best-scoring snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub step: u64,
    pub score: f64,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

struct LoadedBenchmark<D> {
    name: String,
    /// Index into the configured target list.
    slot: usize,
    dataset: D,
}

/// Runs every loaded benchmark each `frequent` steps on the coordinator and
/// keeps the backbone snapshot with the highest summed accuracy.
pub struct VerificationCallback<V: Verifier> {
    frequent: u64,
    role: ProcessRole,
    verifier: V,
    benchmarks: Vec<LoadedBenchmark<V::Dataset>>,
    targets: Vec<String>,
    highest_acc: Vec<f64>,
    highest_score: f64,
    best_snapshot_dir: PathBuf,
    folds: usize,
    threads: usize,
}

impl<V: Verifier> VerificationCallback<V> {
    pub const LEDGER_FILE: &'static str = "best_snapshots.json";

    /// Load `<rec_prefix>/<name>.bin` for each configured target. Missing
    /// files are skipped; workers load nothing.
    pub fn new(
        config: &VerificationConfig,
        role: ProcessRole,
        verifier: V,
    ) -> Result<Self, CallbackError> {
        let mut benchmarks = Vec::new();
        if role.is_coordinator() {
            for (slot, name) in config.targets.iter().enumerate() {
                let path = benchmark_path(&config.rec_prefix, name);
                if !path.exists() {
                    tracing::debug!(benchmark = %name, path = %path.display(), "Benchmark file not found, skipping");
                    continue;
                }
                let dataset = verifier.load_bin(&path, config.image_size)?;
                tracing::info!(benchmark = %name, "Loaded verification benchmark");
                benchmarks.push(LoadedBenchmark {
                    name: name.clone(),
                    slot,
                    dataset,
                });
            }
        }

        Ok(Self {
            frequent: config.frequent,
            role,
            verifier,
            benchmarks,
            targets: config.targets.clone(),
            highest_acc: vec![0.0; config.targets.len()],
            highest_score: 0.0,
            best_snapshot_dir: config.best_snapshot_dir.clone(),
            folds: config.folds,
            threads: config.threads,
        })
    }

    /// Names of the benchmarks that were found and loaded.
    pub fn benchmark_names(&self) -> Vec<&str> {
        self.benchmarks.iter().map(|b| b.name.as_str()).collect()
    }

    /// Best flip accuracy per configured target, in configuration order.
    pub fn highest_accuracies(&self) -> &[f64] {
        &self.highest_acc
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn highest_score(&self) -> f64 {
        self.highest_score
    }

    pub fn best_snapshot_dir(&self) -> &Path {
        &self.best_snapshot_dir
    }

    /// Read the best-snapshot ledger; empty if nothing has been saved yet.
    pub fn snapshot_history(&self) -> Result<Vec<SnapshotRecord>, CallbackError> {
        Ok(load_json(&self.best_snapshot_dir.join(Self::LEDGER_FILE))?.unwrap_or_default())
    }

    /// The classification head is accepted for parity with the other
    /// callbacks but is not persisted alongside best snapshots.
    pub fn evaluate_if_due<B: Backbone + ?Sized>(
        &mut self,
        step: u64,
        _head: Option<&mut dyn ClassificationHead>,
        backbone: &mut B,
    ) -> Result<Option<VerificationReport>, CallbackError> {
        if !self.role.is_coordinator() || !is_due(step, self.frequent) {
            return Ok(None);
        }

        let (results, failures) = {
            let guard = EvalModeGuard::new(backbone);
            self.run_benchmarks(step, &*guard)
        };

        let score = results.iter().fold(0.0, |acc, r| acc + r.flip_accuracy);
        let summary = format!(
            "[+][{step}]Score / Score-Highest: {score:2.5} / {:2.5}",
            self.highest_score
        );
        tracing::info!("{summary}");

        let mut saved = None;
        if !failures.is_empty() {
            tracing::warn!(
                step,
                failed = failures.len(),
                "Skipping best-snapshot comparison: score is incomplete"
            );
        } else if score >= self.highest_score {
            let path = self.save_best(step, score, backbone)?;
            self.highest_score = score;
            saved = Some(path);
        }

        Ok(Some(VerificationReport {
            step,
            results,
            failures,
            score,
            highest_score: self.highest_score,
            saved,
            summary,
        }))
    }

    fn run_benchmarks<B: Backbone + ?Sized>(
        &mut self,
        step: u64,
        backbone: &B,
    ) -> (Vec<BenchmarkResult>, Vec<(String, String)>) {
        let mut results = Vec::with_capacity(self.benchmarks.len());
        let mut failures = Vec::new();

        for bench in &self.benchmarks {
            let name = &bench.name;
            let outcome = match self.verifier.test(&bench.dataset, backbone, self.folds, self.threads) {
                Ok(o) => o,
                Err(e) => {
                    tracing::warn!(benchmark = %name, step, error = %e, "Verification failed");
                    failures.push((name.clone(), e.to_string()));
                    continue;
                }
            };

            let highest = &mut self.highest_acc[bench.slot];
            if outcome.flip_accuracy > *highest {
                *highest = outcome.flip_accuracy;
            }
            let log_lines = vec![
                format!("[{name}][{step}]XNorm: {:.6}", outcome.xnorm),
                format!(
                    "[{name}][{step}]Accuracy-Flip: {:1.5}+-{:1.5}",
                    outcome.flip_accuracy, outcome.flip_accuracy_std
                ),
                format!("[{name}][{step}]Accuracy-Highest: {:1.5}", *highest),
            ];
            for line in &log_lines {
                tracing::info!("{line}");
            }

            results.push(BenchmarkResult {
                name: name.clone(),
                flip_accuracy: outcome.flip_accuracy,
                flip_accuracy_std: outcome.flip_accuracy_std,
                highest: *highest,
                xnorm: outcome.xnorm,
                log_lines,
            });
        }

        (results, failures)
    }

    fn save_best<B: Backbone + ?Sized>(
        &self,
        step: u64,
        score: f64,
        backbone: &B,
    ) -> Result<PathBuf, CallbackError> {
        std::fs::create_dir_all(&self.best_snapshot_dir)?;
        let path = self.best_snapshot_dir.join(format!("backbone_{score}.pth"));
        backbone.save_params(&path)?;
        tracing::info!("Saved as best checkpoint to {}", path.display());

        let ledger = self.best_snapshot_dir.join(Self::LEDGER_FILE);
        let mut history: Vec<SnapshotRecord> = load_json(&ledger)?.unwrap_or_default();
        history.push(SnapshotRecord {
            step,
            score,
            path: path.clone(),
            created_at: Utc::now(),
        });
        atomic_write_json(&ledger, &history)?;

        Ok(path)
    }
}
