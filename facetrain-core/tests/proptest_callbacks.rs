//! Property-based tests for the step gates and best-score tracking.

use facetrain_core::callbacks::{ManualClock, is_due};
use facetrain_core::config::VerificationConfig;
use facetrain_core::{
    AverageMeter, Backbone, CallbackError, CheckpointCallback, LoggingCallback, ModelMode,
    ProcessRole, SaveInterval, VerificationCallback, VerificationOutcome, Verifier,
};
use proptest::prelude::*;
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use tempfile::TempDir;

struct Net;

impl Backbone for Net {
    fn set_mode(&mut self, _mode: ModelMode) {}

    fn mode(&self) -> ModelMode {
        ModelMode::Train
    }

    fn save_params(&self, path: &Path) -> Result<(), CallbackError> {
        std::fs::write(path, b"w")?;
        Ok(())
    }
}

/// Returns the next queued accuracy for each benchmark (dataset = slot index).
struct QueueVerifier {
    queues: RefCell<Vec<Vec<f64>>>,
}

impl Verifier for QueueVerifier {
    type Dataset = usize;

    fn load_bin(&self, path: &Path, _image_size: [usize; 2]) -> Result<usize, CallbackError> {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        Ok(stem.trim_start_matches('b').parse().unwrap_or(0))
    }

    fn test<B: Backbone + ?Sized>(
        &self,
        dataset: &usize,
        _backbone: &B,
        _folds: usize,
        _threads: usize,
    ) -> Result<VerificationOutcome, CallbackError> {
        let acc = self.queues.borrow_mut()[*dataset].remove(0);
        Ok(VerificationOutcome {
            accuracy: acc,
            accuracy_std: 0.0,
            flip_accuracy: acc,
            flip_accuracy_std: 0.0,
            xnorm: 1.0,
        })
    }
}

/// Counts evaluations and always reports the same accuracy.
struct CountingVerifier {
    calls: Rc<Cell<usize>>,
}

impl Verifier for CountingVerifier {
    type Dataset = ();

    fn load_bin(&self, _path: &Path, _image_size: [usize; 2]) -> Result<(), CallbackError> {
        Ok(())
    }

    fn test<B: Backbone + ?Sized>(
        &self,
        _dataset: &(),
        _backbone: &B,
        _folds: usize,
        _threads: usize,
    ) -> Result<VerificationOutcome, CallbackError> {
        self.calls.set(self.calls.get() + 1);
        Ok(VerificationOutcome {
            accuracy: 0.9,
            accuracy_std: 0.0,
            flip_accuracy: 0.9,
            flip_accuracy_std: 0.0,
            xnorm: 1.0,
        })
    }
}

proptest! {
    #[test]
    fn verification_silent_unless_due(step in 0u64..5000, frequent in 1u64..500) {
        let dir = TempDir::new().unwrap();
        let rec = dir.path().join("rec");
        std::fs::create_dir_all(&rec).unwrap();
        std::fs::write(rec.join("lfw.bin"), b"").unwrap();
        let config = VerificationConfig {
            frequent,
            targets: vec!["lfw".to_string()],
            rec_prefix: rec,
            best_snapshot_dir: dir.path().join("best"),
            ..VerificationConfig::default()
        };
        let calls = Rc::new(Cell::new(0));
        let verifier = CountingVerifier { calls: calls.clone() };
        let mut cb = VerificationCallback::new(&config, ProcessRole::Coordinator, verifier).unwrap();

        let report = cb.evaluate_if_due(step, None, &mut Net).unwrap();
        let due = step > 0 && step % frequent == 0;
        prop_assert_eq!(report.is_some(), due);
        prop_assert_eq!(config.best_snapshot_dir.exists(), due);
        prop_assert_eq!(calls.get(), usize::from(due));
        if !due {
            prop_assert_eq!(cb.highest_score(), 0.0);
        }

        let mut worker = VerificationCallback::new(
            &config,
            ProcessRole::Worker,
            CountingVerifier { calls: calls.clone() },
        ).unwrap();
        prop_assert!(worker.evaluate_if_due(step, None, &mut Net).unwrap().is_none());
        prop_assert_eq!(calls.get(), usize::from(due));
    }

    #[test]
    fn checkpoint_silent_unless_due(step in 0u64..2000, interval in 1u64..300) {
        let dir = TempDir::new().unwrap();
        let cb = CheckpointCallback::new(ProcessRole::Coordinator, dir.path());
        let every = SaveInterval::from_option(Some(interval)).unwrap();
        let outcome = cb.checkpoint_if_due(step, &Net, None, every).unwrap();
        let expected = step > 100 && step % interval == 0;
        prop_assert_eq!(outcome.backbone.is_some(), expected);
        prop_assert_eq!(cb.backbone_path().exists(), expected);
    }

    #[test]
    fn logging_never_reports_off_schedule(steps in proptest::collection::vec(0u64..5000, 1..50)) {
        let mut cb = LoggingCallback::with_clock(
            100, ProcessRole::Coordinator, 5000, 32, 2, None, Arc::new(ManualClock::new()),
        );
        let mut meter = AverageMeter::new();
        let mut seen_due = false;
        for step in steps {
            let report = cb.report_if_due(step, &mut meter, 0, false, 0.1, &1.0_f64).unwrap();
            let due = is_due(step, 100);
            if !due {
                prop_assert!(report.is_none());
            } else if !seen_due {
                prop_assert!(report.is_none());
                seen_due = true;
            } else {
                prop_assert!(report.is_some());
            }
        }
    }

    #[test]
    fn best_tracking_matches_running_max(
        rounds in proptest::collection::vec(proptest::collection::vec(0.0f64..1.0, 3), 1..12)
    ) {
        let dir = TempDir::new().unwrap();
        let rec = dir.path().join("rec");
        std::fs::create_dir_all(&rec).unwrap();
        let targets: Vec<String> = (0..3).map(|i| format!("b{i}")).collect();
        for t in &targets {
            std::fs::write(rec.join(format!("{t}.bin")), b"").unwrap();
        }
        let config = VerificationConfig {
            frequent: 10,
            targets,
            rec_prefix: rec,
            best_snapshot_dir: dir.path().join("best"),
            ..VerificationConfig::default()
        };
        let queues: Vec<Vec<f64>> = (0..3).map(|i| rounds.iter().map(|r| r[i]).collect()).collect();
        let verifier = QueueVerifier { queues: RefCell::new(queues) };
        let mut cb = VerificationCallback::new(&config, ProcessRole::Coordinator, verifier).unwrap();

        let mut running_best = 0.0f64;
        let mut expected_saves = Vec::new();
        for (i, round) in rounds.iter().enumerate() {
            let step = (i as u64 + 1) * 10;
            let report = cb.evaluate_if_due(step, None, &mut Net).unwrap().unwrap();
            let score: f64 = round.iter().sum();
            prop_assert!((report.score - score).abs() < 1e-12);
            if report.score >= running_best {
                running_best = report.score;
                expected_saves.push(step);
                prop_assert!(report.saved.is_some());
            } else {
                prop_assert!(report.saved.is_none());
            }
        }

        prop_assert_eq!(cb.highest_score(), running_best);
        for slot in 0..3 {
            let max = rounds.iter().map(|r| r[slot]).fold(0.0f64, f64::max);
            prop_assert_eq!(cb.highest_accuracies()[slot], max);
        }
        let saved: Vec<u64> = cb.snapshot_history().unwrap().iter().map(|r| r.step).collect();
        prop_assert_eq!(saved, expected_saves);
    }
}
