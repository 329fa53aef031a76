//! Step-gated callbacks invoked by the training loop once per optimizer step.
//!
//! Each callback is independent of the others; the loop owns all three and
//! may call them in any order.

pub mod checkpoint;
pub mod logging;
pub mod verification;

pub use checkpoint::{CheckpointCallback, CheckpointOutcome, SaveInterval};
pub use logging::{Clock, LoggingCallback, ManualClock, SystemClock, ThroughputReport};
pub use verification::{BenchmarkResult, SnapshotRecord, VerificationCallback, VerificationReport};

/// True when `step` is a positive multiple of `frequent`.
pub fn is_due(step: u64, frequent: u64) -> bool {
    frequent > 0 && step > 0 && step % frequent == 0
}
