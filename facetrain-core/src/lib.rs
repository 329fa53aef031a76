//! # facetrain-core — training-loop instrumentation for face recognition
//!
//! Three step-gated callbacks the training loop invokes once per optimizer
//! step:
//!
//! - [`VerificationCallback`] — evaluates held-out pair-matching benchmarks
//!   and keeps the best-scoring backbone snapshot.
//! - [`LoggingCallback`] — reports throughput, loss, learning rate, and ETA.
//! - [`CheckpointCallback`] — persists backbone and classification-head state.
//!
//! The network, classification head, verification routine, and metric sinks
//! are external collaborators reached through the traits in
//! [`collaborators`] and [`writer`].

pub mod callbacks;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod meter;
pub mod persist;
pub mod role;
pub mod writer;

// Re-exports
pub use callbacks::{
    CheckpointCallback, CheckpointOutcome, LoggingCallback, SaveInterval, ThroughputReport,
    VerificationCallback, VerificationReport,
};
pub use collaborators::{
    Backbone, ClassificationHead, EvalModeGuard, LossScaler, ModelMode, VerificationOutcome,
    Verifier,
};
pub use config::{FacetrainConfig, load_config};
pub use error::CallbackError;
pub use meter::{AverageMeter, LossAccumulator};
pub use role::ProcessRole;
pub use writer::{JsonlScalarWriter, MetricsWriter};
