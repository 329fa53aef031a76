//! Error types for the facetrain-core crate.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for callback operations.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Verification error on '{benchmark}': {message}")]
    Verification { benchmark: String, message: String },

    #[error("Failed to persist {path:?}: {message}")]
    Persist { path: PathBuf, message: String },

    #[error("Metrics writer error: {0}")]
    Writer(String),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CallbackError {
    pub fn verification(benchmark: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Verification {
            benchmark: benchmark.into(),
            message: msg.into(),
        }
    }

    pub fn persist(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Persist {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn writer(msg: impl Into<String>) -> Self {
        Self::Writer(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
