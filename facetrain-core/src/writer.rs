//! Scalar metric sinks.

use crate::error::CallbackError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination for `(tag, value, step)` scalars, e.g. a dashboard event log.
pub trait MetricsWriter: Send {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), CallbackError>;

    fn flush(&mut self) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// One line of a JSONL scalar log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub value: f64,
    pub step: u64,
    /// Seconds since the Unix epoch.
    pub wall_time: f64,
}

/// Appends scalars as JSON lines to `<dir>/scalars.jsonl`.
pub struct JsonlScalarWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl JsonlScalarWriter {
    pub const FILE_NAME: &'static str = "scalars.jsonl";

    pub fn create(dir: &Path) -> Result<Self, CallbackError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsWriter for JsonlScalarWriter {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), CallbackError> {
        let record = ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
            wall_time: Utc::now().timestamp_micros() as f64 / 1e6,
        };
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CallbackError> {
        self.out.flush()?;
        Ok(())
    }
}

impl Drop for JsonlScalarWriter {
    fn drop(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to flush scalar log");
        }
    }
}

/// Parse a JSONL scalar log back into records.
pub fn read_scalars(path: &Path) -> Result<Vec<ScalarRecord>, CallbackError> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(CallbackError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_writer_appends_records() {
        let dir = TempDir::new().unwrap();
        let mut writer = JsonlScalarWriter::create(dir.path()).unwrap();
        writer.add_scalar("loss", 12.5, 200).unwrap();
        writer.add_scalar("learning_rate", 0.1, 200).unwrap();
        writer.flush().unwrap();

        let records = read_scalars(writer.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tag, "loss");
        assert_eq!(records[0].value, 12.5);
        assert_eq!(records[1].step, 200);
        assert!(records[1].wall_time > 0.0);
    }

    #[test]
    fn test_jsonl_writer_reopens_in_append_mode() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = JsonlScalarWriter::create(dir.path()).unwrap();
            writer.add_scalar("loss", 1.0, 1).unwrap();
        }
        {
            let mut writer = JsonlScalarWriter::create(dir.path()).unwrap();
            writer.add_scalar("loss", 2.0, 2).unwrap();
        }
        let records = read_scalars(&dir.path().join(JsonlScalarWriter::FILE_NAME)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].value, 2.0);
    }
}
