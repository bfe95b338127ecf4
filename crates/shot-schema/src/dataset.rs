//! Dataset artifacts on disk.
//!
//! A dataset is a single pretty-printed JSON array of [`TrainingExample`]s.
//! Reading is lenient per record: records that fail to decode or validate are
//! reported and skipped, while an unreadable artifact is a hard error.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Result, SchemaError};
use crate::example::TrainingExample;

/// A record excluded from a dataset, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRejection {
    /// Zero-based position in the artifact.
    pub index: usize,
    pub reason: String,
}

/// Aggregate outcome of reading a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub total: usize,
    pub valid: usize,
    pub rejected: Vec<RecordRejection>,
}

impl DatasetReport {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Validate already-decoded JSON records, keeping the valid ones in order.
pub fn validate_records(values: Vec<serde_json::Value>) -> (Vec<TrainingExample>, DatasetReport) {
    let mut report = DatasetReport {
        total: values.len(),
        ..DatasetReport::default()
    };
    let mut examples = Vec::with_capacity(values.len());

    for (index, value) in values.into_iter().enumerate() {
        match TrainingExample::from_value(value) {
            Ok(example) => examples.push(example),
            Err(err) => {
                warn!(event = "dataset.record_rejected", index, error = %err);
                report.rejected.push(RecordRejection {
                    index,
                    reason: err.to_string(),
                });
            }
        }
    }

    report.valid = examples.len();
    (examples, report)
}

/// Parse dataset text into valid examples plus a report.
pub fn parse_dataset(text: &str) -> Result<(Vec<TrainingExample>, DatasetReport)> {
    let root: serde_json::Value = serde_json::from_str(text)?;
    let serde_json::Value::Array(values) = root else {
        return Err(SchemaError::NotAnArray);
    };
    Ok(validate_records(values))
}

/// Read a dataset artifact from disk.
pub fn read_dataset(path: &Path) -> Result<(Vec<TrainingExample>, DatasetReport)> {
    let text = std::fs::read_to_string(path)?;
    let (examples, report) = parse_dataset(&text)?;
    debug!(
        path = %path.display(),
        total = report.total,
        valid = report.valid,
        "Read dataset"
    );
    Ok((examples, report))
}

/// Write a dataset artifact, creating parent directories as needed.
pub fn write_dataset(path: &Path, examples: &[TrainingExample]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(examples)?;
    std::fs::write(path, json)?;
    debug!(path = %path.display(), count = examples.len(), "Wrote dataset");
    Ok(())
}

/// SHA-256 hex digest of an artifact's bytes.
pub fn dataset_digest(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
