//! Error types for shot-trainer

use shot_schema::SchemaError;
use thiserror::Error;

/// A dataset record excluded from training, with its index and reason.
pub type TrainingDataError = shot_schema::RecordRejection;

/// Errors that abort a training run
#[derive(Error, Debug)]
pub enum TrainError {
    /// Invalid hyperparameters, no usable data, or a missing backend
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Dataset artifact unreadable or not a JSON array
    #[error("dataset error: {0}")]
    Dataset(#[from] SchemaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    /// Backend could not be started
    #[error("backend error: {0}")]
    Backend(String),

    /// Backend exited unsuccessfully
    #[error("backend exited with code {code:?}: {stderr_tail}")]
    BackendFailed {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("backend timed out after {0} seconds")]
    Timeout(u64),

    /// Backend finished but expected output files are absent
    #[error("training output incomplete, missing: {}", .0.join(", "))]
    MissingArtifacts(Vec<String>),
}

/// Result type for shot-trainer operations.
pub type Result<T> = std::result::Result<T, TrainError>;
