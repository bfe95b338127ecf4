//! Error types for shot-client

use thiserror::Error;

/// Errors from opening an artifact, running inference or exporting a model
#[derive(Error, Debug)]
pub enum ClientError {
    /// Missing or unrecognizable artifact, incompatible manifest, bad setting
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The description cannot be sent
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Inference server unreachable or returned an error
    #[error("inference backend error: {0}")]
    Backend(String),

    /// Model output did not yield a valid shot record
    #[error("could not parse model output: {reason} (output began: {excerpt:?})")]
    InferenceParse { reason: String, excerpt: String },

    /// Registering a model with the serving runtime failed
    #[error("export error: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Backend(err.to_string())
    }
}

/// Result type for shot-client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
