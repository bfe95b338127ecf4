//! Error types for shot-datagen

use shot_schema::SchemaError;
use thiserror::Error;

/// Stage-level errors that abort a generation run
#[derive(Error, Debug)]
pub enum DatagenError {
    /// Missing credential, rejected credential or invalid parameter
    #[error("configuration error: {0}")]
    Configuration(String),

    /// HTTP client could not be constructed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Writing the dataset artifact failed
    #[error("dataset error: {0}")]
    Schema(#[from] SchemaError),
}

impl From<reqwest::Error> for DatagenError {
    fn from(err: reqwest::Error) -> Self {
        DatagenError::Http(err.to_string())
    }
}

/// A single provider round-trip that did not yield examples.
///
/// Recoverable: the run records it and carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("request {request}: network error: {message}")]
    Network { request: usize, message: String },

    #[error("request {request}: rate limited by provider")]
    RateLimited { request: usize },

    #[error("request {request}: credential rejected (HTTP {status})")]
    Unauthorized { request: usize, status: u16 },

    #[error("request {request}: HTTP {status}: {body}")]
    Status {
        request: usize,
        status: u16,
        body: String,
    },

    #[error("request {request}: unparseable content: {reason}")]
    Unparseable { request: usize, reason: String },
}

impl GenerationError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Network { .. }
            | GenerationError::RateLimited { .. }
            | GenerationError::Unparseable { .. } => true,
            GenerationError::Status { status, .. } => *status >= 500,
            GenerationError::Unauthorized { .. } => false,
        }
    }

    pub fn request(&self) -> usize {
        match self {
            GenerationError::Network { request, .. }
            | GenerationError::RateLimited { request }
            | GenerationError::Unauthorized { request, .. }
            | GenerationError::Status { request, .. }
            | GenerationError::Unparseable { request, .. } => *request,
        }
    }
}

/// Result type for shot-datagen operations.
pub type Result<T> = std::result::Result<T, DatagenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(GenerationError::RateLimited { request: 0 }.is_retryable());
        assert!(GenerationError::Status {
            request: 0,
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!GenerationError::Status {
            request: 0,
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!GenerationError::Unauthorized {
            request: 0,
            status: 401
        }
        .is_retryable());
    }

    #[test]
    fn test_generation_error_display_names_request() {
        let err = GenerationError::Unparseable {
            request: 7,
            reason: "no JSON payload found in text".to_string(),
        };
        assert!(err.to_string().starts_with("request 7"));
        assert_eq!(err.request(), 7);
    }
}
