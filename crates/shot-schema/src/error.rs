//! Error types for shot-schema

use thiserror::Error;

/// A single field-level schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending field (e.g. `path.radius`).
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors produced while decoding or validating shot data
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Text does not decode into the expected shape (including unknown `type` tags)
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Decoded record breaks one or more value constraints
    #[error("record failed validation: {}", join_violations(.0))]
    Invalid(Vec<Violation>),

    /// No JSON object or array could be located in free-form text
    #[error("no JSON payload found in text")]
    NoJson,

    /// Dataset artifact root is not a JSON array
    #[error("dataset artifact must be a JSON array of examples")]
    NotAnArray,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchemaError {
    /// Violations carried by an `Invalid` error, empty otherwise.
    pub fn violations(&self) -> &[Violation] {
        match self {
            SchemaError::Invalid(v) => v,
            _ => &[],
        }
    }
}

/// Result type for shot-schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_error_lists_every_violation() {
        let err = SchemaError::Invalid(vec![
            Violation::new("duration", "must be positive"),
            Violation::new("path.radius", "must be positive"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("duration: must be positive"));
        assert!(msg.contains("path.radius: must be positive"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn test_non_invalid_error_has_no_violations() {
        assert!(SchemaError::NoJson.violations().is_empty());
    }
}
