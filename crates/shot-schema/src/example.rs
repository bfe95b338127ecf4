//! Supervised training pairs.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError, Violation};
use crate::record::ShotParameterRecord;

/// One natural-language description paired with its structured shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub input: String,
    pub output: ShotParameterRecord,
}

impl TrainingExample {
    pub fn new(input: impl Into<String>, output: ShotParameterRecord) -> Self {
        Self {
            input: input.into(),
            output,
        }
    }

    /// Decode and validate an example from an untrusted JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let example: TrainingExample = serde_json::from_value(value)?;
        example.validate()?;
        Ok(example)
    }

    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();
        if self.input.trim().is_empty() {
            violations.push(Violation::new("input", "must not be empty"));
        }
        if let Err(err) = self.output.validate() {
            violations.extend(err.violations().iter().map(|v| Violation {
                field: format!("output.{}", v.field),
                message: v.message.clone(),
            }));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Invalid(violations))
        }
    }
}
