//! Generation run summary

use shot_schema::RecordRejection;

use crate::error::GenerationError;

/// Outcome of one generation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    /// `local`, `siliconflow` or `deepseek`
    pub mode: String,
    pub requested: usize,
    pub produced: usize,
    /// Provider round-trips issued (zero for local runs)
    pub requests: usize,
    /// Round-trips that yielded nothing after all retries
    pub failed_requests: usize,
    /// Returned records that failed schema validation
    pub rejected_records: Vec<RecordRejection>,
    pub errors: Vec<GenerationError>,
}

impl GenerationReport {
    pub fn local(requested: usize, produced: usize) -> Self {
        GenerationReport {
            mode: "local".to_string(),
            requested,
            produced,
            ..Default::default()
        }
    }

    /// Whether every requested example was produced.
    pub fn is_complete(&self) -> bool {
        self.produced >= self.requested
    }

    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.produced)
    }
}
