//! Shot-Datagen: Synthetic Training Data for Shot-Tuner
//!
//! Produces `(description, shot record)` pairs for fine-tuning, either offline
//! from templates or by prompting a hosted LLM.
//!
//! ## Layer 1 - Dataset Generation
//!
//! Focus: exact counts locally, partial-failure tolerance remotely, schema
//! validation for every record regardless of origin.

pub mod error;
pub mod local;
pub mod provider;
pub mod remote;
pub mod report;
mod templates;

use std::path::Path;

use shot_schema::TrainingExample;
use tracing::info;

pub use error::{DatagenError, GenerationError, Result};
pub use local::LocalGenerator;
pub use provider::{Provider, ProviderConfig};
pub use remote::{RemoteGenerator, RemoteOptions};
pub use report::GenerationReport;

/// Where examples come from
#[derive(Debug, Clone)]
pub enum GenerationMode {
    Local {
        seed: Option<u64>,
    },
    Remote {
        config: ProviderConfig,
        options: RemoteOptions,
    },
}

/// Generate a dataset of `count` examples.
///
/// Local mode always yields exactly `count`; remote mode yields at most
/// `count` and the report says how many were lost and why.
pub async fn generate_dataset(
    mode: GenerationMode,
    count: usize,
) -> Result<(Vec<TrainingExample>, GenerationReport)> {
    match mode {
        GenerationMode::Local { seed } => {
            let mut generator = LocalGenerator::new(seed);
            info!(count, seed = generator.seed(), "Generating dataset locally");
            let examples = generator.generate(count);
            let report = GenerationReport::local(count, examples.len());
            Ok((examples, report))
        }
        GenerationMode::Remote { config, options } => {
            let generator = RemoteGenerator::new(config, options)?;
            generator.generate(count).await
        }
    }
}

/// Persist a dataset artifact.
pub fn save_dataset(path: &Path, examples: &[TrainingExample]) -> Result<()> {
    shot_schema::write_dataset(path, examples)?;
    info!(path = %path.display(), count = examples.len(), "Saved dataset");
    Ok(())
}
