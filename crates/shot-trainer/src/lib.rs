//! Shot-Trainer: LoRA Fine-Tuning Orchestration for Shot-Tuner
//!
//! Turns a dataset artifact into a trained adapter:
//!
//! 1. validate hyperparameters
//! 2. validate every record, excluding and reporting bad ones
//! 3. split and format the valid records with the shared prompt layout
//! 4. write a [`TrainingPlan`] and hand it to a [`TrainingBackend`]
//! 5. verify the backend's outputs and write a [`TrainingManifest`]
//!
//! ## Layer 2 - Training
//!
//! Focus: nothing reaches the backend unvalidated; the input dataset is
//! never modified.

pub mod backend;
pub mod config;
pub mod error;
pub mod manifest;
pub mod memory;
pub mod plan;
pub mod prepare;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

pub use backend::{
    parse_progress_line, BackendOutcome, CommandBackend, TrainingBackend, TrainingProgress,
};
pub use config::{LoraConfig, TrainConfig, DEFAULT_BASE_MODEL, DEFAULT_OUTPUT_DIR};
pub use error::{Result, TrainError, TrainingDataError};
pub use manifest::{verify_outputs, OutputFiles, OutputSnapshot, TrainingManifest};
pub use memory::{estimate_memory, parse_parameter_count, MemoryEstimate};
pub use plan::{TrainingPlan, PLAN_FILE};
pub use prepare::{prepare_dataset, PreparedDataset};

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub manifest: TrainingManifest,
    pub backend: BackendOutcome,
}

/// Drives one training run against a backend
pub struct Trainer {
    config: TrainConfig,
    backend: Arc<dyn TrainingBackend>,
}

impl Trainer {
    pub fn new(config: TrainConfig, backend: Arc<dyn TrainingBackend>) -> Self {
        Trainer { config, backend }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Validate and prepare without training.
    pub fn plan(&self, dataset: &Path) -> Result<(PreparedDataset, TrainingPlan)> {
        self.config.validate()?;
        let prepared = prepare_dataset(dataset, &self.config)?;
        let plan = TrainingPlan::new(&self.config, &prepared);
        Ok((prepared, plan))
    }

    /// Train on the dataset at `dataset`.
    #[instrument(skip(self), fields(backend = %self.backend.name(), base_model = %self.config.base_model))]
    pub async fn train(&self, dataset: &Path) -> Result<TrainingOutcome> {
        let started_at = Utc::now();
        let (prepared, plan) = self.plan(dataset)?;

        match estimate_memory(&self.config, None, None) {
            Ok(estimate) => info!(
                total_gb = estimate.total_gb,
                effective_batch = self.config.effective_batch_size(),
                "Estimated training memory"
            ),
            Err(err) => warn!(error = %err, "Skipping memory estimate"),
        }

        let plan_path = plan.write()?;
        info!(
            run_id = %plan.run_id,
            plan = %plan_path.display(),
            train = prepared.train_count,
            eval = prepared.eval_count,
            total_steps = plan.total_steps,
            "Training plan written"
        );

        let snapshot = OutputSnapshot::capture(&self.config.output_dir);
        let backend_outcome = self.backend.run(&plan, &plan_path).await?;
        let outputs = verify_outputs(&self.config.output_dir, &snapshot)?;

        let manifest = TrainingManifest {
            schema_version: shot_schema::SCHEMA_VERSION,
            run_id: plan.run_id,
            started_at,
            finished_at: Utc::now(),
            backend: self.backend.name().to_string(),
            base_model: self.config.base_model.clone(),
            dataset_path: prepared.source.clone(),
            dataset_digest: prepared.digest.clone(),
            total_records: prepared.report.total,
            valid_records: prepared.report.valid,
            rejected_records: prepared.report.rejected.clone(),
            train_records: prepared.train_count,
            eval_records: prepared.eval_count,
            final_loss: backend_outcome.final_loss,
            outputs,
            config: self.config.clone(),
        };
        let manifest_path = manifest.write(&self.config.output_dir)?;

        info!(
            run_id = %manifest.run_id,
            manifest = %manifest_path.display(),
            final_loss = manifest.final_loss,
            duration_secs = manifest.duration_secs(),
            "Training finished"
        );

        Ok(TrainingOutcome {
            manifest,
            backend: backend_outcome,
        })
    }
}
