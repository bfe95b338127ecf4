//! The plan file handed to a training backend.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shot_schema::prompt::{INPUT_HEADER, OUTPUT_HEADER};
use uuid::Uuid;

use crate::config::TrainConfig;
use crate::error::Result;
use crate::prepare::PreparedDataset;

pub const PLAN_FILE: &str = "training_plan.json";

/// Prompt layout the backend must train on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptFormat {
    pub input_header: String,
    pub output_header: String,
}

impl Default for PromptFormat {
    fn default() -> Self {
        PromptFormat {
            input_header: INPUT_HEADER.to_string(),
            output_header: OUTPUT_HEADER.to_string(),
        }
    }
}

/// Everything a backend needs to run one fine-tuning job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub run_id: Uuid,
    pub schema_version: u32,
    pub base_model: String,
    pub train_file: PathBuf,
    pub eval_file: PathBuf,
    /// Where adapter weights and tokenizer state must be saved
    pub output_dir: PathBuf,
    pub train_examples: usize,
    pub eval_examples: usize,
    pub total_steps: u64,
    pub prompt_format: PromptFormat,
    pub config: TrainConfig,
}

impl TrainingPlan {
    pub fn new(config: &TrainConfig, prepared: &PreparedDataset) -> Self {
        TrainingPlan {
            run_id: Uuid::new_v4(),
            schema_version: shot_schema::SCHEMA_VERSION,
            base_model: config.base_model.clone(),
            train_file: prepared.train_path.clone(),
            eval_file: prepared.eval_path.clone(),
            output_dir: config.output_dir.clone(),
            train_examples: prepared.train_count,
            eval_examples: prepared.eval_count,
            total_steps: config.total_steps(prepared.train_count),
            prompt_format: PromptFormat::default(),
            config: config.clone(),
        }
    }

    /// Write the plan into its output directory and return the file path.
    pub fn write(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(PLAN_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
