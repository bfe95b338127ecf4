//! Output verification and the training manifest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shot_schema::MANIFEST_FILE;
use tracing::warn;
use uuid::Uuid;

use crate::config::TrainConfig;
use crate::error::{Result, TrainError, TrainingDataError};

pub const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";
pub const ADAPTER_WEIGHT_FILES: [&str; 2] = ["adapter_model.safetensors", "adapter_model.bin"];
pub const TOKENIZER_FILES: [&str; 2] = ["tokenizer.json", "tokenizer_config.json"];

/// Files a finished run must leave behind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFiles {
    pub adapter_config: PathBuf,
    pub adapter_weights: PathBuf,
    pub tokenizer: PathBuf,
}

/// Modification times of output files present before a run starts.
#[derive(Debug, Clone, Default)]
pub struct OutputSnapshot {
    before: HashMap<PathBuf, Option<SystemTime>>,
}

impl OutputSnapshot {
    pub fn capture(output_dir: &Path) -> Self {
        let before = [ADAPTER_CONFIG_FILE]
            .into_iter()
            .chain(ADAPTER_WEIGHT_FILES)
            .chain(TOKENIZER_FILES)
            .map(|name| output_dir.join(name))
            .filter(|path| path.is_file())
            .map(|path| {
                let modified = modified(&path);
                (path, modified)
            })
            .collect();
        OutputSnapshot { before }
    }

    /// Whether `path` was created or rewritten since the capture.
    fn is_fresh(&self, path: &Path) -> bool {
        match self.before.get(path) {
            None => true,
            Some(before) => {
                let now = modified(path);
                before.is_none() || now.is_none() || now != *before
            }
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Check that adapter config, adapter weights and tokenizer state exist and
/// were written after `snapshot` was taken.
pub fn verify_outputs(output_dir: &Path, snapshot: &OutputSnapshot) -> Result<OutputFiles> {
    let mut stale = Vec::new();
    let mut first_present = |names: &[&str]| {
        names
            .iter()
            .map(|name| output_dir.join(name))
            .filter(|path| path.is_file())
            .find(|path| {
                let fresh = snapshot.is_fresh(path);
                if !fresh {
                    stale.push(path.clone());
                }
                fresh
            })
    };

    let adapter_config = first_present(&[ADAPTER_CONFIG_FILE]);
    let adapter_weights = first_present(&ADAPTER_WEIGHT_FILES);
    let tokenizer = first_present(&TOKENIZER_FILES);

    match (adapter_config, adapter_weights, tokenizer) {
        (Some(adapter_config), Some(adapter_weights), Some(tokenizer)) => Ok(OutputFiles {
            adapter_config,
            adapter_weights,
            tokenizer,
        }),
        (config, weights, tokenizer) => {
            let mut missing = Vec::new();
            if config.is_none() {
                missing.push(ADAPTER_CONFIG_FILE.to_string());
            }
            if weights.is_none() {
                missing.push(ADAPTER_WEIGHT_FILES.join(" or "));
            }
            if tokenizer.is_none() {
                missing.push(TOKENIZER_FILES.join(" or "));
            }
            if !stale.is_empty() {
                warn!(
                    event = "training.stale_outputs",
                    files = ?stale,
                    "Output files predate this run and were not rewritten"
                );
            }
            Err(TrainError::MissingArtifacts(missing))
        }
    }
}

/// Record of one completed training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub backend: String,
    pub base_model: String,
    pub dataset_path: PathBuf,
    /// SHA-256 of the dataset artifact
    pub dataset_digest: String,
    pub total_records: usize,
    pub valid_records: usize,
    pub rejected_records: Vec<TrainingDataError>,
    pub train_records: usize,
    pub eval_records: usize,
    pub final_loss: Option<f64>,
    pub outputs: OutputFiles,
    pub config: TrainConfig,
}

impl TrainingManifest {
    pub fn duration_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }

    /// Write the manifest into `dir`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Read the manifest from a run's output directory.
    pub fn read(dir: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&text)?)
    }
}
