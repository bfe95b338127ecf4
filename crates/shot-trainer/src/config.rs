//! Training hyperparameters
//!
//! Defaults reproduce the reference recipe for small instruction models. A
//! TOML file may override any subset of fields; missing fields keep their
//! defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TrainError};

pub const DEFAULT_BASE_MODEL: &str = "Qwen/Qwen2.5-0.5B-Instruct";
pub const DEFAULT_OUTPUT_DIR: &str = "./camera_shot_model";

/// Low-rank adapter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoraConfig {
    /// Adapter rank
    pub r: u32,
    pub alpha: u32,
    pub dropout: f64,
    pub target_modules: Vec<String>,
    pub bias: String,
    pub task_type: String,
}

impl Default for LoraConfig {
    fn default() -> Self {
        LoraConfig {
            r: 16,
            alpha: 32,
            dropout: 0.05,
            target_modules: ["q_proj", "k_proj", "v_proj", "o_proj"]
                .into_iter()
                .map(String::from)
                .collect(),
            bias: "none".to_string(),
            task_type: "CAUSAL_LM".to_string(),
        }
    }
}

/// Full training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub base_model: String,
    pub output_dir: PathBuf,
    pub epochs: u32,
    pub batch_size: u32,
    pub learning_rate: f64,
    /// Micro-batches accumulated per optimizer step
    pub gradient_accumulation_steps: u32,
    pub weight_decay: f64,
    pub warmup_steps: u32,
    pub logging_steps: u32,
    pub save_steps: u32,
    pub eval_steps: u32,
    pub save_total_limit: u32,
    /// Token budget per example
    pub max_length: u32,
    pub fp16: bool,
    /// Share of valid examples held out for evaluation
    pub eval_fraction: f64,
    /// Seed for the train/eval shuffle
    pub seed: u64,
    pub lora: LoraConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            base_model: DEFAULT_BASE_MODEL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            epochs: 3,
            batch_size: 4,
            learning_rate: 2e-4,
            gradient_accumulation_steps: 4,
            weight_decay: 0.01,
            warmup_steps: 100,
            logging_steps: 10,
            save_steps: 500,
            eval_steps: 100,
            save_total_limit: 3,
            max_length: 512,
            fp16: true,
            eval_fraction: 0.1,
            seed: 42,
            lora: LoraConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), "Loaded training config");
        Ok(config)
    }

    /// Examples contributing to one optimizer step.
    pub fn effective_batch_size(&self) -> u32 {
        self.batch_size.saturating_mul(self.gradient_accumulation_steps)
    }

    /// Optimizer steps for `train_examples` examples over all epochs.
    pub fn total_steps(&self, train_examples: usize) -> u64 {
        let per_step = u64::from(self.effective_batch_size().max(1));
        let steps_per_epoch = (train_examples as u64).div_ceil(per_step).max(1);
        steps_per_epoch * u64::from(self.epochs)
    }

    /// Reject values no training run could use.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.base_model.trim().is_empty() {
            problems.push("base_model must not be empty".to_string());
        }
        if self.epochs == 0 {
            problems.push("epochs must be positive".to_string());
        }
        if self.batch_size == 0 {
            problems.push("batch_size must be positive".to_string());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            problems.push(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }
        if self.gradient_accumulation_steps == 0 {
            problems.push("gradient_accumulation_steps must be positive".to_string());
        }
        if self.max_length == 0 {
            problems.push("max_length must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.eval_fraction) {
            problems.push(format!(
                "eval_fraction must be within [0, 1), got {}",
                self.eval_fraction
            ));
        }
        if self.lora.r == 0 || self.lora.alpha == 0 {
            problems.push("lora.r and lora.alpha must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.lora.dropout) {
            problems.push(format!(
                "lora.dropout must be within [0, 1), got {}",
                self.lora.dropout
            ));
        }
        if self.lora.target_modules.is_empty() {
            problems.push("lora.target_modules must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(TrainError::Configuration(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_recipe() {
        let config = TrainConfig::default();
        assert_eq!(config.base_model, "Qwen/Qwen2.5-0.5B-Instruct");
        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.learning_rate, 2e-4);
        assert_eq!(config.effective_batch_size(), 16);
        assert_eq!(config.lora.r, 16);
        assert_eq!(config.lora.alpha, 32);
        assert_eq!(config.lora.target_modules.len(), 4);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TrainConfig::from_toml_str(
            r#"
            epochs = 5
            learning_rate = 1e-4

            [lora]
            r = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.epochs, 5);
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.lora.r, 8);
        assert_eq!(config.lora.alpha, 32);
    }

    #[test]
    fn test_bad_toml_is_config_file_error() {
        let err = TrainConfig::from_toml_str("epochs = \"three\"").unwrap_err();
        assert!(matches!(err, TrainError::ConfigFile(_)));
    }

    #[test]
    fn test_validate_rejects_non_positive_values() {
        for config in [
            TrainConfig {
                epochs: 0,
                ..Default::default()
            },
            TrainConfig {
                batch_size: 0,
                ..Default::default()
            },
            TrainConfig {
                learning_rate: 0.0,
                ..Default::default()
            },
            TrainConfig {
                learning_rate: -1e-4,
                ..Default::default()
            },
            TrainConfig {
                eval_fraction: 1.0,
                ..Default::default()
            },
        ] {
            let err = config.validate().unwrap_err();
            assert!(matches!(err, TrainError::Configuration(_)));
        }
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let config = TrainConfig {
            epochs: 0,
            batch_size: 0,
            ..Default::default()
        };
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("epochs"));
        assert!(message.contains("batch_size"));
    }

    #[test]
    fn test_total_steps() {
        let config = TrainConfig::default();
        // 100 examples / 16 per step = 7 steps per epoch
        assert_eq!(config.total_steps(100), 21);
        assert_eq!(config.total_steps(0), 3);
    }
}
