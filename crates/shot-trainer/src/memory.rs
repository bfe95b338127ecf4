//! Rough accelerator memory estimate for a LoRA run.
//!
//! Frozen base weights dominate; adapter weights, their gradients and Adam
//! state are small; activations scale with micro-batch size and sequence
//! length. The numbers are a planning aid, not a guarantee.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::config::TrainConfig;
use crate::error::{Result, TrainError};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Adapter parameters per base parameter at r=16 over four projections.
const ADAPTER_RATIO_AT_R16: f64 = 0.002;

/// fp32 adapter weight, gradient and two Adam moments.
const ADAPTER_STATE_BYTES: f64 = 16.0;

/// Activation bytes per token per sqrt(billion parameters), fp16.
const ACTIVATION_BYTES_PER_TOKEN: f64 = 2.0e6;

/// Framework and allocator overhead in GiB.
const OVERHEAD_GB: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryEstimate {
    pub parameters_billion: f64,
    pub weights_gb: f64,
    pub adapter_state_gb: f64,
    pub activations_gb: f64,
    pub total_gb: f64,
    pub available_gb: Option<f64>,
    pub recommendations: Vec<String>,
}

impl MemoryEstimate {
    /// Whether the estimate exceeds the stated available memory.
    pub fn exceeds_available(&self) -> bool {
        self.available_gb.is_some_and(|gb| self.total_gb > gb)
    }
}

fn size_regex() -> &'static Regex {
    static SIZE: OnceLock<Regex> = OnceLock::new();
    SIZE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)([bm])(?:[^a-z]|$)").expect("valid size regex")
    })
}

/// Parameter count in billions, read from a model id such as
/// `Qwen/Qwen2.5-0.5B-Instruct` or `SmolLM-135M`.
pub fn parse_parameter_count(model_id: &str) -> Option<f64> {
    let caps = size_regex().captures(model_id)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    match caps.get(2)?.as_str() {
        "b" | "B" => Some(value),
        _ => Some(value / 1000.0),
    }
}

/// Estimate memory for `config`.
///
/// `parameters_billion` overrides the count parsed from the model id; one of
/// the two must be available.
pub fn estimate_memory(
    config: &TrainConfig,
    parameters_billion: Option<f64>,
    available_gb: Option<f64>,
) -> Result<MemoryEstimate> {
    let params = parameters_billion
        .or_else(|| parse_parameter_count(&config.base_model))
        .filter(|p| *p > 0.0)
        .ok_or_else(|| {
            TrainError::Configuration(format!(
                "cannot infer parameter count from '{}'; pass it explicitly",
                config.base_model
            ))
        })?;

    let bytes_per_weight = if config.fp16 { 2.0 } else { 4.0 };
    let weights_gb = params * 1e9 * bytes_per_weight / GIB;

    let module_scale = config.lora.target_modules.len() as f64 / 4.0;
    let rank_scale = f64::from(config.lora.r) / 16.0;
    let adapter_params = params * 1e9 * ADAPTER_RATIO_AT_R16 * rank_scale * module_scale;
    let adapter_state_gb = adapter_params * ADAPTER_STATE_BYTES / GIB;

    let tokens = f64::from(config.batch_size) * f64::from(config.max_length);
    let activations_gb = tokens * params.sqrt() * ACTIVATION_BYTES_PER_TOKEN / GIB;

    let total_gb = weights_gb + adapter_state_gb + activations_gb + OVERHEAD_GB;

    let mut estimate = MemoryEstimate {
        parameters_billion: params,
        weights_gb: round1(weights_gb),
        adapter_state_gb: round1(adapter_state_gb),
        activations_gb: round1(activations_gb),
        total_gb: round1(total_gb),
        available_gb,
        recommendations: Vec::new(),
    };
    estimate.recommendations = recommendations(config, &estimate, activations_gb);
    Ok(estimate)
}

fn recommendations(config: &TrainConfig, estimate: &MemoryEstimate, activations_gb: f64) -> Vec<String> {
    let mut out = Vec::new();
    if !config.fp16 {
        out.push("enable fp16 to halve base weight memory".to_string());
    }

    let Some(available) = estimate.available_gb else {
        return out;
    };
    if estimate.total_gb <= available {
        return out;
    }

    if config.batch_size > 1 {
        let batch = config.batch_size / 2;
        let target = config.effective_batch_size();
        let accum = target.div_ceil(batch);
        let effective = batch.saturating_mul(accum);
        let saved = activations_gb - activations_gb * f64::from(batch) / f64::from(config.batch_size);
        let effect = if effective == target {
            format!("same effective batch of {effective}")
        } else {
            format!("effective batch {effective} instead of {target}")
        };
        out.push(format!(
            "lower batch_size to {batch} and raise gradient_accumulation_steps to {accum} \
             ({effect}, about {saved:.1} GB less)"
        ));
    }
    if config.max_length > 256 {
        out.push(format!(
            "shorten max_length from {} to {} if descriptions allow",
            config.max_length,
            config.max_length / 2
        ));
    }
    if estimate.weights_gb > available * 0.8 {
        out.push("base weights alone nearly fill memory; choose a smaller base model".to_string());
    }
    out
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parameter_count() {
        assert_eq!(parse_parameter_count("Qwen/Qwen2.5-0.5B-Instruct"), Some(0.5));
        assert_eq!(parse_parameter_count("Qwen/Qwen2.5-7B-Instruct"), Some(7.0));
        assert_eq!(parse_parameter_count("meta-llama/Llama-3.1-8b"), Some(8.0));
        assert_eq!(parse_parameter_count("HuggingFaceTB/SmolLM-135M"), Some(0.135));
        assert_eq!(parse_parameter_count("gpt2"), None);
    }

    #[test]
    fn test_estimate_default_model() {
        let estimate = estimate_memory(&TrainConfig::default(), None, None).unwrap();
        assert_eq!(estimate.parameters_billion, 0.5);
        // 0.5e9 fp16 weights is just under 1 GiB
        assert!((estimate.weights_gb - 0.9).abs() < 0.11);
        assert!(estimate.total_gb > estimate.weights_gb);
        assert!(!estimate.exceeds_available());
    }

    #[test]
    fn test_batch_size_drives_activation_memory() {
        let small = TrainConfig {
            batch_size: 1,
            ..Default::default()
        };
        let large = TrainConfig {
            batch_size: 8,
            ..Default::default()
        };
        let a = estimate_memory(&small, None, None).unwrap();
        let b = estimate_memory(&large, None, None).unwrap();
        assert!(b.activations_gb > a.activations_gb);
        assert_eq!(a.weights_gb, b.weights_gb);
    }

    #[test]
    fn test_recommends_gradient_accumulation_when_over_budget() {
        let config = TrainConfig {
            base_model: "Qwen/Qwen2.5-7B-Instruct".to_string(),
            ..Default::default()
        };
        let estimate = estimate_memory(&config, None, Some(8.0)).unwrap();
        assert!(estimate.exceeds_available());
        assert!(estimate
            .recommendations
            .iter()
            .any(|r| r.contains("batch_size to 2") && r.contains("gradient_accumulation_steps to 8")));
    }

    #[test]
    fn test_batch_advice_reports_resulting_effective_batch() {
        let odd = TrainConfig {
            base_model: "Qwen/Qwen2.5-7B-Instruct".to_string(),
            batch_size: 5,
            gradient_accumulation_steps: 1,
            ..Default::default()
        };
        let estimate = estimate_memory(&odd, None, Some(8.0)).unwrap();
        assert!(estimate.recommendations.iter().any(|r| r.contains("batch_size to 2")
            && r.contains("gradient_accumulation_steps to 3")
            && r.contains("effective batch 6 instead of 5")));

        let divisible = TrainConfig {
            gradient_accumulation_steps: 4,
            ..odd
        };
        let estimate = estimate_memory(&divisible, None, Some(8.0)).unwrap();
        assert!(estimate
            .recommendations
            .iter()
            .any(|r| r.contains("gradient_accumulation_steps to 10") && r.contains("same effective batch of 20")));
    }

    #[test]
    fn test_batch_advice_survives_huge_accumulation() {
        let config = TrainConfig {
            base_model: "Qwen/Qwen2.5-7B-Instruct".to_string(),
            gradient_accumulation_steps: u32::MAX,
            ..Default::default()
        };
        let estimate = estimate_memory(&config, None, Some(8.0)).unwrap();
        assert!(estimate.recommendations.iter().any(|r| r.contains("batch_size to 2")));
    }

    #[test]
    fn test_unknown_size_needs_explicit_count() {
        let config = TrainConfig {
            base_model: "gpt2".to_string(),
            ..Default::default()
        };
        let err = estimate_memory(&config, None, None).unwrap_err();
        assert!(matches!(err, TrainError::Configuration(_)));

        let estimate = estimate_memory(&config, Some(0.124), None).unwrap();
        assert_eq!(estimate.parameters_billion, 0.124);
    }
}
