//! Dataset preparation
//!
//! Reads the dataset artifact, excludes records that fail validation, splits
//! the rest into train and eval sets with a seeded shuffle and writes both as
//! JSON Lines of prompt-formatted `text` under `<output_dir>/data/`. The input
//! artifact is only read.

use std::io::Write;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use shot_schema::{dataset_digest, read_dataset, training_text, DatasetReport, TrainingExample};
use tracing::{info, warn};

use crate::config::TrainConfig;
use crate::error::{Result, TrainError};

pub const DATA_DIR: &str = "data";
pub const TRAIN_FILE: &str = "train.jsonl";
pub const EVAL_FILE: &str = "eval.jsonl";

/// Formatted training splits on disk
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub source: PathBuf,
    /// SHA-256 of the source artifact
    pub digest: String,
    pub report: DatasetReport,
    pub train_path: PathBuf,
    pub eval_path: PathBuf,
    pub train_count: usize,
    pub eval_count: usize,
}

#[derive(Serialize)]
struct TextRecord<'a> {
    text: &'a str,
}

/// Number of examples held out for evaluation.
///
/// At least one when any are requested and two or more examples exist, and
/// never all of them.
pub fn eval_split_size(valid: usize, fraction: f64) -> usize {
    if valid < 2 || fraction <= 0.0 {
        return 0;
    }
    let wanted = (valid as f64 * fraction).round() as usize;
    wanted.clamp(1, valid - 1)
}

/// Validate, split and format the dataset at `dataset`.
pub fn prepare_dataset(dataset: &Path, config: &TrainConfig) -> Result<PreparedDataset> {
    let digest = dataset_digest(dataset)?;
    let (mut examples, report) = read_dataset(dataset)?;

    if !report.is_clean() {
        warn!(
            rejected = report.rejected_count(),
            total = report.total,
            "Excluding invalid dataset records"
        );
    }
    if examples.is_empty() {
        return Err(TrainError::Configuration(format!(
            "no valid training records in {} ({} rejected)",
            dataset.display(),
            report.rejected_count()
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    examples.shuffle(&mut rng);
    let eval_count = eval_split_size(examples.len(), config.eval_fraction);
    let eval = examples.split_off(examples.len() - eval_count);

    let data_dir = config.output_dir.join(DATA_DIR);
    std::fs::create_dir_all(&data_dir)?;
    let train_path = data_dir.join(TRAIN_FILE);
    let eval_path = data_dir.join(EVAL_FILE);
    write_jsonl(&train_path, &examples)?;
    write_jsonl(&eval_path, &eval)?;

    info!(
        dataset = %dataset.display(),
        valid = report.valid,
        rejected = report.rejected_count(),
        train = examples.len(),
        eval = eval.len(),
        "Prepared training data"
    );

    Ok(PreparedDataset {
        source: dataset.to_path_buf(),
        digest,
        report,
        train_path,
        eval_path,
        train_count: examples.len(),
        eval_count: eval.len(),
    })
}

fn write_jsonl(path: &Path, examples: &[TrainingExample]) -> Result<()> {
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    for example in examples {
        let text = training_text(example)?;
        serde_json::to_writer(&mut out, &TextRecord { text: &text })?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(input: &str) -> serde_json::Value {
        json!({
            "input": input,
            "output": {
                "shot_name": "Dolly Shot",
                "duration": 4,
                "path": {"type": "dolly", "distance": 2},
                "constraint": {"type": "look_at", "target": "$SELECTED"},
                "modifiers": []
            }
        })
    }

    fn write_fixture(dir: &Path, values: Vec<serde_json::Value>) -> PathBuf {
        let path = dir.join("dataset.json");
        std::fs::write(&path, serde_json::to_string_pretty(&values).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_eval_split_size() {
        assert_eq!(eval_split_size(0, 0.1), 0);
        assert_eq!(eval_split_size(1, 0.1), 0);
        assert_eq!(eval_split_size(2, 0.1), 1);
        assert_eq!(eval_split_size(100, 0.1), 10);
        assert_eq!(eval_split_size(100, 0.0), 0);
        assert_eq!(eval_split_size(3, 0.9), 2);
    }

    #[test]
    fn test_invalid_records_are_excluded_and_reported() {
        let dir = tempdir().unwrap();
        let mut values: Vec<_> = (0..20).map(|i| record(&format!("推进镜头 {i}"))).collect();
        values[3]["output"]["path"]["distance"] = json!(0);
        values[7] = json!({"input": "no output"});
        let dataset = write_fixture(dir.path(), values);

        let config = TrainConfig {
            output_dir: dir.path().join("out"),
            ..Default::default()
        };
        let prepared = prepare_dataset(&dataset, &config).unwrap();

        assert_eq!(prepared.report.total, 20);
        assert_eq!(prepared.report.valid, 18);
        let indices: Vec<usize> = prepared.report.rejected.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![3, 7]);
        assert_eq!(prepared.train_count + prepared.eval_count, 18);
        assert_eq!(prepared.eval_count, 2);

        let train = std::fs::read_to_string(&prepared.train_path).unwrap();
        assert_eq!(train.lines().count(), prepared.train_count);
        for line in train.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            let text = value["text"].as_str().unwrap();
            assert!(text.starts_with("### 输入:\n"));
            assert!(text.contains("\n\n### 输出:\n{"));
        }
    }

    #[test]
    fn test_zero_valid_records_is_configuration_error() {
        let dir = tempdir().unwrap();
        let dataset = write_fixture(dir.path(), vec![json!({"input": ""}), json!(42)]);
        let config = TrainConfig {
            output_dir: dir.path().join("out"),
            ..Default::default()
        };
        let err = prepare_dataset(&dataset, &config).unwrap_err();
        assert!(matches!(err, TrainError::Configuration(_)));
    }

    #[test]
    fn test_source_artifact_is_not_modified() {
        let dir = tempdir().unwrap();
        let dataset = write_fixture(
            dir.path(),
            (0..5).map(|i| record(&format!("镜头 {i}"))).collect(),
        );
        let before = std::fs::read(&dataset).unwrap();

        let config = TrainConfig {
            output_dir: dir.path().join("out"),
            ..Default::default()
        };
        let prepared = prepare_dataset(&dataset, &config).unwrap();

        assert_eq!(std::fs::read(&dataset).unwrap(), before);
        assert_eq!(prepared.digest, dataset_digest(&dataset).unwrap());
    }

    #[test]
    fn test_split_is_deterministic_for_a_seed() {
        let dir = tempdir().unwrap();
        let dataset = write_fixture(
            dir.path(),
            (0..30).map(|i| record(&format!("镜头 {i}"))).collect(),
        );
        let run = |name: &str| {
            let config = TrainConfig {
                output_dir: dir.path().join(name),
                ..Default::default()
            };
            let prepared = prepare_dataset(&dataset, &config).unwrap();
            std::fs::read_to_string(prepared.eval_path).unwrap()
        };
        assert_eq!(run("a"), run("b"));
    }
}
