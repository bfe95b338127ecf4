//! End-to-end training runs against fake and scripted backends.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use shot_trainer::{
    BackendOutcome, CommandBackend, TrainConfig, TrainError, Trainer, TrainingBackend,
    TrainingManifest, TrainingPlan,
};
use tempfile::{tempdir, TempDir};

/// Backend that writes the expected artifacts and records the plan it saw
#[derive(Default)]
struct FakeBackend {
    write_outputs: bool,
    seen: Mutex<Option<TrainingPlan>>,
}

impl FakeBackend {
    fn working() -> Self {
        FakeBackend {
            write_outputs: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TrainingBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn run(&self, plan: &TrainingPlan, plan_path: &Path) -> shot_trainer::Result<BackendOutcome> {
        assert!(plan_path.is_file());
        assert!(plan.train_file.is_file());
        *self.seen.lock().unwrap() = Some(plan.clone());

        if self.write_outputs {
            for name in ["adapter_config.json", "adapter_model.safetensors", "tokenizer.json"] {
                std::fs::write(plan.output_dir.join(name), b"{}")?;
            }
        }

        let mut outcome = BackendOutcome::default();
        outcome.observe("PROGRESS:100:3/3:Loss: 0.1234");
        outcome.observe("TRAINING_COMPLETE");
        Ok(outcome)
    }
}

fn record(input: &str, distance: f64) -> serde_json::Value {
    json!({
        "input": input,
        "output": {
            "shot_name": "Dolly Shot",
            "duration": 4,
            "path": {"type": "dolly", "distance": distance},
            "constraint": {"type": "look_at", "target": "$SELECTED"},
            "modifiers": [{"type": "handheld", "intensity": 0.2}]
        }
    })
}

fn fixture(valid: usize, invalid: usize) -> (TempDir, PathBuf, TrainConfig) {
    let dir = tempdir().unwrap();
    let mut values: Vec<_> = (0..valid).map(|i| record(&format!("推进镜头 {i}"), 2.0)).collect();
    values.extend((0..invalid).map(|i| record(&format!("坏镜头 {i}"), 0.0)));

    let dataset = dir.path().join("dataset.json");
    std::fs::write(&dataset, serde_json::to_string_pretty(&values).unwrap()).unwrap();
    let config = TrainConfig {
        output_dir: dir.path().join("model"),
        ..Default::default()
    };
    (dir, dataset, config)
}

/// Test: invalid records are excluded, counted, and training proceeds
#[tokio::test]
async fn test_training_proceeds_on_valid_subset() {
    let (_dir, dataset, config) = fixture(18, 2);
    let backend = Arc::new(FakeBackend::working());
    let trainer = Trainer::new(config.clone(), backend.clone());

    let outcome = trainer.train(&dataset).await.unwrap();
    let manifest = outcome.manifest;

    assert_eq!(manifest.total_records, 20);
    assert_eq!(manifest.valid_records, 18);
    assert_eq!(manifest.rejected_records.len(), 2);
    assert_eq!(manifest.rejected_records[0].index, 18);
    assert!(manifest.rejected_records[0].reason.contains("output.path.distance"));
    assert_eq!(manifest.train_records + manifest.eval_records, 18);
    assert_eq!(manifest.final_loss, Some(0.1234));
    assert!(outcome.backend.completed);

    let seen = backend.seen.lock().unwrap().clone().unwrap();
    assert_eq!(seen.run_id, manifest.run_id);
    assert_eq!(seen.train_examples, manifest.train_records);

    assert_eq!(TrainingManifest::read(&config.output_dir).unwrap(), manifest);
}

/// Test: the dataset artifact is byte-identical after training
#[tokio::test]
async fn test_dataset_is_not_mutated() {
    let (_dir, dataset, config) = fixture(10, 1);
    let before = std::fs::read(&dataset).unwrap();

    Trainer::new(config, Arc::new(FakeBackend::working()))
        .train(&dataset)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dataset).unwrap(), before);
}

/// Test: no valid records aborts before the backend runs
#[tokio::test]
async fn test_zero_valid_records_aborts() {
    let (_dir, dataset, config) = fixture(0, 3);
    let backend = Arc::new(FakeBackend::working());
    let err = Trainer::new(config, backend.clone())
        .train(&dataset)
        .await
        .unwrap_err();

    assert!(matches!(err, TrainError::Configuration(_)));
    assert!(backend.seen.lock().unwrap().is_none());
}

/// Test: invalid hyperparameters abort before the dataset is read
#[tokio::test]
async fn test_invalid_config_aborts() {
    let (_dir, dataset, config) = fixture(5, 0);
    let config = TrainConfig {
        learning_rate: 0.0,
        ..config
    };
    let err = Trainer::new(config, Arc::new(FakeBackend::working()))
        .train(&dataset)
        .await
        .unwrap_err();
    assert!(matches!(err, TrainError::Configuration(_)));
}

/// Test: a backend that leaves no weights fails verification
#[tokio::test]
async fn test_missing_outputs_fail_the_run() {
    let (_dir, dataset, config) = fixture(5, 0);
    let err = Trainer::new(config.clone(), Arc::new(FakeBackend::default()))
        .train(&dataset)
        .await
        .unwrap_err();

    assert!(matches!(err, TrainError::MissingArtifacts(_)));
    assert!(!config.output_dir.join(shot_schema::MANIFEST_FILE).exists());
}

/// Leave outputs from an earlier run in `dir`, dated an hour back
fn leftover_outputs(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    let hour_ago = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
    for name in ["adapter_config.json", "adapter_model.safetensors", "tokenizer.json"] {
        let path = dir.join(name);
        std::fs::write(&path, b"{}").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(hour_ago)
            .unwrap();
    }
}

/// Test: outputs left by an earlier run do not count for a run that wrote nothing
#[tokio::test]
async fn test_leftover_outputs_do_not_satisfy_verification() {
    let (_dir, dataset, config) = fixture(5, 0);
    leftover_outputs(&config.output_dir);

    let err = Trainer::new(config.clone(), Arc::new(FakeBackend::default()))
        .train(&dataset)
        .await
        .unwrap_err();

    assert!(matches!(err, TrainError::MissingArtifacts(_)));
    assert!(!config.output_dir.join(shot_schema::MANIFEST_FILE).exists());
}

/// Test: retraining into the same directory succeeds once outputs are rewritten
#[tokio::test]
async fn test_rewritten_outputs_pass_verification() {
    let (_dir, dataset, config) = fixture(5, 0);
    leftover_outputs(&config.output_dir);

    let outcome = Trainer::new(config.clone(), Arc::new(FakeBackend::working()))
        .train(&dataset)
        .await
        .unwrap();
    assert_eq!(outcome.manifest.valid_records, 5);
}

/// Test: dry-run planning writes splits but nothing else
#[test]
fn test_plan_without_training() {
    let (_dir, dataset, config) = fixture(10, 0);
    let trainer = Trainer::new(config.clone(), Arc::new(FakeBackend::working()));

    let (prepared, plan) = trainer.plan(&dataset).unwrap();
    assert_eq!(prepared.train_count, 9);
    assert_eq!(prepared.eval_count, 1);
    assert_eq!(plan.total_steps, 3);
    assert!(!config.output_dir.join(shot_trainer::PLAN_FILE).exists());
}

#[cfg(unix)]
mod command_backend {
    use super::*;

    const WRITE_OUTPUTS: &str = r#"out=$(dirname "$1")
echo "PROGRESS:50:1/2:Loss: 0.8"
echo "PROGRESS:100:2/2:Loss: 0.42"
for f in adapter_config.json adapter_model.safetensors tokenizer.json; do
  echo '{}' > "$out/$f"
done
echo TRAINING_COMPLETE"#;

    fn sh(script: &str) -> CommandBackend {
        CommandBackend::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
        ])
        .unwrap()
    }

    /// Test: progress protocol is followed and outputs are verified
    #[tokio::test]
    async fn test_script_backend_completes() {
        let (_dir, dataset, config) = fixture(6, 0);
        let outcome = Trainer::new(config, Arc::new(sh(WRITE_OUTPUTS)))
            .train(&dataset)
            .await
            .unwrap();

        assert!(outcome.backend.completed);
        assert_eq!(outcome.manifest.final_loss, Some(0.42));
        assert_eq!(outcome.manifest.backend, "sh");
        let last = outcome.backend.last_progress.unwrap();
        assert_eq!((last.step, last.total), (Some(2), Some(2)));
    }

    /// Test: non-zero exit surfaces the exit code and stderr
    #[tokio::test]
    async fn test_script_backend_failure() {
        let (_dir, dataset, config) = fixture(3, 0);
        let err = Trainer::new(
            config,
            Arc::new(sh("echo 'CUDA out of memory' >&2; exit 3")),
        )
        .train(&dataset)
        .await
        .unwrap_err();

        match err {
            TrainError::BackendFailed { code, stderr_tail } => {
                assert_eq!(code, Some(3));
                assert!(stderr_tail.contains("CUDA out of memory"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Test: the timeout aborts a hung backend
    #[tokio::test]
    async fn test_script_backend_timeout() {
        let (_dir, dataset, config) = fixture(3, 0);
        let backend = sh("sleep 10").with_timeout_secs(1);
        let err = Trainer::new(config, Arc::new(backend))
            .train(&dataset)
            .await
            .unwrap_err();
        assert!(matches!(err, TrainError::Timeout(1)));
    }

    /// Test: a command that cannot be started is a backend error
    #[tokio::test]
    async fn test_missing_program() {
        let (_dir, dataset, config) = fixture(3, 0);
        let backend = CommandBackend::from_command_line("/nonexistent/shot-train-backend").unwrap();
        let err = Trainer::new(config, Arc::new(backend))
            .train(&dataset)
            .await
            .unwrap_err();
        assert!(matches!(err, TrainError::Backend(_)));
    }
}
