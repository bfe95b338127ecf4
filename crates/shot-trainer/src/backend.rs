//! Training backends
//!
//! The gradient work happens outside this process. A [`TrainingBackend`]
//! receives the written [`TrainingPlan`] and must leave adapter weights and
//! tokenizer state in the plan's output directory. [`CommandBackend`] runs an
//! operator-supplied command and follows its progress protocol on stdout:
//!
//! ```text
//! PROGRESS:<percent>:<step>/<total>:Loss: <loss>
//! TRAINING_COMPLETE
//! ```

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, TrainError};
use crate::plan::TrainingPlan;

pub const PROGRESS_PREFIX: &str = "PROGRESS:";
pub const COMPLETE_MARKER: &str = "TRAINING_COMPLETE";

/// Environment variable carrying the plan path to the backend command.
pub const PLAN_ENV: &str = "SHOT_TRAIN_PLAN";

const STDERR_TAIL_LINES: usize = 20;

/// One parsed progress report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingProgress {
    pub percent: u32,
    pub step: Option<u64>,
    pub total: Option<u64>,
    pub loss: Option<f64>,
}

fn step_regex() -> &'static Regex {
    static STEP: OnceLock<Regex> = OnceLock::new();
    STEP.get_or_init(|| Regex::new(r"(\d+)\s*/\s*(\d+)").expect("valid step regex"))
}

/// Parse a `PROGRESS:` line. Step and loss are optional.
pub fn parse_progress_line(line: &str) -> Option<TrainingProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let (percent, detail) = rest.split_once(':').unwrap_or((rest, ""));
    let percent: u32 = percent.trim().parse().ok()?;

    let (step, total) = match step_regex().captures(detail) {
        Some(caps) => (
            caps.get(1).and_then(|m| m.as_str().parse().ok()),
            caps.get(2).and_then(|m| m.as_str().parse().ok()),
        ),
        None => (None, None),
    };

    let loss = detail
        .split_once("Loss:")
        .and_then(|(_, tail)| tail.trim().split([',', ' ']).next())
        .and_then(|value| value.parse().ok());

    Some(TrainingProgress {
        percent: percent.min(100),
        step,
        total,
        loss,
    })
}

/// What a backend reported while running
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendOutcome {
    /// Completion marker seen
    pub completed: bool,
    pub final_loss: Option<f64>,
    pub last_progress: Option<TrainingProgress>,
    pub duration_ms: u64,
}

impl BackendOutcome {
    /// Fold one line of backend output into the outcome.
    pub fn observe(&mut self, line: &str) {
        if let Some(progress) = parse_progress_line(line) {
            info!(
                event = "training.progress",
                percent = progress.percent,
                step = progress.step,
                total = progress.total,
                loss = progress.loss,
                "Training progress"
            );
            if progress.loss.is_some() {
                self.final_loss = progress.loss;
            }
            self.last_progress = Some(progress);
        } else if line.contains(COMPLETE_MARKER) {
            info!(event = "training.complete_marker", "Backend reported completion");
            self.completed = true;
        } else {
            debug!(target: "shot_trainer::backend_output", "{line}");
        }
    }
}

/// Executes a [`TrainingPlan`]
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Run the plan to completion. `plan_path` points at the written plan.
    async fn run(&self, plan: &TrainingPlan, plan_path: &Path) -> Result<BackendOutcome>;
}

/// Runs an external command with the plan path as its last argument
#[derive(Debug, Clone)]
pub struct CommandBackend {
    command: Vec<String>,
    timeout_secs: u64,
}

impl CommandBackend {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() || command[0].trim().is_empty() {
            return Err(TrainError::Configuration(
                "training backend command is empty".to_string(),
            ));
        }
        Ok(CommandBackend {
            command,
            timeout_secs: 0,
        })
    }

    /// Split a command line on whitespace. No shell quoting is applied.
    pub fn from_command_line(line: &str) -> Result<Self> {
        Self::new(line.split_whitespace().map(String::from).collect())
    }

    /// Abort the backend after `secs` seconds; zero disables the limit.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl TrainingBackend for CommandBackend {
    fn name(&self) -> &str {
        &self.command[0]
    }

    async fn run(&self, plan: &TrainingPlan, plan_path: &Path) -> Result<BackendOutcome> {
        let start = Instant::now();
        let exe = &self.command[0];

        info!(
            backend = %exe,
            run_id = %plan.run_id,
            total_steps = plan.total_steps,
            "Starting training backend"
        );

        let mut child = Command::new(exe)
            .args(&self.command[1..])
            .arg(plan_path)
            .env(PLAN_ENV, plan_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TrainError::Backend(format!("failed to start '{exe}': {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TrainError::Backend("backend stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TrainError::Backend("backend stderr not captured".to_string()))?;
        let stderr_task = tokio::spawn(collect_tail(stderr, STDERR_TAIL_LINES));

        let monitor = async {
            let mut outcome = BackendOutcome::default();
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                outcome.observe(&line);
            }
            let status = child.wait().await?;
            Ok::<_, TrainError>((outcome, status))
        };

        let (mut outcome, status) = if self.timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(self.timeout_secs), monitor)
                .await
                .map_err(|_| TrainError::Timeout(self.timeout_secs))??
        } else {
            monitor.await?
        };

        let stderr_tail = stderr_task.await.unwrap_or_default();
        outcome.duration_ms = start.elapsed().as_millis() as u64;

        if !status.success() {
            return Err(TrainError::BackendFailed {
                code: status.code(),
                stderr_tail,
            });
        }
        if !outcome.completed {
            warn!(backend = %exe, "Backend exited without completion marker");
        }
        Ok(outcome)
    }
}

async fn collect_tail<R>(reader: R, keep: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(keep);
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "shot_trainer::backend_output", stream = "stderr", "{line}");
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        let progress = parse_progress_line("PROGRESS:45:90/200:Loss: 0.4213").unwrap();
        assert_eq!(progress.percent, 45);
        assert_eq!(progress.step, Some(90));
        assert_eq!(progress.total, Some(200));
        assert_eq!(progress.loss, Some(0.4213));
    }

    #[test]
    fn test_parse_progress_line_with_eta_and_extras() {
        let progress =
            parse_progress_line("PROGRESS:60:2m13s:Step 120/200, Loss: 0.3100, LR: 1.2e-04")
                .unwrap();
        assert_eq!(progress.percent, 60);
        assert_eq!(progress.step, Some(120));
        assert_eq!(progress.loss, Some(0.31));
    }

    #[test]
    fn test_parse_progress_line_minimal() {
        let progress = parse_progress_line("PROGRESS:0").unwrap();
        assert_eq!(progress.percent, 0);
        assert_eq!(progress.step, None);
        assert_eq!(progress.loss, None);
    }

    #[test]
    fn test_parse_progress_line_rejects_other_lines() {
        assert!(parse_progress_line("Loading model...").is_none());
        assert!(parse_progress_line("PROGRESS:abc:1/2").is_none());
    }

    #[test]
    fn test_outcome_tracks_last_loss_and_marker() {
        let mut outcome = BackendOutcome::default();
        outcome.observe("PROGRESS:50:5/10:Loss: 0.9");
        outcome.observe("PROGRESS:90:9/10");
        outcome.observe("saving adapter");
        assert_eq!(outcome.final_loss, Some(0.9));
        assert!(!outcome.completed);
        outcome.observe("TRAINING_COMPLETE");
        assert!(outcome.completed);
        assert_eq!(outcome.last_progress.unwrap().step, Some(9));
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let err = CommandBackend::from_command_line("   ").unwrap_err();
        assert!(matches!(err, TrainError::Configuration(_)));
    }
}
