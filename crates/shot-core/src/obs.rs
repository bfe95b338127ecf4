//! Structured lifecycle events for pipeline stages.
//!
//! Every stage run (generate, validate, train, infer, export) is wrapped in a
//! [`StageSpan`] and reports `stage.started` / `stage.finished`; stage
//! summaries carry the counts operators grep for.

use std::path::Path;
use std::time::Instant;

use shot_datagen::GenerationReport;
use shot_schema::{DatasetReport, ShotParameterRecord};
use shot_trainer::{MemoryEstimate, TrainingManifest};
use tracing::{info, warn, Span};

/// One stage run: owns a `shot.stage` span and emits `stage.started` on
/// creation. Async work attaches with `.instrument(stage.span().clone())`.
pub struct StageSpan {
    stage: &'static str,
    started: Instant,
    span: Span,
}

impl StageSpan {
    pub fn start(stage: &'static str) -> Self {
        let span = tracing::info_span!("shot.stage", stage = stage);
        span.in_scope(|| info!(event = "stage.started", stage = stage));
        StageSpan {
            stage,
            started: Instant::now(),
            span,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Emit `stage.finished`, or `stage.failed` followed by it on error.
    pub fn finish<T, E: std::fmt::Display>(self, result: &Result<T, E>) {
        let _entered = self.span.enter();
        if let Err(err) = result {
            emit_stage_failed(self.stage, err);
        }
        emit_stage_finished(self.stage, self.elapsed_ms(), result.is_ok());
    }
}

/// Emit event: stage finished with duration and outcome.
pub fn emit_stage_finished(stage: &str, duration_ms: u64, success: bool) {
    info!(
        event = "stage.finished",
        stage = %stage,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: stage aborted (warning level).
pub fn emit_stage_failed(stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "stage.failed", stage = %stage, error = %error);
}

/// Emit event: dataset generation summary.
pub fn emit_generation_finished(report: &GenerationReport) {
    info!(
        event = "generation.finished",
        mode = %report.mode,
        requested = report.requested,
        produced = report.produced,
        requests = report.requests,
        failed_requests = report.failed_requests,
        rejected_records = report.rejected_records.len(),
    );
}

/// Emit event: dataset validated.
pub fn emit_dataset_validated(path: &Path, report: &DatasetReport) {
    info!(
        event = "dataset.validated",
        path = %path.display(),
        total = report.total,
        valid = report.valid,
        rejected = report.rejected_count(),
    );
}

/// Emit event: memory estimate computed.
pub fn emit_memory_estimated(estimate: &MemoryEstimate) {
    info!(
        event = "training.memory_estimated",
        parameters_billion = estimate.parameters_billion,
        total_gb = estimate.total_gb,
        exceeds_available = estimate.exceeds_available(),
    );
}

/// Emit event: training run recorded.
pub fn emit_training_finished(manifest: &TrainingManifest) {
    info!(
        event = "training.finished",
        run_id = %manifest.run_id,
        base_model = %manifest.base_model,
        valid_records = manifest.valid_records,
        rejected_records = manifest.rejected_records.len(),
        final_loss = manifest.final_loss,
    );
}

/// Emit event: shot record produced by inference.
pub fn emit_shot_generated(record: &ShotParameterRecord) {
    info!(
        event = "inference.shot_generated",
        shot_name = %record.shot_name,
        path = record.path.tag(),
        constraint = record.constraint.tag(),
        modifiers = record.modifiers.len(),
        duration = record.duration,
    );
}
