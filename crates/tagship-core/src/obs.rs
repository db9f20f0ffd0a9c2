//! Structured observability hooks for pipeline and job lifecycle events.
//!
//! Every event carries an `event` field (`run.started`, `job.finished`, ...)
//! so JSON logs can be filtered without parsing messages.

use tracing::{info, warn, Span};

use crate::error::JobStage;
use crate::matrix::JobSpec;
use crate::trigger::TriggerDecision;

/// Run-scoped span; attach with `tracing::Instrument` so every event carries
/// `run_id`, including those emitted from spawned job tasks.
pub fn run_span(run_id: &str) -> Span {
    tracing::info_span!("tagship.run", run_id = %run_id)
}

/// Job-scoped span, nested under the run span.
pub fn job_span(job: &JobSpec) -> Span {
    tracing::info_span!("tagship.job", binary = %job.binary, target = %job.target)
}

/// Emit event: trigger evaluated.
pub fn emit_trigger_evaluated(git_ref: &str, decision: &TriggerDecision) {
    info!(
        event = "trigger.evaluated",
        git_ref = %git_ref,
        class = %decision.class,
        should_run = decision.should_run,
        publishable = decision.is_publishable,
    );
}

/// Emit event: run started with its job count.
pub fn emit_run_started(run_id: &str, jobs: usize, publishable: bool) {
    info!(event = "run.started", run_id = %run_id, jobs = jobs, publishable = publishable);
}

/// Emit event: one job step finished successfully.
pub fn emit_job_step(job: &JobSpec, stage: JobStage) {
    info!(
        event = "job.step",
        binary = %job.binary,
        target = %job.target,
        stage = %stage,
    );
}

/// Emit event: job failed at `stage`.
pub fn emit_job_failed(job: &JobSpec, stage: JobStage, error: &str) {
    warn!(
        event = "job.failed",
        binary = %job.binary,
        target = %job.target,
        stage = %stage,
        error = %error,
    );
}

/// Emit event: run finished.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, passed: usize, failed: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        passed = passed,
        failed = failed,
    );
}
