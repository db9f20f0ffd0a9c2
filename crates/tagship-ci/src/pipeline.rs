//! Release pipeline orchestration.
//!
//! One run per event: evaluate the trigger, expand the matrix, then run every
//! job on its own tokio task. Steps inside a job are strictly sequential
//! (build, archive, store, publish); jobs never wait on each other.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, Instrument};
use uuid::Uuid;

use tagship_core::obs::{
    emit_job_failed, emit_job_step, emit_run_finished, emit_run_started, emit_trigger_evaluated,
};
use tagship_core::{
    job_span, run_span, Archiver, ArtifactStore, BuildExecutor, Event, JobError, JobSpec,
    JobStage, MatrixConfig, PublishError, PublishGate, ReleasePublisher, RunPlan, TriggerConfig,
    TriggerDecision,
};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Terminal status of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed { stage: JobStage, error: String },
}

/// Outcome of one (binary, target) job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job: JobSpec,

    pub status: JobStatus,

    /// Archive name, set once packaging succeeded.
    pub artifact_name: Option<String>,

    /// SHA-256 of the archive bytes.
    pub sha256: Option<String>,

    /// The archive reached the artifact store.
    pub stored: bool,

    /// The archive was attached to a release.
    pub published: bool,

    pub duration_ms: u64,
}

impl JobReport {
    fn pending(job: JobSpec) -> Self {
        Self {
            job,
            status: JobStatus::Succeeded,
            artifact_name: None,
            sha256: None,
            stored: false,
            published: false,
            duration_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    /// Stage that failed, if any.
    pub fn failed_stage(&self) -> Option<JobStage> {
        match &self.status {
            JobStatus::Succeeded => None,
            JobStatus::Failed { stage, .. } => Some(*stage),
        }
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The event matched no trigger; nothing was built.
    Skipped,
    Succeeded,
    /// At least one job failed.
    Failed,
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,

    pub started_at: DateTime<Utc>,

    pub event: Event,

    pub decision: TriggerDecision,

    /// Job reports, in matrix order.
    pub jobs: Vec<JobReport>,

    pub status: RunStatus,

    pub duration_ms: u64,
}

impl RunReport {
    pub fn passed_count(&self) -> usize {
        self.jobs.iter().filter(|j| j.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.jobs.iter().filter(|j| !j.passed()).count()
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Collaborators and settings shared by every job task of a run.
struct JobContext {
    builder: Arc<dyn BuildExecutor>,
    archiver: Arc<dyn Archiver>,
    store: Arc<dyn ArtifactStore>,
    publisher: Option<Arc<dyn ReleasePublisher>>,
    decision: TriggerDecision,
    tag: String,
    timeout: Option<Duration>,
}

/// Tag-gated cross-build and release pipeline.
pub struct ReleasePipeline {
    trigger: TriggerConfig,
    matrix: MatrixConfig,
    builder: Arc<dyn BuildExecutor>,
    archiver: Arc<dyn Archiver>,
    store: Arc<dyn ArtifactStore>,
    publisher: Option<Arc<dyn ReleasePublisher>>,
    job_timeout: Option<Duration>,
}

impl ReleasePipeline {
    pub fn new(
        trigger: TriggerConfig,
        matrix: MatrixConfig,
        builder: Arc<dyn BuildExecutor>,
        archiver: Arc<dyn Archiver>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            trigger,
            matrix,
            builder,
            archiver,
            store,
            publisher: None,
            job_timeout: None,
        }
    }

    /// Release host for tag runs. Without one, a publishable job fails at the
    /// publish step with [`PublishError::NotConfigured`].
    pub fn with_publisher(mut self, publisher: Arc<dyn ReleasePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Bound the wall-clock time of a whole job.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Trigger decision and job list for `event`, without running anything.
    pub fn plan(&self, event: &Event) -> RunPlan {
        RunPlan::new(&self.trigger, &self.matrix, event)
    }

    /// Execute one pipeline run for `event`.
    pub async fn run(&self, event: &Event) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let span = run_span(&run_id);
        self.run_inner(run_id, event).instrument(span).await
    }

    async fn run_inner(&self, run_id: String, event: &Event) -> RunReport {
        let started_at = Utc::now();
        let start = Instant::now();

        let RunPlan { decision, jobs } = self.plan(event);
        emit_trigger_evaluated(&event.git_ref, &decision);

        if !decision.should_run {
            debug!(git_ref = %event.git_ref, "event matches no trigger; skipping run");
            return RunReport {
                run_id,
                started_at,
                event: event.clone(),
                decision,
                jobs: Vec::new(),
                status: RunStatus::Skipped,
                duration_ms: start.elapsed().as_millis() as u64,
            };
        }

        emit_run_started(&run_id, jobs.len(), decision.is_publishable);

        let ctx = Arc::new(JobContext {
            builder: self.builder.clone(),
            archiver: self.archiver.clone(),
            store: self.store.clone(),
            publisher: self.publisher.clone(),
            decision,
            tag: event.name.clone(),
            timeout: self.job_timeout,
        });

        let (specs, handles): (Vec<_>, Vec<_>) = jobs
            .into_iter()
            .map(|job| {
                let span = job_span(&job);
                let handle = tokio::spawn(run_job(ctx.clone(), job.clone()).instrument(span));
                (job, handle)
            })
            .unzip();

        // A panicked task becomes a failed job; the others run to completion.
        let reports: Vec<JobReport> = specs
            .into_iter()
            .zip(join_all(handles).await)
            .map(|(job, joined)| {
                joined.unwrap_or_else(|e| {
                    let err = JobError::Aborted(e.to_string());
                    emit_job_failed(&job, err.stage(), &err.to_string());
                    let mut report = JobReport::pending(job);
                    report.status = JobStatus::Failed {
                        stage: err.stage(),
                        error: err.to_string(),
                    };
                    report
                })
            })
            .collect();

        let status = if reports.iter().any(|r| !r.passed()) {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };

        let report = RunReport {
            run_id,
            started_at,
            event: event.clone(),
            decision,
            jobs: reports,
            status,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        emit_run_finished(
            &report.run_id,
            report.duration_ms,
            report.passed_count(),
            report.failed_count(),
        );
        report
    }
}

async fn run_job(ctx: Arc<JobContext>, job: JobSpec) -> JobReport {
    let start = Instant::now();
    let mut report = JobReport::pending(job.clone());
    let mut stage = JobStage::Build;

    let result = match ctx.timeout {
        Some(timeout) => {
            match tokio::time::timeout(timeout, execute_job(&ctx, &job, &mut report, &mut stage))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(JobError::Aborted(format!("job timed out after {timeout:?}"))),
            }
        }
        None => execute_job(&ctx, &job, &mut report, &mut stage).await,
    };

    if let Err(err) = result {
        let failed_at = match &err {
            JobError::Aborted(_) => stage,
            other => other.stage(),
        };
        emit_job_failed(&job, failed_at, &err.to_string());
        report.status = JobStatus::Failed {
            stage: failed_at,
            error: err.to_string(),
        };
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    report
}

async fn execute_job(
    ctx: &JobContext,
    job: &JobSpec,
    report: &mut JobReport,
    stage: &mut JobStage,
) -> Result<(), JobError> {
    *stage = JobStage::Build;
    let output = ctx.builder.build(job).await?;
    emit_job_step(job, JobStage::Build);

    *stage = JobStage::Archive;
    let artifact = ctx.archiver.archive(&output, &job.archive_name()).await?;
    report.artifact_name = Some(artifact.name.clone());
    report.sha256 = Some(artifact.sha256.clone());
    emit_job_step(job, JobStage::Archive);

    *stage = JobStage::Store;
    ctx.store.store(&artifact).await?;
    report.stored = true;
    emit_job_step(job, JobStage::Store);

    *stage = JobStage::Publish;
    let Some(request) = PublishGate::plan(&ctx.decision, &ctx.tag, &artifact) else {
        debug!(class = %ctx.decision.class, "publish gate closed; artifact kept as build artifact only");
        return Ok(());
    };
    let publisher = ctx.publisher.as_ref().ok_or_else(|| {
        PublishError::NotConfigured("no release repository or token configured".to_string())
    })?;
    publisher.publish(&request, &artifact).await?;
    report.published = true;
    emit_job_step(job, JobStage::Publish);

    Ok(())
}
