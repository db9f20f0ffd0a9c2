//! Integration tests for the release pipeline with in-memory collaborators.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use tagship_ci::{FsArtifactStore, JobStatus, ReleasePipeline, RunStatus, TarGzArchiver};
use tagship_core::fakes::{
    MemoryArchiver, MemoryArtifactStore, MemoryReleaseHost, ScriptedBuildExecutor,
};
use tagship_core::{
    checksum_name, ArchiveArtifact, ArchiveError, Archiver, BuildError, BuildExecutor,
    BuildOutput, Event, JobSpec, JobStage, MatrixCategory, MatrixConfig, TriggerConfig,
};

const TARGET: &str = "x86_64-unknown-linux-musl";
const ASSET: &str = "spotter-x86_64-unknown-linux-musl.tar.gz";

struct Harness {
    builder: Arc<ScriptedBuildExecutor>,
    store: Arc<MemoryArtifactStore>,
    host: Arc<MemoryReleaseHost>,
    pipeline: ReleasePipeline,
}

fn harness_with(
    matrix: MatrixConfig,
    builder: ScriptedBuildExecutor,
    store: MemoryArtifactStore,
    host: MemoryReleaseHost,
) -> Harness {
    let builder = Arc::new(builder);
    let store = Arc::new(store);
    let host = Arc::new(host);
    let pipeline = ReleasePipeline::new(
        TriggerConfig::default(),
        matrix,
        builder.clone(),
        Arc::new(MemoryArchiver::new()),
        store.clone(),
    )
    .with_publisher(host.clone());
    Harness {
        builder,
        store,
        host,
        pipeline,
    }
}

fn harness() -> Harness {
    harness_with(
        MatrixConfig::default(),
        ScriptedBuildExecutor::new(),
        MemoryArtifactStore::new(),
        MemoryReleaseHost::new(),
    )
}

fn two_target_matrix() -> MatrixConfig {
    MatrixConfig {
        categories: vec![MatrixCategory {
            name: "linux".to_string(),
            binaries: vec!["spotter".to_string()],
            targets: vec![TARGET.to_string(), "aarch64-unknown-linux-musl".to_string()],
            include: Vec::new(),
        }],
    }
}

/// Test: tag v1.2.0 builds, stores and publishes the default job as a pre-release
#[tokio::test]
async fn test_tag_push_publishes_prerelease() {
    let h = harness();
    let report = h.pipeline.run(&Event::tag("v1.2.0")).await;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert!(report.decision.is_publishable);
    assert_eq!(report.jobs.len(), 1);

    let job = &report.jobs[0];
    assert_eq!(job.job, JobSpec::new("spotter", TARGET));
    assert_eq!(job.artifact_name.as_deref(), Some(ASSET));
    assert!(job.stored);
    assert!(job.published);

    assert_eq!(h.store.names(), vec![ASSET.to_string()]);
    let release = h.host.release("v1.2.0").expect("release created");
    assert!(release.prerelease, "tag builds publish as pre-release");
    assert_eq!(release.asset_count(ASSET), 1);
}

/// Test: push to an unwatched branch is a no-op
#[tokio::test]
async fn test_feature_branch_push_is_skipped() {
    let h = harness();
    let report = h.pipeline.run(&Event::push("feature/x")).await;

    assert_eq!(report.status, RunStatus::Skipped);
    assert!(!report.decision.should_run);
    assert!(report.jobs.is_empty());
    assert!(h.builder.calls().is_empty(), "nothing is built");
    assert!(h.store.names().is_empty());
    assert_eq!(h.host.release_count(), 0);
}

/// Test: push to master builds and stores but never publishes
#[tokio::test]
async fn test_master_push_stores_without_publishing() {
    let h = harness();
    let report = h.pipeline.run(&Event::push("master")).await;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert!(!report.decision.is_publishable);
    let job = &report.jobs[0];
    assert!(job.stored);
    assert!(!job.published);
    assert_eq!(h.store.names(), vec![ASSET.to_string()]);
    assert_eq!(h.host.release_count(), 0);
}

/// Test: pull request into master runs the same build-only path
#[tokio::test]
async fn test_pull_request_to_master_is_build_only() {
    let h = harness();
    let report = h.pipeline.run(&Event::pull_request("master")).await;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert!(report.jobs[0].stored);
    assert!(!report.jobs[0].published);
    assert_eq!(h.host.release_count(), 0);
}

/// Test: tags outside the pattern do not run
#[tokio::test]
async fn test_non_matching_tag_is_skipped() {
    let h = harness();
    let report = h.pipeline.run(&Event::tag("nightly-2024")).await;
    assert_eq!(report.status, RunStatus::Skipped);
    assert_eq!(h.host.release_count(), 0);
}

/// Test: one failing target does not stop the other jobs
#[tokio::test]
async fn test_failing_target_is_isolated() {
    let h = harness_with(
        two_target_matrix(),
        ScriptedBuildExecutor::new().failing_target("aarch64-unknown-linux-musl"),
        MemoryArtifactStore::new(),
        MemoryReleaseHost::new(),
    );
    let report = h.pipeline.run(&Event::tag("v2.0.0")).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.passed_count(), 1);
    assert_eq!(report.failed_count(), 1);

    // Reports keep matrix order.
    assert_eq!(report.jobs[0].job.target, TARGET);
    assert!(report.jobs[0].published);
    assert_eq!(report.jobs[1].failed_stage(), Some(JobStage::Build));
    assert!(!report.jobs[1].stored);

    let release = h.host.release("v2.0.0").expect("release created");
    assert_eq!(release.assets.len(), 1);
}

/// Test: a slow job neither delays nor times out a fast sibling
#[tokio::test]
async fn test_slow_job_does_not_delay_fast_job() {
    let slow = "aarch64-unknown-linux-musl";
    let h = harness_with(
        two_target_matrix(),
        ScriptedBuildExecutor::new().slow_target(slow, Duration::from_secs(3)),
        MemoryArtifactStore::new(),
        MemoryReleaseHost::new(),
    );
    let pipeline = h.pipeline.with_job_timeout(Duration::from_millis(800));
    let report = pipeline.run(&Event::tag("v2.1.0")).await;

    let fast = &report.jobs[0];
    assert_eq!(fast.job.target, TARGET);
    assert_eq!(fast.status, JobStatus::Succeeded);
    assert!(fast.published);
    assert!(fast.duration_ms < 800, "fast job took {}ms", fast.duration_ms);

    match &report.jobs[1].status {
        JobStatus::Failed { stage, error } => {
            assert_eq!(*stage, JobStage::Build);
            assert!(error.contains("timed out"));
        }
        other => panic!("expected slow job to time out, got {other:?}"),
    }
    assert_eq!(h.store.names(), vec![ASSET.to_string()]);
}

/// Test: a publish failure keeps the stored artifact
#[tokio::test]
async fn test_publish_failure_keeps_stored_artifact() {
    let h = harness_with(
        MatrixConfig::default(),
        ScriptedBuildExecutor::new(),
        MemoryArtifactStore::new(),
        MemoryReleaseHost::unavailable(),
    );
    let report = h.pipeline.run(&Event::tag("v1.2.0")).await;

    assert_eq!(report.status, RunStatus::Failed);
    let job = &report.jobs[0];
    assert!(job.stored);
    assert!(!job.published);
    match &job.status {
        JobStatus::Failed { stage, error } => {
            assert_eq!(*stage, JobStage::Publish);
            assert!(error.contains("503"));
        }
        other => panic!("expected publish failure, got {other:?}"),
    }
    assert!(h.store.get(ASSET).is_some(), "artifact is not retracted");
}

/// Test: a rejected upload stops the job before publishing
#[tokio::test]
async fn test_store_failure_skips_publish() {
    let h = harness_with(
        MatrixConfig::default(),
        ScriptedBuildExecutor::new(),
        MemoryArtifactStore::new().rejecting(ASSET),
        MemoryReleaseHost::new(),
    );
    let report = h.pipeline.run(&Event::tag("v1.2.0")).await;

    assert_eq!(report.jobs[0].failed_stage(), Some(JobStage::Store));
    assert!(!report.jobs[0].published);
    assert_eq!(h.host.release_count(), 0);
}

/// Archiver that tags its bytes so repeated runs are distinguishable.
struct LabelledArchiver(&'static str);

#[async_trait]
impl Archiver for LabelledArchiver {
    async fn archive(
        &self,
        _output: &BuildOutput,
        name: &str,
    ) -> Result<ArchiveArtifact, ArchiveError> {
        Ok(ArchiveArtifact::new(name, self.0.as_bytes().to_vec()))
    }
}

/// Test: re-pushing a tag overwrites the asset instead of duplicating it
#[tokio::test]
async fn test_republish_same_tag_overwrites_asset() {
    let host = Arc::new(MemoryReleaseHost::new());
    let store = Arc::new(MemoryArtifactStore::new());

    for label in ["first", "second"] {
        let pipeline = ReleasePipeline::new(
            TriggerConfig::default(),
            MatrixConfig::default(),
            Arc::new(ScriptedBuildExecutor::new()),
            Arc::new(LabelledArchiver(label)),
            store.clone(),
        )
        .with_publisher(host.clone());
        let report = pipeline.run(&Event::tag("v1.2.0")).await;
        assert_eq!(report.status, RunStatus::Succeeded);
    }

    let release = host.release("v1.2.0").expect("release exists");
    assert_eq!(release.asset_count(ASSET), 1);
    assert_eq!(release.asset(ASSET), Some(b"second".as_slice()));
    assert_eq!(store.get(ASSET), Some(b"second".to_vec()));
    assert_eq!(host.release_count(), 1);
}

/// Test: job count equals configured pairs and does not depend on the event
#[tokio::test]
async fn test_job_count_matches_pair_count() {
    let matrix = MatrixConfig {
        categories: vec![
            MatrixCategory {
                name: "linux".to_string(),
                binaries: vec!["spotter".to_string(), "spotter-agent".to_string()],
                targets: vec![TARGET.to_string(), "aarch64-unknown-linux-musl".to_string()],
                include: Vec::new(),
            },
            MatrixCategory {
                name: "windows".to_string(),
                binaries: Vec::new(),
                targets: Vec::new(),
                include: vec![JobSpec::new("spotter", "x86_64-pc-windows-gnu")],
            },
        ],
    };
    let expected = matrix.pair_count();
    assert_eq!(expected, 5);

    for event in [Event::push("master"), Event::tag("v3.0.0")] {
        let h = harness_with(
            matrix.clone(),
            ScriptedBuildExecutor::new(),
            MemoryArtifactStore::new(),
            MemoryReleaseHost::new(),
        );
        let report = h.pipeline.run(&event).await;
        assert_eq!(report.jobs.len(), expected);
        assert_eq!(h.store.names().len(), expected);
    }
}

/// Build executor that drops a fake binary where cargo would put it.
struct FileBuildExecutor {
    root: std::path::PathBuf,
}

#[async_trait]
impl BuildExecutor for FileBuildExecutor {
    async fn build(&self, job: &JobSpec) -> Result<BuildOutput, BuildError> {
        let path = tagship_ci::runner::output_path(&self.root, job);
        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(path.parent().unwrap_or(&self.root))?;
            std::fs::write(&path, format!("binary {job}"))
        };
        write().map_err(|source| BuildError::Spawn {
            program: "fake".to_string(),
            source,
        })?;
        Ok(BuildOutput {
            job: job.clone(),
            path,
        })
    }
}

/// Test: real archiver and filesystem store produce the archive and checksum
#[tokio::test]
async fn test_tar_gz_archive_lands_in_filesystem_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path().join("artifacts")).unwrap();
    let host = Arc::new(MemoryReleaseHost::new());

    let pipeline = ReleasePipeline::new(
        TriggerConfig::default(),
        MatrixConfig::default(),
        Arc::new(FileBuildExecutor {
            root: dir.path().join("ws"),
        }),
        Arc::new(TarGzArchiver::new()),
        Arc::new(store.clone()),
    )
    .with_publisher(host.clone());

    let report = pipeline.run(&Event::tag("v1.2.0")).await;
    assert_eq!(report.status, RunStatus::Succeeded);

    let archive = std::fs::read(store.artifact_path(ASSET)).unwrap();
    let checksum = std::fs::read_to_string(store.artifact_path(&checksum_name(ASSET))).unwrap();
    let sha = report.jobs[0].sha256.clone().unwrap();
    assert!(checksum.starts_with(&sha));
    assert_eq!(ArchiveArtifact::new(ASSET, archive.clone()).sha256, sha);

    let release = host.release("v1.2.0").unwrap();
    assert_eq!(release.asset(ASSET), Some(archive.as_slice()));
}
