//! In-memory fakes for the collaborator traits (testing and dry runs)
//!
//! Provides `ScriptedBuildExecutor`, `MemoryArchiver`, `MemoryArtifactStore`,
//! and `MemoryReleaseHost` that satisfy the trait contracts without invoking a
//! compiler or touching the network.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::*;
use crate::error::{ArchiveError, BuildError, PublishError, UploadError};
use crate::matrix::JobSpec;
use crate::publish_gate::PublishRequest;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// ScriptedBuildExecutor
// ---------------------------------------------------------------------------

/// Build executor that succeeds unless the target was scripted to fail.
#[derive(Debug, Default)]
pub struct ScriptedBuildExecutor {
    failing_targets: HashSet<String>,
    delay: Option<Duration>,
    target_delays: HashMap<String, Duration>,
    calls: Mutex<Vec<JobSpec>>,
}

impl ScriptedBuildExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every build for `target` fail with a compile error.
    pub fn failing_target(mut self, target: impl Into<String>) -> Self {
        self.failing_targets.insert(target.into());
        self
    }

    /// Sleep before completing each build.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep before completing builds for `target` only.
    pub fn slow_target(mut self, target: impl Into<String>, delay: Duration) -> Self {
        self.target_delays.insert(target.into(), delay);
        self
    }

    /// Jobs built so far, in call order.
    pub fn calls(&self) -> Vec<JobSpec> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl BuildExecutor for ScriptedBuildExecutor {
    async fn build(&self, job: &JobSpec) -> Result<BuildOutput, BuildError> {
        lock(&self.calls).push(job.clone());

        if let Some(delay) = self.target_delays.get(&job.target).copied().or(self.delay) {
            tokio::time::sleep(delay).await;
        }

        if self.failing_targets.contains(&job.target) {
            return Err(BuildError::Failed {
                binary: job.binary.clone(),
                target: job.target.clone(),
                exit_code: 101,
                stderr: "error: could not compile".to_string(),
            });
        }

        Ok(BuildOutput {
            job: job.clone(),
            path: PathBuf::from("target")
                .join(&job.target)
                .join("release")
                .join(&job.binary),
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryArchiver
// ---------------------------------------------------------------------------

/// Archiver producing deterministic bytes derived from the job.
#[derive(Debug, Default)]
pub struct MemoryArchiver;

impl MemoryArchiver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Archiver for MemoryArchiver {
    async fn archive(
        &self,
        output: &BuildOutput,
        name: &str,
    ) -> Result<ArchiveArtifact, ArchiveError> {
        let bytes = format!("{}:{}", output.job.binary, output.job.target).into_bytes();
        Ok(ArchiveArtifact::new(name, bytes))
    }
}

// ---------------------------------------------------------------------------
// MemoryArtifactStore
// ---------------------------------------------------------------------------

/// Build-artifact store backed by a `HashMap<name, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
    rejected: HashSet<String>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject uploads of `name`.
    pub fn rejecting(mut self, name: impl Into<String>) -> Self {
        self.rejected.insert(name.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        lock(&self.artifacts).get(name).cloned()
    }

    /// Stored names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.artifacts).keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn store(&self, artifact: &ArchiveArtifact) -> Result<(), UploadError> {
        if self.rejected.contains(&artifact.name) {
            return Err(UploadError::Rejected {
                name: artifact.name.clone(),
                reason: "rejected by test store".to_string(),
            });
        }
        lock(&self.artifacts).insert(artifact.name.clone(), artifact.bytes.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryReleaseHost
// ---------------------------------------------------------------------------

/// A release held by [`MemoryReleaseHost`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRelease {
    pub tag: String,
    pub prerelease: bool,
    /// Assets in upload order: (name, bytes).
    pub assets: Vec<(String, Vec<u8>)>,
}

impl MemoryRelease {
    pub fn asset(&self, name: &str) -> Option<&[u8]> {
        self.assets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.as_slice())
    }

    pub fn asset_count(&self, name: &str) -> usize {
        self.assets.iter().filter(|(n, _)| n == name).count()
    }
}

/// Release host keyed by tag, honouring pre-release and overwrite flags.
#[derive(Debug, Default)]
pub struct MemoryReleaseHost {
    releases: Mutex<HashMap<String, MemoryRelease>>,
    unavailable: bool,
}

impl MemoryReleaseHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that fails every request with HTTP 503.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn release(&self, tag: &str) -> Option<MemoryRelease> {
        lock(&self.releases).get(tag).cloned()
    }

    pub fn release_count(&self) -> usize {
        lock(&self.releases).len()
    }
}

#[async_trait]
impl ReleasePublisher for MemoryReleaseHost {
    async fn publish(
        &self,
        request: &PublishRequest,
        artifact: &ArchiveArtifact,
    ) -> Result<(), PublishError> {
        if self.unavailable {
            return Err(PublishError::Http {
                operation: "get release".to_string(),
                status: 503,
                body: "service unavailable".to_string(),
            });
        }

        let mut releases = lock(&self.releases);
        let release = releases
            .entry(request.tag.clone())
            .or_insert_with(|| MemoryRelease {
                tag: request.tag.clone(),
                prerelease: request.options.prerelease,
                assets: Vec::new(),
            });

        if let Some(pos) = release
            .assets
            .iter()
            .position(|(n, _)| n == &request.asset_name)
        {
            if !request.options.overwrite {
                return Err(PublishError::AssetExists {
                    tag: request.tag.clone(),
                    asset: request.asset_name.clone(),
                });
            }
            release.assets.remove(pos);
        }

        release
            .assets
            .push((request.asset_name.clone(), artifact.bytes.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish_gate::PublishOptions;

    fn request(tag: &str, asset: &str, overwrite: bool) -> PublishRequest {
        PublishRequest {
            tag: tag.to_string(),
            asset_name: asset.to_string(),
            options: PublishOptions {
                prerelease: true,
                overwrite,
            },
        }
    }

    #[tokio::test]
    async fn test_release_host_overwrites_same_asset() {
        let host = MemoryReleaseHost::new();
        let name = "spotter-x86_64-unknown-linux-musl.tar.gz";
        let first = ArchiveArtifact::new(name, b"first".to_vec());
        let second = ArchiveArtifact::new(name, b"second".to_vec());

        host.publish(&request("v1.2.0", name, true), &first).await.unwrap();
        host.publish(&request("v1.2.0", name, true), &second).await.unwrap();

        let release = host.release("v1.2.0").unwrap();
        assert_eq!(release.asset_count(name), 1);
        assert_eq!(release.asset(name), Some(&b"second"[..]));
        assert!(release.prerelease);
        assert_eq!(host.release_count(), 1);
    }

    #[tokio::test]
    async fn test_release_host_refuses_without_overwrite() {
        let host = MemoryReleaseHost::new();
        let artifact = ArchiveArtifact::new("a.tar.gz", b"a".to_vec());
        host.publish(&request("v1", "a.tar.gz", false), &artifact).await.unwrap();

        let err = host
            .publish(&request("v1", "a.tar.gz", false), &artifact)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::AssetExists { .. }));
    }

    #[tokio::test]
    async fn test_scripted_executor_fails_selected_target() {
        let exec = ScriptedBuildExecutor::new().failing_target("aarch64-unknown-linux-musl");

        let ok = exec.build(&JobSpec::new("spotter", "x86_64-unknown-linux-musl")).await;
        assert!(ok.is_ok());

        let err = exec
            .build(&JobSpec::new("spotter", "aarch64-unknown-linux-musl"))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Failed { exit_code: 101, .. }));
        assert_eq!(exec.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_executor_delay_completes() {
        let exec = ScriptedBuildExecutor::new().with_delay(Duration::from_millis(10));
        let out = exec.build(&JobSpec::new("spotter", "t")).await.unwrap();
        assert!(out.path.ends_with("release/spotter"));
    }

    #[tokio::test]
    async fn test_memory_store_rejects_configured_name() {
        let store = MemoryArtifactStore::new().rejecting("bad.tar.gz");
        let good = ArchiveArtifact::new("good.tar.gz", b"g".to_vec());
        let bad = ArchiveArtifact::new("bad.tar.gz", b"b".to_vec());

        store.store(&good).await.unwrap();
        assert!(store.store(&bad).await.is_err());
        assert_eq!(store.names(), vec!["good.tar.gz".to_string()]);
    }
}
