//! Collaborator traits for the external tools a job drives.
//!
//! These traits define the four I/O seams of a job:
//! - `BuildExecutor`: cross-compile one binary for one target
//! - `Archiver`: package a build output under its deterministic name
//! - `ArtifactStore`: keep the archive as a build artifact (always called)
//! - `ReleasePublisher`: attach the archive to a tagged release (gated)
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::error::{ArchiveError, BuildError, PublishError, UploadError};
use crate::matrix::JobSpec;
use crate::publish_gate::PublishRequest;

/// Compiled release-mode output of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub job: JobSpec,
    pub path: PathBuf,
}

/// A packaged archive, immutable once produced.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveArtifact {
    /// Deterministic asset name, see [`crate::naming::archive_name`].
    pub name: String,

    /// Compressed archive bytes.
    #[serde(skip)]
    pub bytes: Vec<u8>,

    /// SHA-256 of `bytes`, lowercase hex.
    pub sha256: String,
}

impl ArchiveArtifact {
    /// Build an artifact and compute its digest.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let sha256 = hex::encode(Sha256::digest(&bytes));
        Self {
            name: name.into(),
            bytes,
            sha256,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// `sha256sum`-compatible line for this artifact.
    pub fn checksum_line(&self) -> String {
        format!("{}  {}\n", self.sha256, self.name)
    }
}

impl std::fmt::Debug for ArchiveArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveArtifact")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .field("sha256", &self.sha256.chars().take(12).collect::<String>())
            .finish()
    }
}

/// Cross-compiles one job.
///
/// Failure is scoped to the job: missing target support, compile errors, or timeout.
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    async fn build(&self, job: &JobSpec) -> Result<BuildOutput, BuildError>;
}

/// Packages a build output into a compressed archive named `name`.
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(&self, output: &BuildOutput, name: &str)
        -> Result<ArchiveArtifact, ArchiveError>;
}

/// Build-artifact sink. Storing the same name again replaces the previous copy.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store(&self, artifact: &ArchiveArtifact) -> Result<(), UploadError>;
}

/// Release sink.
///
/// Guarantees:
/// - The release named by `request.tag` is created when missing, flagged
///   pre-release when `request.options.prerelease` is set.
/// - With `request.options.overwrite`, publishing the same asset name twice
///   leaves exactly one asset holding the second call's content.
#[async_trait]
pub trait ReleasePublisher: Send + Sync {
    async fn publish(
        &self,
        request: &PublishRequest,
        artifact: &ArchiveArtifact,
    ) -> Result<(), PublishError>;
}
