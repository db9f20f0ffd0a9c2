//! Job-scoped error taxonomy for tagship.
//!
//! A trigger that matches nothing is not an error; it produces a skipped run.
//! Every other failure belongs to exactly one job and one step of that job.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Failure of the build step for one job.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build of {binary} for {target} exited with code {exit_code}: {stderr}")]
    Failed {
        binary: String,
        target: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("build of {binary} for {target} timed out after {}s", timeout.as_secs())]
    Timeout {
        binary: String,
        target: String,
        timeout: Duration,
    },

    #[error("build succeeded but no output found at {}", path.display())]
    MissingOutput { path: PathBuf },

    #[error("target {0} is not supported by the toolchain")]
    UnsupportedTarget(String),
}

/// Failure while packaging a build output.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("build output {} is not a file", path.display())]
    NotAFile { path: PathBuf },

    #[error("io error while archiving {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure storing an archive as a build artifact.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("artifact store rejected {name}: {reason}")]
    Rejected { name: String, reason: String },

    #[error("io error storing {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure attaching an archive to a release.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("release host returned HTTP {status} for {operation}: {body}")]
    Http {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("release transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    #[error("asset {asset} already exists on release {tag} and overwrite is disabled")]
    AssetExists { tag: String, asset: String },

    #[error("publishing is not configured: {0}")]
    NotConfigured(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid matrix entry: {0}")]
    InvalidMatrix(String),

    #[error("invalid trigger configuration: {0}")]
    InvalidTrigger(String),

    #[error("invalid release configuration: {0}")]
    InvalidRelease(String),

    #[error("environment variable {0} is not set")]
    MissingEnv(String),
}

/// The step of a job where a failure occurred.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Build,
    Archive,
    Store,
    Publish,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Build => "build",
            JobStage::Archive => "archive",
            JobStage::Store => "store",
            JobStage::Publish => "publish",
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure inside one job, tagged with the step that produced it.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("packaging failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("artifact upload failed: {0}")]
    Store(#[from] UploadError),

    #[error("release publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("job aborted: {0}")]
    Aborted(String),
}

impl JobError {
    /// Step of the job that failed. An aborted task is attributed to the build.
    pub fn stage(&self) -> JobStage {
        match self {
            JobError::Build(_) | JobError::Aborted(_) => JobStage::Build,
            JobError::Archive(_) => JobStage::Archive,
            JobError::Store(_) => JobStage::Store,
            JobError::Publish(_) => JobStage::Publish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_stage_mapping() {
        let err = JobError::from(BuildError::UnsupportedTarget("mips-unknown-none".to_string()));
        assert_eq!(err.stage(), JobStage::Build);

        let err = JobError::from(UploadError::Rejected {
            name: "a.tar.gz".to_string(),
            reason: "quota".to_string(),
        });
        assert_eq!(err.stage(), JobStage::Store);

        let err = JobError::from(PublishError::NotConfigured("no token".to_string()));
        assert_eq!(err.stage(), JobStage::Publish);
    }

    #[test]
    fn test_build_timeout_display() {
        let err = BuildError::Timeout {
            binary: "spotter".to_string(),
            target: "x86_64-unknown-linux-musl".to_string(),
            timeout: Duration::from_secs(90),
        };
        let msg = err.to_string();
        assert!(msg.contains("spotter"));
        assert!(msg.contains("90s"));
    }

    #[test]
    fn test_publish_http_error_display() {
        let err = PublishError::Http {
            operation: "upload asset".to_string(),
            status: 401,
            body: "Bad credentials".to_string(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Bad credentials"));
    }

    #[test]
    fn test_job_stage_serde_snake_case() {
        let json = serde_json::to_string(&JobStage::Publish).unwrap();
        assert_eq!(json, "\"publish\"");
    }
}
