//! tagship CI - release pipeline execution
//!
//! Runs the tag-gated release pipeline:
//! - Cross-compiles each (binary, target) job with `cargo` or `cross`
//! - Packages the binary as `<binary>-<target>.tar.gz`
//! - Stores the archive as a build artifact
//! - Attaches it to a GitHub pre-release for `v*` tags

pub mod archive;
pub mod github;
pub mod pipeline;
pub mod runner;
pub mod store;

// Re-export key types
pub use archive::TarGzArchiver;
pub use github::GithubReleasePublisher;
pub use pipeline::{JobReport, JobStatus, ReleasePipeline, RunReport, RunStatus};
pub use runner::{CargoBuildExecutor, CommandResult};
pub use store::FsArtifactStore;
