//! tagship core
//!
//! Decision logic for a tag-gated release pipeline:
//! - Trigger evaluation: does this event run, and may it publish?
//! - Matrix expansion: which (binary, target) jobs to build
//! - Archive naming: one deterministic asset name per job
//! - Publish gate: attach to a pre-release only for `v*` tags
//!
//! External tools sit behind the traits in [`collaborators`].

pub mod collaborators;
pub mod config;
pub mod error;
pub mod event;
pub mod fakes;
pub mod matrix;
pub mod naming;
pub mod obs;
pub mod plan;
pub mod publish_gate;
pub mod telemetry;
pub mod trigger;

pub use collaborators::{
    ArchiveArtifact, Archiver, ArtifactStore, BuildExecutor, BuildOutput, ReleasePublisher,
};
pub use config::{
    ArtifactsConfig, BuildConfig, BuildTool, PipelineConfig, ReleaseConfig, DEFAULT_CONFIG_FILE,
};
pub use error::{
    ArchiveError, BuildError, ConfigError, JobError, JobStage, PublishError, UploadError,
};
pub use event::{Event, EventKind, BRANCH_REF_PREFIX, TAG_REF_PREFIX};
pub use matrix::{JobSpec, MatrixCategory, MatrixConfig};
pub use naming::{archive_name, checksum_name, ARCHIVE_EXTENSION};
pub use obs::{job_span, run_span};
pub use plan::RunPlan;
pub use publish_gate::{PublishGate, PublishOptions, PublishRequest};
pub use telemetry::init_tracing;
pub use trigger::{evaluate_trigger, glob_match, TriggerClass, TriggerConfig, TriggerDecision};

/// tagship version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
