//! Publish gate.
//!
//! Decides whether a job's archive is attached to a release. The decision is a
//! pure predicate over the [`TriggerDecision`]; only tag pushes matching the
//! tag pattern publish. Everything else keeps the archive as a build artifact
//! only.

use serde::{Deserialize, Serialize};

use crate::collaborators::ArchiveArtifact;
use crate::trigger::TriggerDecision;

/// Attributes applied when attaching an asset to a release.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishOptions {
    /// Mark a created release as pre-release.
    pub prerelease: bool,
    /// Replace an existing asset with the same name.
    pub overwrite: bool,
}

impl Default for PublishOptions {
    /// Automated tag builds: pre-release, overwrite on republish.
    fn default() -> Self {
        Self {
            prerelease: true,
            overwrite: true,
        }
    }
}

/// A release attachment the pipeline has been cleared to perform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishRequest {
    /// Tag naming the release.
    pub tag: String,
    /// Asset name, identical to the stored build artifact's name.
    pub asset_name: String,
    pub options: PublishOptions,
}

/// Publish gate rules.
pub struct PublishGate;

impl PublishGate {
    /// Whether publishing is allowed for this decision.
    pub fn allows(decision: &TriggerDecision) -> bool {
        decision.is_publishable
    }

    /// Build the release request for `artifact`, or `None` when the gate is closed.
    pub fn plan(
        decision: &TriggerDecision,
        tag: &str,
        artifact: &ArchiveArtifact,
    ) -> Option<PublishRequest> {
        if !Self::allows(decision) {
            return None;
        }
        Some(PublishRequest {
            tag: tag.to_string(),
            asset_name: artifact.name.clone(),
            options: PublishOptions::default(),
        })
    }
}
