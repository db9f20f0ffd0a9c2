//! Repository events that drive a pipeline run.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Ref prefix for branches.
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Ref prefix for tags.
pub const TAG_REF_PREFIX: &str = "refs/tags/";

/// Kind of repository event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
    Tag,
    /// Any event the pipeline does not recognise (e.g. `schedule`).
    Other(String),
}

/// A single repository event. Supplied once per pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event kind.
    pub kind: EventKind,

    /// Full git ref (e.g. `refs/heads/master`, `refs/tags/v1.2.0`).
    pub git_ref: String,

    /// Branch or tag short name. For pull requests this is the base branch.
    pub name: String,
}

impl Event {
    /// A push to `branch`.
    pub fn push(branch: impl Into<String>) -> Self {
        let name = branch.into();
        Self {
            kind: EventKind::Push,
            git_ref: format!("{BRANCH_REF_PREFIX}{name}"),
            name,
        }
    }

    /// A pull request targeting `base`.
    pub fn pull_request(base: impl Into<String>) -> Self {
        let name = base.into();
        Self {
            kind: EventKind::PullRequest,
            git_ref: format!("{BRANCH_REF_PREFIX}{name}"),
            name,
        }
    }

    /// A push of `tag`.
    pub fn tag(tag: impl Into<String>) -> Self {
        let name = tag.into();
        Self {
            kind: EventKind::Tag,
            git_ref: format!("{TAG_REF_PREFIX}{name}"),
            name,
        }
    }

    /// Classify a hosting-service event.
    ///
    /// * `event_name`: `push`, `pull_request` or `pull_request_target`; any
    ///   other value yields [`EventKind::Other`].
    /// * `git_ref`: full ref that triggered the event. A push of a
    ///   `refs/tags/*` ref becomes a [`EventKind::Tag`] event.
    /// * `base_ref`: pull-request base branch (short or full form).
    pub fn from_ref(event_name: &str, git_ref: &str, base_ref: Option<&str>) -> Self {
        let git_ref = git_ref.trim().to_string();
        match event_name.trim() {
            "push" => {
                if let Some(tag) = git_ref.strip_prefix(TAG_REF_PREFIX) {
                    Self {
                        kind: EventKind::Tag,
                        name: tag.to_string(),
                        git_ref,
                    }
                } else {
                    Self {
                        kind: EventKind::Push,
                        name: short_name(&git_ref).to_string(),
                        git_ref,
                    }
                }
            }
            "pull_request" | "pull_request_target" => {
                let name = base_ref
                    .map(|b| short_name(b.trim()).to_string())
                    .unwrap_or_default();
                Self {
                    kind: EventKind::PullRequest,
                    name,
                    git_ref,
                }
            }
            other => Self {
                kind: EventKind::Other(other.to_string()),
                name: short_name(&git_ref).to_string(),
                git_ref,
            },
        }
    }

    /// Read the event from the GitHub Actions environment
    /// (`GITHUB_EVENT_NAME`, `GITHUB_REF`, `GITHUB_BASE_REF`).
    pub fn from_github_env() -> Result<Self, ConfigError> {
        let event_name = std::env::var("GITHUB_EVENT_NAME")
            .map_err(|_| ConfigError::MissingEnv("GITHUB_EVENT_NAME".to_string()))?;
        let git_ref = std::env::var("GITHUB_REF")
            .map_err(|_| ConfigError::MissingEnv("GITHUB_REF".to_string()))?;
        let base_ref = std::env::var("GITHUB_BASE_REF")
            .ok()
            .filter(|b| !b.is_empty());

        Ok(Self::from_ref(&event_name, &git_ref, base_ref.as_deref()))
    }

    /// Whether the full ref carries the tag prefix.
    pub fn is_tag_ref(&self) -> bool {
        self.git_ref.starts_with(TAG_REF_PREFIX)
    }
}

/// Strip `refs/heads/` or `refs/tags/` from a ref.
fn short_name(git_ref: &str) -> &str {
    git_ref
        .strip_prefix(BRANCH_REF_PREFIX)
        .or_else(|| git_ref.strip_prefix(TAG_REF_PREFIX))
        .unwrap_or(git_ref)
}
