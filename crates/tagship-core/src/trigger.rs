//! Trigger evaluation.
//!
//! Classifies an [`Event`] against a [`TriggerConfig`] and decides whether the
//! pipeline runs at all and whether its output may be published. Pure: no I/O,
//! no clock, no environment access.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;
use crate::event::{Event, EventKind};

/// Default branch watch-list.
pub const DEFAULT_BRANCH: &str = "master";

/// Default tag pattern for publishable tags.
pub const DEFAULT_TAG_PATTERN: &str = "v*";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which events start a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TriggerConfig {
    /// Watched branches. Entries may use `*` and `?` wildcards.
    pub branches: Vec<String>,

    /// Glob pattern a tag must match to run and publish.
    pub tag_pattern: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            branches: vec![DEFAULT_BRANCH.to_string()],
            tag_pattern: DEFAULT_TAG_PATTERN.to_string(),
        }
    }
}

impl TriggerConfig {
    /// Reject empty branch entries and an empty tag pattern.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tag_pattern.trim().is_empty() {
            return Err(ConfigError::InvalidTrigger(
                "tag_pattern must not be empty".to_string(),
            ));
        }
        if let Some(bad) = self.branches.iter().find(|b| b.trim().is_empty()) {
            return Err(ConfigError::InvalidTrigger(format!(
                "branch entry {bad:?} is empty"
            )));
        }
        Ok(())
    }

    /// Whether `branch` is on the watch-list.
    pub fn watches_branch(&self, branch: &str) -> bool {
        self.branches.iter().any(|p| glob_match(p, branch))
    }

    /// Whether `tag` matches the configured tag pattern.
    pub fn matches_tag(&self, tag: &str) -> bool {
        glob_match(&self.tag_pattern, tag)
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Classification of an event against the trigger configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerClass {
    PushToWatchedBranch,
    PullRequestToWatchedBranch,
    TagPush,
    Other,
}

impl fmt::Display for TriggerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerClass::PushToWatchedBranch => "push to watched branch",
            TriggerClass::PullRequestToWatchedBranch => "pull request to watched branch",
            TriggerClass::TagPush => "tag push",
            TriggerClass::Other => "other",
        };
        f.write_str(s)
    }
}

/// Outcome of trigger evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerDecision {
    pub class: TriggerClass,
    pub should_run: bool,
    pub is_publishable: bool,
}

impl TriggerDecision {
    /// The decision for an event that matches no watched condition.
    pub fn skipped() -> Self {
        Self::from_class(TriggerClass::Other)
    }

    fn from_class(class: TriggerClass) -> Self {
        let should_run = class != TriggerClass::Other;
        Self {
            class,
            should_run,
            is_publishable: class == TriggerClass::TagPush,
        }
    }
}

/// Evaluate an event against the trigger configuration.
pub fn evaluate_trigger(config: &TriggerConfig, event: &Event) -> TriggerDecision {
    let class = match &event.kind {
        EventKind::Push if config.watches_branch(&event.name) => TriggerClass::PushToWatchedBranch,
        EventKind::PullRequest if config.watches_branch(&event.name) => {
            TriggerClass::PullRequestToWatchedBranch
        }
        EventKind::Tag if event.is_tag_ref() && config.matches_tag(&event.name) => {
            TriggerClass::TagPush
        }
        _ => TriggerClass::Other,
    };
    TriggerDecision::from_class(class)
}

// ---------------------------------------------------------------------------
// Glob matching (`*` and `?` only)
// ---------------------------------------------------------------------------

/// Match `text` against a glob `pattern`. `*` matches any run of non-slash
/// characters (including none) and `?` matches exactly one non-slash
/// character, so `release/*` matches `release/1.4` but not `release/1/hotfix`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    // Position of the last `*` in the pattern and the text index it was tried at.
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == t[ti] || (p[pi] == '?' && t[ti] != '/')) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            // `*` never consumes a separator.
            if t[st] == '/' {
                return false;
            }
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
