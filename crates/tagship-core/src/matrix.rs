//! Build matrix configuration and expansion.
//!
//! The matrix is static configuration: the same config always expands to the
//! same ordered job list, whatever event triggered the run.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

use crate::error::ConfigError;
use crate::naming::archive_name;

/// Binary built when no matrix is configured.
pub const DEFAULT_BINARY: &str = "spotter";

/// Target built when no matrix is configured.
pub const DEFAULT_TARGET: &str = "x86_64-unknown-linux-musl";

/// One independent build: a binary compiled for a target platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobSpec {
    pub binary: String,
    pub target: String,
}

impl JobSpec {
    pub fn new(binary: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            target: target.into(),
        }
    }

    /// Archive name for this job's output.
    pub fn archive_name(&self) -> String {
        archive_name(&self.binary, &self.target)
    }
}

impl fmt::Display for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.binary, self.target)
    }
}

/// A named group of matrix entries.
///
/// `binaries × targets` are combined, then `include` pairs are appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct MatrixCategory {
    pub name: String,
    pub binaries: Vec<String>,
    pub targets: Vec<String>,
    pub include: Vec<JobSpec>,
}

impl MatrixCategory {
    /// Number of jobs this category produces.
    pub fn pair_count(&self) -> usize {
        self.binaries.len() * self.targets.len() + self.include.len()
    }

    fn expand_into(&self, jobs: &mut Vec<JobSpec>) {
        for binary in &self.binaries {
            for target in &self.targets {
                jobs.push(JobSpec::new(binary, target));
            }
        }
        jobs.extend(self.include.iter().cloned());
    }
}

/// The full build matrix, categories in configuration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatrixConfig {
    pub categories: Vec<MatrixCategory>,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self::single(DEFAULT_BINARY, DEFAULT_TARGET)
    }
}

impl MatrixConfig {
    /// A matrix with exactly one job.
    pub fn single(binary: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            categories: vec![MatrixCategory {
                name: "default".to_string(),
                binaries: vec![binary.into()],
                targets: vec![target.into()],
                include: Vec::new(),
            }],
        }
    }

    /// Total number of configured (binary, target) pairs.
    pub fn pair_count(&self) -> usize {
        self.categories.iter().map(MatrixCategory::pair_count).sum()
    }

    /// Check that every binary and target is usable in a file name.
    ///
    /// Duplicate pairs are allowed (each is its own job) but logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for category in &self.categories {
            let names = category
                .binaries
                .iter()
                .chain(category.include.iter().map(|j| &j.binary));
            for binary in names {
                check_component(&category.name, "binary", binary)?;
            }
            let targets = category
                .targets
                .iter()
                .chain(category.include.iter().map(|j| &j.target));
            for target in targets {
                check_component(&category.name, "target", target)?;
            }
        }

        let mut seen = HashSet::new();
        for job in self.expand() {
            if !seen.insert(job.clone()) {
                warn!(binary = %job.binary, target = %job.target, "duplicate matrix entry");
            }
        }
        Ok(())
    }

    /// Flatten the matrix into its ordered job list.
    pub fn expand(&self) -> Vec<JobSpec> {
        let mut jobs = Vec::with_capacity(self.pair_count());
        for category in &self.categories {
            category.expand_into(&mut jobs);
        }
        jobs
    }
}

fn check_component(category: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::InvalidMatrix(format!(
            "category {category:?}: {field} must not be empty"
        )));
    }
    if value.contains(['/', '\\']) || value.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidMatrix(format!(
            "category {category:?}: {field} {value:?} contains a path separator or whitespace"
        )));
    }
    Ok(())
}
