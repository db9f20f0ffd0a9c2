//! Pipeline configuration.
//!
//! Loaded from `tagship.toml`; every section is optional. Credentials never
//! come from the file: the release token is read from the environment only.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::matrix::{MatrixCategory, MatrixConfig};
use crate::trigger::TriggerConfig;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "tagship.toml";

/// Default GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default artifact directory, relative to the working directory.
pub const DEFAULT_ARTIFACT_DIR: &str = "target/tagship/artifacts";

/// Default per-build timeout: 30 minutes.
const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 30 * 60;

/// Environment variables consulted by [`PipelineConfig::apply_env`].
pub const ENV_TOKEN: &str = "TAGSHIP_RELEASE_TOKEN";
pub const ENV_TOKEN_FALLBACK: &str = "GITHUB_TOKEN";
pub const ENV_REPOSITORY: &str = "TAGSHIP_RELEASE_REPOSITORY";
pub const ENV_REPOSITORY_FALLBACK: &str = "GITHUB_REPOSITORY";
pub const ENV_ARTIFACT_DIR: &str = "TAGSHIP_ARTIFACT_DIR";

/// Tool used to compile each job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BuildTool {
    Cargo,
    #[default]
    Cross,
}

impl BuildTool {
    pub fn program(&self) -> &'static str {
        match self {
            BuildTool::Cargo => "cargo",
            BuildTool::Cross => "cross",
        }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    pub tool: BuildTool,

    /// Cargo workspace containing the binaries.
    pub workspace: PathBuf,

    /// Timeout for a single build, in seconds (0 disables).
    pub timeout_secs: u64,

    /// Extra arguments appended to the build command.
    pub extra_args: Vec<String>,

    /// Wall-clock limit for a whole job (build through publish).
    pub job_timeout_secs: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tool: BuildTool::default(),
            workspace: PathBuf::from("."),
            timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            extra_args: Vec::new(),
            job_timeout_secs: None,
        }
    }
}

/// `[artifacts]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
        }
    }
}

/// `[release]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReleaseConfig {
    /// `owner/repo` hosting the releases. Publishing is disabled without it.
    pub repository: Option<String>,

    pub api_url: String,

    /// Opaque credential handed to the release publisher. Environment only.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            repository: None,
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub trigger: TriggerConfig,
    pub build: BuildConfig,
    /// `[[matrix]]` categories; empty means the default single-job matrix.
    pub matrix: Vec<MatrixCategory>,
    pub artifacts: ArtifactsConfig,
    pub release: ReleaseConfig,
}

impl PipelineConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Read `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |primary: &str, fallback: Option<&str>| {
            lookup(primary)
                .filter(|v| !v.is_empty())
                .or_else(|| fallback.and_then(&lookup).filter(|v| !v.is_empty()))
        };

        if let Some(token) = get(ENV_TOKEN, Some(ENV_TOKEN_FALLBACK)) {
            self.release.token = Some(token);
        }
        if self.release.repository.is_none() {
            self.release.repository = get(ENV_REPOSITORY, Some(ENV_REPOSITORY_FALLBACK));
        } else if let Some(repo) = get(ENV_REPOSITORY, None) {
            self.release.repository = Some(repo);
        }
        if let Some(dir) = get(ENV_ARTIFACT_DIR, None) {
            self.artifacts.dir = PathBuf::from(dir);
        }
    }

    /// The effective build matrix.
    pub fn matrix_config(&self) -> MatrixConfig {
        if self.matrix.is_empty() {
            MatrixConfig::default()
        } else {
            MatrixConfig {
                categories: self.matrix.clone(),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trigger.validate()?;
        self.matrix_config().validate()?;
        if let Some(repo) = &self.release.repository {
            let valid = matches!(repo.split_once('/'), Some((o, r)) if !o.is_empty() && !r.is_empty() && !r.contains('/'));
            if !valid {
                return Err(ConfigError::InvalidRelease(format!(
                    "repository must be owner/repo, got {repo:?}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::JobSpec;
    use std::collections::HashMap;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.trigger.branches, vec!["master".to_string()]);
        assert_eq!(config.trigger.tag_pattern, "v*");
        assert_eq!(config.build.tool, BuildTool::Cross);
        assert_eq!(
            config.matrix_config().expand(),
            vec![JobSpec::new("spotter", "x86_64-unknown-linux-musl")]
        );
    }

    #[test]
    fn test_full_document() {
        let doc = r#"
            [trigger]
            branches = ["main", "release/*"]
            tag_pattern = "v*"

            [build]
            tool = "cargo"
            workspace = "../spotter"
            timeout_secs = 600

            [[matrix]]
            name = "linux"
            binaries = ["spotter"]
            targets = ["x86_64-unknown-linux-musl", "aarch64-unknown-linux-musl"]

            [[matrix]]
            name = "extra"
            include = [{ binary = "spotter", target = "armv7-unknown-linux-musleabihf" }]

            [artifacts]
            dir = "dist"

            [release]
            repository = "owner/spotter"
        "#;
        let config = PipelineConfig::from_toml_str(doc).unwrap();
        assert_eq!(config.build.tool, BuildTool::Cargo);
        assert_eq!(config.build.timeout_secs, 600);
        assert_eq!(config.matrix_config().pair_count(), 3);
        assert_eq!(config.artifacts.dir, PathBuf::from("dist"));
        assert_eq!(config.release.api_url, DEFAULT_API_URL);
        assert!(config.release.token.is_none());
    }

    #[test]
    fn test_token_is_never_read_from_file() {
        let doc = "[release]\ntoken = \"secret\"\n";
        let config = PipelineConfig::from_toml_str(doc).unwrap();
        assert!(config.release.token.is_none());
    }

    #[test]
    fn test_invalid_matrix_rejected() {
        let doc = "[[matrix]]\nname = \"x\"\nbinaries = [\"spot ter\"]\ntargets = [\"t\"]\n";
        assert!(matches!(
            PipelineConfig::from_toml_str(doc),
            Err(ConfigError::InvalidMatrix(_))
        ));
    }

    #[test]
    fn test_invalid_repository_rejected() {
        let doc = "[release]\nrepository = \"just-a-name\"\n";
        assert!(PipelineConfig::from_toml_str(doc).is_err());
    }

    #[test]
    fn test_parse_error_surfaces() {
        assert!(matches!(
            PipelineConfig::from_toml_str("[trigger\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides_with_fallbacks() {
        let env: HashMap<&str, &str> = [
            ("GITHUB_TOKEN", "gh-token"),
            ("GITHUB_REPOSITORY", "owner/spotter"),
            ("TAGSHIP_ARTIFACT_DIR", "/tmp/artifacts"),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config.apply_env_with(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.release.token.as_deref(), Some("gh-token"));
        assert_eq!(config.release.repository.as_deref(), Some("owner/spotter"));
        assert_eq!(config.artifacts.dir, PathBuf::from("/tmp/artifacts"));
    }

    #[test]
    fn test_primary_env_wins_and_file_repository_kept_over_fallback() {
        let env: HashMap<&str, &str> = [
            ("TAGSHIP_RELEASE_TOKEN", "primary"),
            ("GITHUB_TOKEN", "fallback"),
            ("GITHUB_REPOSITORY", "ci/checkout"),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config.release.repository = Some("owner/spotter".to_string());
        config.apply_env_with(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.release.token.as_deref(), Some("primary"));
        assert_eq!(config.release.repository.as_deref(), Some("owner/spotter"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[trigger]\nbranches = [\"main\"]\n").unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.trigger.branches, vec!["main".to_string()]);
    }
}
