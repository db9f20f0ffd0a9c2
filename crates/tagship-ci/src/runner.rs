//! Cross-compilation via `cargo` or `cross`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use tagship_core::{BuildConfig, BuildError, BuildExecutor, BuildOutput, BuildTool, JobSpec};

/// Captured result of one build command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl CommandResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Build executor that shells out to `cargo build` or `cross build`.
#[derive(Debug, Clone)]
pub struct CargoBuildExecutor {
    tool: BuildTool,
    workspace: PathBuf,
    timeout: Option<Duration>,
    extra_args: Vec<String>,
}

impl CargoBuildExecutor {
    pub fn new(tool: BuildTool, workspace: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            workspace: workspace.into(),
            timeout: None,
            extra_args: Vec::new(),
        }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            tool: config.tool,
            workspace: config.workspace.clone(),
            timeout: (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs)),
            extra_args: config.extra_args.clone(),
        }
    }

    /// Override the per-build timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Full command line for `job` (first element is the program).
    pub fn command_line(&self, job: &JobSpec) -> Vec<String> {
        let mut cmd = vec![
            self.tool.program().to_string(),
            "build".to_string(),
            "--release".to_string(),
            "--target".to_string(),
            job.target.clone(),
            "--bin".to_string(),
            job.binary.clone(),
            "--target-dir".to_string(),
            job_target_dir(&self.workspace, job).display().to_string(),
        ];
        cmd.extend(self.extra_args.iter().cloned());
        cmd
    }

    /// Where the release binary for `job` lands.
    pub fn output_path(&self, job: &JobSpec) -> PathBuf {
        output_path(&self.workspace, job)
    }

    async fn execute(&self, job: &JobSpec, command: &[String]) -> Result<CommandResult, BuildError> {
        let start = Instant::now();
        let (exe, args) = command.split_first().ok_or_else(|| BuildError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty build command"),
        })?;

        debug!(command = %command.join(" "), workspace = %self.workspace.display(), "spawning build");

        let child = Command::new(exe)
            .args(args)
            .current_dir(&self.workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BuildError::Spawn {
                program: exe.clone(),
                source,
            })?;

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| BuildError::Timeout {
                    binary: job.binary.clone(),
                    target: job.target.clone(),
                    timeout,
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|source| BuildError::Spawn {
            program: exe.clone(),
            source,
        })?;

        Ok(CommandResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl BuildExecutor for CargoBuildExecutor {
    async fn build(&self, job: &JobSpec) -> Result<BuildOutput, BuildError> {
        let command = self.command_line(job);
        let result = self.execute(job, &command).await?;

        if !result.passed() {
            return Err(classify_failure(job, &result));
        }

        let path = self.output_path(job);
        if !path.is_file() {
            return Err(BuildError::MissingOutput { path });
        }

        debug!(binary = %job.binary, target = %job.target, duration_ms = result.duration_ms, "build finished");
        Ok(BuildOutput {
            job: job.clone(),
            path,
        })
    }
}

/// Cargo build directory owned by `job`:
/// `<workspace>/target/tagship/<binary>-<target>`.
///
/// Cargo holds an exclusive lock on its build directory, so jobs sharing one
/// would queue behind each other and spend their timeout waiting.
pub fn job_target_dir(workspace: &Path, job: &JobSpec) -> PathBuf {
    workspace
        .join("target")
        .join("tagship")
        .join(format!("{}-{}", job.binary, job.target))
}

/// `<job target dir>/<target>/release/<binary>[.exe]`
pub fn output_path(workspace: &Path, job: &JobSpec) -> PathBuf {
    let file = if job.target.contains("windows") {
        format!("{}.exe", job.binary)
    } else {
        job.binary.clone()
    };
    job_target_dir(workspace, job)
        .join(&job.target)
        .join("release")
        .join(file)
}

/// Turn a non-zero build exit into the matching error. rustup reports a
/// missing standard library for the target with a "may not be installed" note.
fn classify_failure(job: &JobSpec, result: &CommandResult) -> BuildError {
    if result.stderr.contains("target may not be installed") {
        return BuildError::UnsupportedTarget(job.target.clone());
    }
    BuildError::Failed {
        binary: job.binary.clone(),
        target: job.target.clone(),
        exit_code: result.exit_code,
        stderr: tail(&result.stderr, 40),
    }
}

/// Last `lines` lines of `text`; compiler errors come at the end.
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
