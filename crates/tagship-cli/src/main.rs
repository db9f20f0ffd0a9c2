//! tagship - tag-gated cross-build and release pipeline
//!
//! ## Commands
//!
//! - `run`: evaluate the event, build the matrix, store artifacts and publish tags
//! - `plan`: show what `run` would do for an event, without building
//! - `matrix`: list the expanded build matrix
//! - `name`: print the archive name for a binary and target

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, Level};

use tagship_ci::{
    CargoBuildExecutor, FsArtifactStore, GithubReleasePublisher, JobStatus, ReleasePipeline,
    RunReport, RunStatus, TarGzArchiver,
};
use tagship_core::obs::emit_trigger_evaluated;
use tagship_core::{
    archive_name, Event, PipelineConfig, PublishError, RunPlan, BRANCH_REF_PREFIX,
    DEFAULT_CONFIG_FILE, TAG_REF_PREFIX,
};

#[derive(Parser)]
#[command(name = "tagship")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tag-gated cross-build and release pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for one event
    Run {
        #[command(flatten)]
        event: EventArgs,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the trigger decision and the jobs that would run
    Plan {
        #[command(flatten)]
        event: EventArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the expanded build matrix
    Matrix {
        /// Path to the pipeline config
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Print the matrix as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the archive name for a binary and target
    Name {
        /// Binary name
        binary: String,

        /// Target triple
        target: String,
    },
}

/// Event selection shared by `run` and `plan`.
#[derive(Args, Debug, Clone)]
struct EventArgs {
    /// Path to the pipeline config
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Event kind; read from the GitHub Actions environment when omitted
    #[arg(long, value_enum)]
    event: Option<EventArg>,

    /// Git ref (full `refs/...` form or a short branch/tag name)
    #[arg(long = "ref", requires = "event")]
    git_ref: Option<String>,

    /// Pull-request base branch
    #[arg(long)]
    base_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EventArg {
    Push,
    #[value(name = "pull_request", alias = "pull-request")]
    PullRequest,
    Tag,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tagship_core::init_tracing(cli.json_logs, level);

    match cli.command {
        Commands::Run { event, json } => cmd_run(&event, json).await,
        Commands::Plan { event, json } => cmd_plan(&event, json),
        Commands::Matrix { config, json } => cmd_matrix(&config, json),
        Commands::Name { binary, target } => {
            println!("{}", archive_name(&binary, &target));
            Ok(())
        }
    }
}

/// Load the config file (defaults when absent) with environment overrides.
fn load_config(path: &Path) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load_or_default(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    config.apply_env();
    config
        .validate()
        .context("Invalid configuration after environment overrides")?;
    Ok(config)
}

/// Resolve the event from flags, or from the GitHub Actions environment.
fn resolve_event(args: &EventArgs) -> Result<Event> {
    let Some(kind) = args.event else {
        return Event::from_github_env().context(
            "No --event given and the GitHub Actions environment is incomplete",
        );
    };

    let event = match kind {
        EventArg::Push => {
            let git_ref = args.git_ref.as_deref().context("--ref is required for push")?;
            Event::from_ref("push", &qualify_ref(git_ref, BRANCH_REF_PREFIX), None)
        }
        EventArg::Tag => {
            let git_ref = args.git_ref.as_deref().context("--ref is required for tag")?;
            Event::from_ref("push", &qualify_ref(git_ref, TAG_REF_PREFIX), None)
        }
        EventArg::PullRequest => {
            let base = args
                .base_ref
                .as_deref()
                .context("--base-ref is required for pull_request")?;
            let git_ref = args.git_ref.as_deref().unwrap_or("");
            Event::from_ref("pull_request", git_ref, Some(base))
        }
    };
    Ok(event)
}

/// Prefix a short name with `prefix`; full refs pass through.
fn qualify_ref(git_ref: &str, prefix: &str) -> String {
    if git_ref.starts_with("refs/") {
        git_ref.to_string()
    } else {
        format!("{prefix}{git_ref}")
    }
}

/// Wire the real collaborators from configuration.
fn build_pipeline(config: &PipelineConfig) -> Result<ReleasePipeline> {
    let store = FsArtifactStore::new(&config.artifacts.dir).with_context(|| {
        format!(
            "Failed to create artifact directory {}",
            config.artifacts.dir.display()
        )
    })?;

    let mut pipeline = ReleasePipeline::new(
        config.trigger.clone(),
        config.matrix_config(),
        Arc::new(CargoBuildExecutor::from_config(&config.build)),
        Arc::new(TarGzArchiver::new()),
        Arc::new(store),
    );

    match GithubReleasePublisher::from_config(&config.release) {
        Ok(publisher) => pipeline = pipeline.with_publisher(Arc::new(publisher)),
        Err(PublishError::NotConfigured(reason)) => {
            debug!(reason = %reason, "release publishing disabled");
        }
        Err(e) => return Err(e).context("Failed to create release publisher"),
    }

    if let Some(secs) = config.build.job_timeout_secs.filter(|s| *s > 0) {
        pipeline = pipeline.with_job_timeout(Duration::from_secs(secs));
    }
    Ok(pipeline)
}

/// Run the pipeline for one event
async fn cmd_run(args: &EventArgs, json: bool) -> Result<()> {
    let config = load_config(&args.config)?;
    let event = resolve_event(args)?;
    let pipeline = build_pipeline(&config)?;

    let report = pipeline.run(&event).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.is_failed() {
        anyhow::bail!(
            "Release pipeline failed: {}/{} jobs failed",
            report.failed_count(),
            report.jobs.len()
        )
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("Run ID: {}", report.run_id);
    println!("Event: {} ({})", report.event.git_ref, report.decision.class);
    let status = match report.status {
        RunStatus::Skipped => "- SKIPPED",
        RunStatus::Succeeded => "✓ PASSED",
        RunStatus::Failed => "✗ FAILED",
    };
    println!("Status: {}", status);
    println!("Duration: {}ms", report.duration_ms);

    if report.status == RunStatus::Skipped {
        println!("\nEvent matches no trigger; nothing to build.");
        return;
    }

    println!();
    for job in &report.jobs {
        let name = job.artifact_name.as_deref().unwrap_or("-");
        match &job.status {
            JobStatus::Succeeded => {
                let published = if job.published { ", published" } else { "" };
                println!("  ✓ {} -> {} ({}ms{})", job.job, name, job.duration_ms, published);
            }
            JobStatus::Failed { stage, error } => {
                println!("  ✗ {} failed at {}: {}", job.job, stage, error);
            }
        }
    }

    println!();
    println!(
        "Summary: {}/{} jobs passed",
        report.passed_count(),
        report.jobs.len()
    );
}

/// Show the decision and jobs for one event
fn cmd_plan(args: &EventArgs, json: bool) -> Result<()> {
    let config = load_config(&args.config)?;
    let event = resolve_event(args)?;

    let RunPlan { decision, jobs } = config.plan(&event);
    emit_trigger_evaluated(&event.git_ref, &decision);

    if json {
        let plan = json!({
            "event": event,
            "decision": decision,
            "jobs": jobs
                .iter()
                .map(|job| json!({
                    "binary": job.binary,
                    "target": job.target,
                    "archive": job.archive_name(),
                    "publish": decision.is_publishable,
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Event: {} ({})", event.git_ref, decision.class);
    println!("Run: {}", if decision.should_run { "yes" } else { "no" });
    println!(
        "Publish: {}",
        if decision.is_publishable {
            format!("yes, pre-release {}", event.name)
        } else {
            "no".to_string()
        }
    );

    if !jobs.is_empty() {
        println!("\nJobs ({}):", jobs.len());
        for job in &jobs {
            println!("  {} -> {}", job, job.archive_name());
        }
    }
    Ok(())
}

/// List the expanded build matrix
fn cmd_matrix(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let jobs = config.matrix_config().expand();

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    for job in &jobs {
        println!("{}\t{}\t{}", job.binary, job.target, job.archive_name());
    }
    println!("\n{} jobs", jobs.len());
    Ok(())
}
