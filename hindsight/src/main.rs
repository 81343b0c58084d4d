//! hindsight - learn from past Claude Code sessions
//!
//! Resolves the transcripts of the current project, analyzes them in
//! token-budgeted batches and prints the merged insights as JSON for a
//! memory-file updater.

mod progress;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use hindsight_core::analysis::{self, AnalysisClient, ClaudeCliClient};
use hindsight_core::config::LlmProvider;
use hindsight_core::format::{format_bytes, format_relative_time, format_relative_time_opt};
use hindsight_core::guard::PollutionGuard;
use hindsight_core::ingest::ProjectResolver;
use hindsight_core::memory::{MemoryFile, MemoryHandoff, DEFAULT_MEMORY_FILE};
use hindsight_core::pipeline::{self, AnalysisRequest, PipelineOutcome, PlanOutcome};
use hindsight_core::{Config, Project};
use serde_json::json;

use crate::progress::BarProgress;

#[derive(Parser)]
#[command(name = "hindsight")]
#[command(about = "Learn from past Claude Code sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show which transcripts belong to the working directory
    Resolve {
        #[command(flatten)]
        target: Target,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Analyze the project's transcripts and print the merged insights
    Analyze {
        #[command(flatten)]
        target: Target,

        /// Token ceiling per batch (overrides analysis.max_batch_tokens)
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Only analyze the newest N sessions
        #[arg(long)]
        max_sessions: Option<usize>,

        /// Memory file handed to the updater (default: <cwd>/CLAUDE.md)
        #[arg(long)]
        memory_file: Option<PathBuf>,

        /// Plan batches without calling the analysis service
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete transcripts created by hindsight's own analysis calls
    Clean {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(Args)]
struct Target {
    /// Working directory to resolve (default: current directory)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Claude Code data directory (default: store.claude_root or ~/.claude)
    #[arg(long)]
    store_root: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl Target {
    fn cwd(&self) -> Result<String> {
        let cwd = match &self.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir().context("failed to read current directory")?,
        };
        Ok(cwd.to_string_lossy().into_owned())
    }

    fn projects_root(&self, config: &Config) -> PathBuf {
        match &self.store_root {
            Some(root) => root.join("projects"),
            None => config.store.projects_root(),
        }
    }

    fn resolve(&self, config: &Config) -> Result<Project> {
        let cwd = self.cwd()?;
        let root = self.projects_root(config);
        ProjectResolver::new(&root)
            .resolve(&cwd)
            .with_context(|| no_project_message(&cwd, &root))
    }
}

fn no_project_message(cwd: &str, root: &Path) -> String {
    format!(
        "no Claude Code transcripts found for {} under {}",
        cwd,
        root.display()
    )
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging (to file, stdout carries the JSON output)
    let log_guard =
        hindsight_core::logging::init(&config.logging).context("failed to initialize logging")?;

    match cli.command {
        Command::Resolve { target, format } => resolve(&target, format, &config),
        Command::Analyze {
            target,
            max_tokens,
            max_sessions,
            memory_file,
            dry_run,
        } => {
            let cwd = target.cwd()?;
            let request = AnalysisRequest {
                cwd: cwd.clone(),
                projects_root: Some(target.projects_root(&config)),
                max_sessions,
                max_batch_tokens: max_tokens,
            };
            if dry_run {
                dry_run_plan(&request, &config)
            } else {
                let memory_path =
                    memory_file.unwrap_or_else(|| Path::new(&cwd).join(DEFAULT_MEMORY_FILE));
                analyze(&request, &config, &memory_path, log_guard.dir())
            }
        }
        Command::Clean { target } => clean(&target, &config),
    }
}

fn resolve(target: &Target, format: Format, config: &Config) -> Result<()> {
    let project = target.resolve(config)?;

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        Format::Text => {
            println!("Project:  {}", project.display_name);
            println!("Dir:      {}", project.dir.display());
            println!("Match:    {}", project.match_kind);
            println!("Activity: {:.3}", project.activity_score);
            println!(
                "Last:     {}",
                format_relative_time_opt(project.last_modified())
            );
            println!(
                "Sessions: {} ({})",
                project.sessions.len(),
                format_bytes(project.total_bytes())
            );
            for session in &project.sessions {
                println!(
                    "  {}  {:>8}  {}",
                    session.id,
                    format_relative_time(session.modified_at),
                    format_bytes(session.size_bytes)
                );
            }
        }
    }
    Ok(())
}

fn dry_run_plan(request: &AnalysisRequest, config: &Config) -> Result<()> {
    let prepared = match pipeline::plan(request, config) {
        PlanOutcome::Planned(prepared) => prepared,
        PlanOutcome::NoProject { cwd } => {
            bail!(no_project_message(&cwd, &config_root(request, config)))
        }
    };

    let batches: Vec<_> = prepared
        .batches
        .iter()
        .enumerate()
        .map(|(index, batch)| {
            json!({
                "index": index,
                "messages": batch.messages.len(),
                "estimated_tokens": batch.estimated_tokens,
                "first": batch.messages.first().map(|m| m.timestamp),
                "last": batch.messages.last().map(|m| m.timestamp),
            })
        })
        .collect();

    let plan = json!({
        "project": prepared.project,
        "stats": prepared.stats,
        "batches": batches,
    });
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn analyze(
    request: &AnalysisRequest,
    config: &Config,
    memory_path: &Path,
    log_dir: &Path,
) -> Result<()> {
    let client = create_client(config, &request.cwd)?;
    let mut progress = BarProgress::new(log_dir.to_path_buf())?;

    let analysis = match pipeline::run(request, config, client.as_ref(), &mut progress) {
        PipelineOutcome::Analyzed(analysis) => analysis,
        PipelineOutcome::NoProject { cwd } => {
            bail!(no_project_message(&cwd, &config_root(request, config)))
        }
    };

    let memory = MemoryFile::load(memory_path)
        .with_context(|| format!("failed to read {}", memory_path.display()))?;
    let handoff = MemoryHandoff::new(&analysis.report.merged, &memory);

    let output = json!({
        "project": analysis.project.display_name,
        "run_id": analysis.report.run_id,
        "stats": analysis.stats,
        "batches": analysis.report.outcomes,
        "swept": analysis.swept,
        "cleanup": analysis.cleanup,
        "memory_file_exists": memory.exists,
        "handoff": handoff,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    tracing::info!(
        run_id = %analysis.report.run_id,
        succeeded = analysis.report.succeeded(),
        failed = analysis.report.failed(),
        "Analyze command finished"
    );
    Ok(())
}

fn clean(target: &Target, config: &Config) -> Result<()> {
    let project = target.resolve(config)?;
    let guard = PollutionGuard::new(&project.dir, &config.guard);
    let removed = guard.sweep();
    let dir = guard.project_dir().display();

    if removed.is_empty() {
        println!("No self-generated transcripts in {}", dir);
    } else {
        println!(
            "Removed {} self-generated transcript(s) from {}:",
            removed.len(),
            dir
        );
        for id in &removed {
            println!("  {}", id);
        }
    }
    Ok(())
}

/// The CLI collaborator runs from the analyzed directory so its own
/// transcripts land where the guard watches for them.
fn create_client(config: &Config, cwd: &str) -> Result<Box<dyn AnalysisClient>> {
    match config.llm.provider {
        LlmProvider::ClaudeCli => {
            let client = ClaudeCliClient::new(&config.llm);
            if Path::new(cwd).is_dir() {
                Ok(Box::new(client.with_working_dir(cwd)))
            } else {
                Ok(Box::new(client))
            }
        }
        _ => analysis::create_client(&config.llm).context("failed to create analysis client"),
    }
}

fn config_root(request: &AnalysisRequest, config: &Config) -> PathBuf {
    request
        .projects_root
        .clone()
        .unwrap_or_else(|| config.store.projects_root())
}
