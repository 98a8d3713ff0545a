// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! Orchestrator CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use orchestrator_core::dryrun::format_plan;
use orchestrator_core::engine::Engine;
use orchestrator_core::handlers::{
    CheckReviewHandler, CreatePrHandler, GatherHandler, ImplementHandler, InitPhaseHandler, RunFixHandler,
    RunPhaseWorkflowHandler, ScatterHandler, ShredHandler,
};
use orchestrator_core::registry::Registry;
use orchestrator_core::store::FilesystemStateStore;
use orchestrator_core::types::WorkflowDefinition;
use orchestrator_core::{validator, Settings, StateStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(version, about = "Workflow execution engine for AI-assisted development pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory runs are checkpointed into.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow fresh.
    Run {
        /// Built-in workflow name or path to a YAML/JSON definition file.
        #[arg(long)]
        workflow: String,
    },

    /// Resume a previously checkpointed run.
    Resume {
        /// The run ID to resume.
        #[arg(long)]
        run_id: String,

        /// Built-in workflow name or definition file, if it differs from the
        /// one recorded in the checkpoint.
        #[arg(long)]
        workflow_file: Option<String>,
    },

    /// Validate a workflow definition without running it.
    Validate {
        #[arg(long)]
        workflow: String,
    },

    /// Print a definition's execution plan without running it.
    DryRun {
        #[arg(long)]
        workflow: String,

        #[arg(long)]
        no_color: bool,
    },

    /// List checkpointed runs.
    ListRuns,

    /// Print a checkpointed run's full state as JSON.
    ShowRun {
        #[arg(long)]
        run_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = Settings::load().unwrap_or_else(|err| {
        eprintln!("{} {}", "Error:".red().bold(), err);
        std::process::exit(1);
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| settings.log_filter.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state_dir = cli.state_dir.clone().unwrap_or(settings.state_dir.clone());

    let result = match cli.command {
        Commands::Run { workflow } => run_workflow(&workflow, &state_dir, &settings).await,
        Commands::Resume { run_id, workflow_file } => resume_workflow(&run_id, workflow_file.as_deref(), &state_dir, &settings).await,
        Commands::Validate { workflow } => validate_workflow(&workflow),
        Commands::DryRun { workflow, no_color } => dry_run_workflow(&workflow, !no_color),
        Commands::ListRuns => list_runs(&state_dir).await,
        Commands::ShowRun { run_id } => show_run(&run_id, &state_dir).await,
    };

    if let Err(err) = result {
        error!("{err}");
        eprintln!("{} {}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

fn load_definition(workflow: &str) -> Result<WorkflowDefinition> {
    if let Some(def) = orchestrator_core::workflows::builtin(workflow) {
        return Ok(def);
    }

    let content = std::fs::read_to_string(workflow).with_context(|| format!("failed to read workflow file '{workflow}'"))?;
    if workflow.ends_with(".json") {
        WorkflowDefinition::from_json(&content).with_context(|| format!("failed to parse '{workflow}' as JSON"))
    } else {
        WorkflowDefinition::from_yaml(&content).with_context(|| format!("failed to parse '{workflow}' as YAML"))
    }
}

fn build_registry() -> Registry {
    let mut registry = Registry::new();
    let _ = registry.register(Arc::new(ImplementHandler::new()));
    let _ = registry.register(Arc::new(orchestrator_core::handlers::ReviewHandler::new()));
    let _ = registry.register(Arc::new(CheckReviewHandler::new()));
    let _ = registry.register(Arc::new(RunFixHandler::new()));
    let _ = registry.register(Arc::new(CreatePrHandler::new()));
    let _ = registry.register(Arc::new(InitPhaseHandler::new()));
    let _ = registry.register(Arc::new(RunPhaseWorkflowHandler::new()));
    let _ = registry.register(Arc::new(orchestrator_core::handlers::AdvancePhaseHandler::new()));
    let _ = registry.register(Arc::new(ShredHandler::new()));
    let _ = registry.register(Arc::new(ScatterHandler::new()));
    let _ = registry.register(Arc::new(GatherHandler::new()));
    registry
}

async fn run_workflow(workflow: &str, state_dir: &std::path::Path, settings: &Settings) -> Result<()> {
    info!("running workflow: {workflow}");
    println!("{} {}", "Running workflow:".cyan().bold(), workflow);

    let def = load_definition(workflow)?;
    let registry = build_registry();
    let store = Arc::new(FilesystemStateStore::new(state_dir));
    let engine = Engine::new(registry).with_max_iterations(settings.max_iterations).with_checkpointing(store);

    let result = engine.run(CancellationToken::new(), &def, None).await.with_context(|| "workflow execution failed")?;

    println!("{}", "Run finished".green().bold());
    println!("  Run ID: {}", result.id);
    println!("  Final step: {}", result.current_step);
    println!("  Steps executed: {}", result.step_history.len());
    Ok(())
}

async fn resume_workflow(run_id: &str, workflow_file: Option<&str>, state_dir: &std::path::Path, settings: &Settings) -> Result<()> {
    info!("resuming run: {run_id}");
    println!("{} {}", "Resuming run:".cyan().bold(), run_id);

    let store = FilesystemStateStore::new(state_dir);
    let state = store.load(run_id).await.with_context(|| format!("failed to load run '{run_id}'"))?;

    let workflow_name = workflow_file.unwrap_or(&state.workflow_name);
    let def = load_definition(workflow_name)?;

    let registry = build_registry();
    let engine = Engine::new(registry)
        .with_max_iterations(settings.max_iterations)
        .with_checkpointing(Arc::new(FilesystemStateStore::new(state_dir)));

    let result = engine.run(CancellationToken::new(), &def, Some(state)).await.with_context(|| "workflow execution failed")?;

    println!("{}", "Run finished".green().bold());
    println!("  Final step: {}", result.current_step);
    println!("  Total steps executed: {}", result.step_history.len());
    Ok(())
}

fn validate_workflow(workflow: &str) -> Result<()> {
    let def = load_definition(workflow)?;
    let report = validator::validate(&def, None);

    for finding in &report.findings {
        let label = match finding.severity {
            validator::Severity::Error => "error".red().bold(),
            validator::Severity::Warning => "warning".yellow().bold(),
        };
        println!("[{label}] {} {}", finding.code, finding.message);
    }

    if report.is_valid() {
        println!("{}", "Workflow is valid".green().bold());
        Ok(())
    } else {
        anyhow::bail!("workflow '{}' failed validation", def.name);
    }
}

fn dry_run_workflow(workflow: &str, styled: bool) -> Result<()> {
    let def = load_definition(workflow)?;
    println!("{}", format_plan(&def, styled));
    Ok(())
}

async fn list_runs(state_dir: &std::path::Path) -> Result<()> {
    let store = FilesystemStateStore::new(state_dir);
    let summaries = store.list().await.with_context(|| "failed to list runs")?;

    if summaries.is_empty() {
        println!("No runs found in {}", state_dir.display());
        return Ok(());
    }

    for summary in summaries {
        println!(
            "{}  {:<24}  {:<16}  {:<10}  steps={}",
            summary.id,
            summary.workflow_name,
            summary.current_step,
            summary.status.as_str(),
            summary.step_count
        );
    }
    Ok(())
}

async fn show_run(run_id: &str, state_dir: &std::path::Path) -> Result<()> {
    let store = FilesystemStateStore::new(state_dir);
    let state = store.load(run_id).await.with_context(|| format!("failed to load run '{run_id}'"))?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
