// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Skill orchestrator CLI.
//!
//! Thin facade over the core engine: list and inspect registered specs,
//! execute skills and workflows, resume paused workflows and inspect their
//! state. Exits 0 on success, 1 on any failure.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skill_orchestrator_core::{EngineConfig, SkillRunner, WorkflowOrchestrator};

#[derive(Parser)]
#[command(name = "skill-orchestrator")]
#[command(version, about = "Declarative skill & workflow execution engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Base path for skills, workflows and outputs
    /// (default: $AGENT_WORKSPACE, else the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    base_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered skills and workflows
    List,

    /// Show the full definition of a skill or workflow
    Info {
        /// Name of the skill or workflow
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Execute a skill
    Run {
        /// Skill name
        #[arg(value_name = "NAME")]
        name: String,

        /// Inputs as a JSON object, or a path to a JSON file
        #[arg(short, long)]
        inputs: Option<String>,

        /// Validate without executing
        #[arg(long)]
        dry_run: bool,
    },

    /// Execute a workflow
    Workflow {
        /// Workflow name
        #[arg(value_name = "NAME")]
        name: String,

        /// Inputs as a JSON object, or a path to a JSON file
        #[arg(short, long)]
        inputs: Option<String>,

        /// Validate without executing
        #[arg(long)]
        dry_run: bool,

        /// Resume from the persisted checkpoint state
        #[arg(long)]
        resume: bool,
    },

    /// Show the persisted state of a paused or failed workflow
    Status {
        /// Workflow name
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("skill_orchestrator_core={log_level},skill_orchestrator_cli={log_level}")
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &cli.base_path {
        Some(base) => EngineConfig::new(base),
        None => EngineConfig::from_env(),
    };

    let result = match cli.command {
        Commands::List => list(&config),
        Commands::Info { name } => info_command(&config, &name),
        Commands::Run { name, inputs, dry_run } => {
            run_skill(&config, &name, inputs.as_deref(), dry_run).await
        }
        Commands::Workflow { name, inputs, dry_run, resume } => {
            run_workflow(&config, &name, inputs.as_deref(), dry_run, resume).await
        }
        Commands::Status { name } => status(&config, &name),
    };

    match result {
        Ok(success) if success => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            std::process::exit(1);
        }
    }
}

fn list(config: &EngineConfig) -> Result<bool> {
    let orchestrator = WorkflowOrchestrator::new(config.clone())
        .context("Failed to load registries")?;

    println!("{}", "Skills:".cyan().bold());
    let skills = orchestrator.skill_runner().list_skills();
    if skills.is_empty() {
        println!("  (none)");
    }
    for name in &skills {
        if let Some(skill) = orchestrator.skill_runner().skill_info(name) {
            println!("  {} v{} [{}]", name.green(), skill.version, skill.autonomy);
        }
    }

    println!("{}", "Workflows:".cyan().bold());
    let workflows = orchestrator.list_workflows();
    if workflows.is_empty() {
        println!("  (none)");
    }
    for name in &workflows {
        if let Some(workflow) = orchestrator.workflow_info(name) {
            println!(
                "  {} v{} ({} phases)",
                name.green(),
                workflow.version,
                workflow.phases.len()
            );
        }
    }

    Ok(true)
}

fn info_command(config: &EngineConfig, name: &str) -> Result<bool> {
    let orchestrator = WorkflowOrchestrator::new(config.clone())
        .context("Failed to load registries")?;

    if let Some(skill) = orchestrator.skill_runner().skill_info(name) {
        println!("{}", serde_json::to_string_pretty(&skill)?);
        return Ok(true);
    }
    if let Some(workflow) = orchestrator.workflow_info(name) {
        println!("{}", serde_json::to_string_pretty(&workflow)?);
        return Ok(true);
    }

    eprintln!(
        "{} '{name}' is neither a skill nor a workflow",
        "Not found:".red().bold()
    );
    eprintln!("Skills: {:?}", orchestrator.skill_runner().list_skills());
    eprintln!("Workflows: {:?}", orchestrator.list_workflows());
    Ok(false)
}

async fn run_skill(
    config: &EngineConfig,
    name: &str,
    inputs: Option<&str>,
    dry_run: bool,
) -> Result<bool> {
    let inputs = parse_inputs(inputs)?;
    let cancel = cancel_on_ctrl_c();

    let runner = SkillRunner::new(config.clone())
        .context("Failed to load skill registry")?
        .with_cancellation_token(cancel);

    println!("{} {name}", "Executing skill:".cyan().bold());
    let result = runner.execute_skill(name, inputs, None, dry_run).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.success {
        println!("{}", "✓ Skill completed".green().bold());
    } else {
        println!("{}", "✗ Skill failed".red().bold());
    }
    Ok(result.success)
}

async fn run_workflow(
    config: &EngineConfig,
    name: &str,
    inputs: Option<&str>,
    dry_run: bool,
    resume: bool,
) -> Result<bool> {
    let inputs = parse_inputs(inputs)?;
    let cancel = cancel_on_ctrl_c();

    let orchestrator = WorkflowOrchestrator::new(config.clone())
        .context("Failed to load registries")?
        .with_cancellation_token(cancel);

    println!("{} {name}", "Executing workflow:".cyan().bold());
    let result = orchestrator
        .execute_workflow(name, inputs, None, dry_run, resume)
        .await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.success {
        println!("{}", "✓ Workflow completed".green().bold());
    } else {
        println!("{} (status: {})", "✗ Workflow did not complete".red().bold(), result.status);
    }
    Ok(result.success)
}

fn status(config: &EngineConfig, name: &str) -> Result<bool> {
    let store = skill_orchestrator_core::StateStore::new(config.state_path());
    match store.load(name) {
        Some(state) => {
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(true)
        }
        None => {
            println!(
                "No persisted state for workflow '{name}' (never paused or failed, or already completed)"
            );
            Ok(true)
        }
    }
}

/// Parse `--inputs`: a JSON object literal, or a path to a JSON file.
fn parse_inputs(input: Option<&str>) -> Result<Map<String, Value>> {
    let Some(input) = input else {
        return Ok(Map::new());
    };

    let content = if Path::new(input).is_file() {
        fs::read_to_string(input).with_context(|| format!("Failed to read input file: {input}"))?
    } else {
        input.to_string()
    };

    let value: Value =
        serde_json::from_str(&content).context("Inputs must be a JSON object")?;
    match value {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("Inputs must be a JSON object, got: {value}"),
    }
}

/// Cancellation token wired to Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; cancelling execution");
            handle.cancel();
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inputs_from_json_string() {
        let inputs = parse_inputs(Some(r#"{"env": "stage", "retries": 3}"#)).unwrap();
        assert_eq!(inputs["env"], serde_json::json!("stage"));
        assert_eq!(inputs["retries"], serde_json::json!(3));
    }

    #[test]
    fn test_parse_inputs_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("inputs.json");
        fs::write(&file, r#"{"project": "api"}"#).unwrap();

        let inputs = parse_inputs(Some(file.to_str().unwrap())).unwrap();
        assert_eq!(inputs["project"], serde_json::json!("api"));
    }

    #[test]
    fn test_parse_inputs_rejects_non_object() {
        assert!(parse_inputs(Some("[1, 2, 3]")).is_err());
        assert!(parse_inputs(Some("not json")).is_err());
    }

    #[test]
    fn test_parse_inputs_empty() {
        assert!(parse_inputs(None).unwrap().is_empty());
    }
}
