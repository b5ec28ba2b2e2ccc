//! agentflow - Main CLI Entry Point

use agentflow::{
    cli::{demo_agents, demo_tools, Args, Commands, Verbosity},
    config::WorkflowConfig,
    errors::RunError,
    types::FinalResponse,
    workflow::{FileCheckpointStore, WorkflowEngine},
};
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(message) = args.validate() {
        eprintln!("{}", message.red());
        eprintln!("\nUsage:");
        eprintln!("  agentflow <task> [--session ID] [--run-id ID]   Run a task");
        eprintln!("  agentflow resume <run-id>                       Resume a run");
        eprintln!("  agentflow config                                Show configuration");
        std::process::exit(2);
    }

    init_logging(args.verbosity());
    let config = load_config(&args)?;

    match &args.command {
        Some(Commands::Config) => show_config(&args, &config)?,
        Some(Commands::Resume { run_id }) => {
            let engine = build_engine(&args, config)?;
            let cancel = cancel_on_ctrl_c();
            let outcome = engine.resume_with_cancel(run_id, cancel).await;
            report(outcome, args.verbosity());
        }
        None => {
            let task = args.task.clone().unwrap_or_default();
            let engine = build_engine(&args, config)?;
            let cancel = cancel_on_ctrl_c();

            let outcome = match &args.run_id {
                Some(run_id) => {
                    engine
                        .run_with_id_with_cancel(run_id, &task, &args.session, cancel)
                        .await
                }
                None => engine.submit_with_cancel(&task, &args.session, cancel).await,
            };
            report(outcome, args.verbosity());
        }
    }

    Ok(())
}

fn init_logging(verbosity: Verbosity) {
    tracing_subscriber::fmt()
        .with_max_level(verbosity.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> Result<WorkflowConfig> {
    match &args.config {
        Some(path) => WorkflowConfig::load_from(path),
        None => WorkflowConfig::load(),
    }
}

fn build_engine(args: &Args, config: WorkflowConfig) -> Result<WorkflowEngine> {
    let store = match &args.checkpoint_dir {
        Some(dir) => FileCheckpointStore::new(dir),
        None => FileCheckpointStore::default_location()
            .context("Failed to resolve checkpoint directory")?,
    };

    Ok(WorkflowEngine::builder(config)
        .agents(demo_agents().context("Failed to register demo agents")?)
        .tools(demo_tools().context("Failed to register demo tools")?)
        .checkpoint_store(Arc::new(store))
        .build())
}

/// Cancel the run at the next node boundary on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling run...".yellow());
            token.cancel();
        }
    });
    cancel
}

fn report(outcome: std::result::Result<FinalResponse, RunError>, verbosity: Verbosity) {
    match outcome {
        Ok(response) => print_response(&response, verbosity),
        Err(error) => {
            eprintln!("{} {}", "Run failed:".red().bold(), error);
            eprintln!("  run id: {}", error.run_id);
            if error.is_resumable() {
                eprintln!(
                    "  {}",
                    format!("resume with: agentflow resume {}", error.run_id).dimmed()
                );
            }
            std::process::exit(1);
        }
    }
}

fn print_response(response: &FinalResponse, verbosity: Verbosity) {
    if verbosity.show_details() {
        if let Some(routing) = &response.routing {
            println!(
                "{} {} (confidence {:.2}{})",
                "Routed to".cyan(),
                routing.agents.join(", ").bold(),
                routing.confidence,
                if routing.fallback { ", fallback" } else { "" }
            );
        }
        for contribution in &response.contributions {
            println!("  {} {}", "✓".green(), contribution.agent);
        }
    }

    for omission in &response.omissions {
        println!(
            "  {} {} omitted: {}",
            "!".yellow(),
            omission.agent,
            omission.reason
        );
    }
    if response.degraded_memory {
        println!("  {} long-term memory unavailable for this run", "!".yellow());
    }

    if verbosity != Verbosity::Quiet {
        println!();
    }
    println!("{}", response.content);

    if verbosity.show_details() {
        println!();
        println!(
            "{}",
            format!("run {} completed in {} steps", response.run_id, response.steps).dimmed()
        );
    }
}

fn show_config(args: &Args, config: &WorkflowConfig) -> Result<()> {
    let source = match &args.config {
        Some(path) => path.display().to_string(),
        None => WorkflowConfig::config_path()?.display().to_string(),
    };

    println!("{} {}", "Configuration:".bold(), source);
    println!();
    println!(
        "{}",
        toml::to_string_pretty(config).context("Failed to serialize config")?
    );

    Ok(())
}
