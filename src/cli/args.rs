//! Command-line argument parsing for agentflow
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// agentflow - run a task through a checkpointed multi-agent workflow
#[derive(Parser, Debug)]
#[command(name = "agentflow")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Route a task to specialised agents, with checkpoints and layered memory", long_about = None)]
pub struct Args {
    /// Task description
    #[arg(value_name = "TASK")]
    pub task: Option<String>,

    /// Session (conversation) id; memory is scoped to it
    #[arg(short, long, default_value = "default")]
    pub session: String,

    /// Run id; an existing run with checkpoints is resumed
    #[arg(long)]
    pub run_id: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for checkpoint files (~/.agentflow/checkpoints by default)
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except final result)
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Resume an interrupted run from its latest checkpoint
    Resume {
        /// Run to resume
        run_id: String,
    },

    /// Display the effective configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Check if task is required and provided
    pub fn validate(&self) -> Result<(), String> {
        // Task required if no subcommand
        if self.command.is_none() && self.task.is_none() {
            return Err("Task description required. Use 'agentflow <TASK>' or run a subcommand.".to_string());
        }

        // Task not allowed with subcommands
        if self.command.is_some() && self.task.is_some() {
            return Err("Cannot specify task with subcommand.".to_string());
        }

        if self.run_id.is_some() && self.command.is_some() {
            return Err("--run-id applies to task runs only; use 'agentflow resume <RUN_ID>'.".to_string());
        }

        Ok(())
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Most detailed log level to emit on stderr
    pub fn log_level(&self) -> tracing::Level {
        match self {
            Verbosity::Quiet => tracing::Level::ERROR,
            Verbosity::Normal => tracing::Level::WARN,
            Verbosity::Verbose => tracing::Level::INFO,
            Verbosity::VeryVerbose => tracing::Level::DEBUG,
        }
    }

    /// Check if should show routing and branch details
    pub fn show_details(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
