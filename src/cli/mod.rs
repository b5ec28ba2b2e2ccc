//! CLI module for agentflow
//!
//! Handles command-line argument parsing and the demo roster the binary runs.

pub mod args;
pub mod demo;

pub use args::{Args, Commands, Verbosity};
pub use demo::{demo_agents, demo_tools, FetchReportTool};
