//! agentflow - Checkpointed multi-agent workflow engine
//!
//! A task enters the workflow graph, is enriched with layered memory, routed
//! to one or more specialised agents and answered once their outputs (and
//! any tool results they asked for) have been merged. Every node transition
//! is checkpointed so an interrupted run can be resumed.
//!
//! # Architecture
//!
//! - **workflow**: graph, nodes, checkpoints and the engine driving a run
//! - **router**: capability scoring and agent selection
//! - **coordinator**: parallel fan-out, timeouts and result merging
//! - **memory**: short-term window, long-term store and decay
//! - **tools**: registry, argument validation and dispatch

pub mod errors;
pub mod config;
pub mod retry;
pub mod telemetry;
pub mod types;

pub mod tools;
pub mod memory;
pub mod agents;
pub mod router;
pub mod coordinator;
pub mod workflow;

pub mod cli;

// Re-export commonly used types
pub use config::WorkflowConfig;
pub use errors::{ErrorKind, Result, RunError, WorkflowError};
pub use workflow::{WorkflowEngine, WorkflowEngineBuilder};
