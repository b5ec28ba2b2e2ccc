//! Execution result types
//!
//! Per-agent branch outcomes produced by the coordinator and the final
//! response handed to the caller. Omitted branches are always listed
//! explicitly; nothing is dropped silently.

use crate::router::RoutingDecision;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one agent branch in a fan-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchStatus {
    /// Agent declared completion
    Completed { output: Value },
    /// Agent asked for tool calls and will be resumed with their results
    AwaitingTools { requested: usize },
    /// Agent exceeded its per-invocation timeout
    TimedOut { after_ms: u64 },
    /// Agent faulted, panicked or broke its output contract
    Failed { reason: String },
    /// Branch cancelled before it finished
    Cancelled,
}

impl BranchStatus {
    /// Branch produced (or is still producing) usable output
    pub fn is_viable(&self) -> bool {
        matches!(
            self,
            BranchStatus::Completed { .. } | BranchStatus::AwaitingTools { .. }
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, BranchStatus::Completed { .. })
    }

    /// Short reason recorded for omitted branches
    pub fn omission_reason(&self) -> Option<String> {
        match self {
            BranchStatus::TimedOut { after_ms } => Some(format!("timed out after {}ms", after_ms)),
            BranchStatus::Failed { reason } => Some(format!("failed: {}", reason)),
            BranchStatus::Cancelled => Some("cancelled".to_string()),
            _ => None,
        }
    }
}

/// Per-agent record kept in run state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub agent: String,
    /// Registration index of the agent; merge order key
    pub position: usize,
    /// Number of times the agent has been invoked in this run
    pub rounds: u32,
    pub status: BranchStatus,
}

/// Output contributed by one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub agent: String,
    pub output: Value,
}

/// Agent excluded from the merged result, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Omission {
    pub agent: String,
    pub reason: String,
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub run_id: String,
    pub session_id: String,
    /// Composed response text
    pub content: String,
    /// Outputs in agent registration order
    pub contributions: Vec<Contribution>,
    /// Branches excluded from the merge
    pub omissions: Vec<Omission>,
    pub routing: Option<RoutingDecision>,
    /// Memory context was produced without long-term records
    pub degraded_memory: bool,
    /// Last committed step
    pub steps: u64,
}
