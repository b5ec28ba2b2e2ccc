//! Node contract
//!
//! A node is a function from a copy of the run state to a partial update plus
//! an optional next-node hint. Collaborators are injected through
//! `NodeContext`; nodes keep no state between runs.

use crate::agents::AgentRegistry;
use crate::config::WorkflowConfig;
use crate::coordinator::MultiAgentCoordinator;
use crate::errors::Result;
use crate::memory::HierarchicalMemory;
use crate::router::IntelligentRouter;
use crate::types::{RunState, StateUpdate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stages of the workflow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Preprocess,
    Route,
    AgentExecution,
    ToolCalling,
    ResponseGeneration,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Preprocess,
        NodeKind::Route,
        NodeKind::AgentExecution,
        NodeKind::ToolCalling,
        NodeKind::ResponseGeneration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Preprocess => "preprocess",
            NodeKind::Route => "route",
            NodeKind::AgentExecution => "agent_execution",
            NodeKind::ToolCalling => "tool_calling",
            NodeKind::ResponseGeneration => "response_generation",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Collaborators available to a node during one run
#[derive(Clone)]
pub struct NodeContext {
    pub memory: Arc<HierarchicalMemory>,
    pub router: Arc<IntelligentRouter>,
    pub coordinator: Arc<MultiAgentCoordinator>,
    pub config: Arc<WorkflowConfig>,
    /// Run cancellation; observed by the agent fan-out
    pub cancel: CancellationToken,
}

impl NodeContext {
    pub fn agents(&self) -> &AgentRegistry {
        self.coordinator.agents()
    }
}

/// Result of one node execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutput {
    pub update: StateUpdate,
    /// Preferred successor; must be reachable by an edge from this node
    pub hint: Option<NodeKind>,
}

impl NodeOutput {
    pub fn new(update: StateUpdate) -> Self {
        Self { update, hint: None }
    }

    pub fn with_hint(mut self, hint: NodeKind) -> Self {
        self.hint = Some(hint);
        self
    }
}

/// Executable graph node
#[async_trait]
pub trait Node: Send + Sync {
    /// Graph position this node implements
    fn kind(&self) -> NodeKind;

    async fn execute(&self, state: RunState, ctx: &NodeContext) -> Result<NodeOutput>;
}
