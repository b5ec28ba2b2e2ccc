//! Agents
//!
//! An agent is a fixed capability interface: an immutable descriptor plus an
//! `execute` call. Agents hold no per-run state; the coordinator resumes an
//! agent by calling it again with the results of the tools it requested.

pub mod registry;
pub mod scripted;

use crate::memory::MemorySnapshot;
use crate::types::{ToolCallRecord, ToolRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use registry::{AgentRegistry, AgentRegistryBuilder};
pub use scripted::{ScriptStep, ScriptedAgent};

/// Output contract of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Output must be a JSON string
    Text,
    /// Any JSON value
    Json,
}

impl OutputKind {
    pub fn accepts(&self, output: &Value) -> bool {
        match self {
            OutputKind::Text => output.is_string(),
            OutputKind::Json => true,
        }
    }
}

/// Agent descriptor, registered once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub description: String,
    /// Capability tags matched by the router
    pub capabilities: Vec<String>,
    /// Tools this agent may call; empty means any registered tool
    pub allowed_tools: Vec<String>,
    pub output: OutputKind,
}

impl AgentDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            capabilities: Vec::new(),
            allowed_tools: Vec::new(),
            output: OutputKind::Text,
        }
    }

    pub fn capabilities<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, output: OutputKind) -> Self {
        self.output = output;
        self
    }

    pub fn allows_tool(&self, tool: &str) -> bool {
        self.allowed_tools.is_empty() || self.allowed_tools.iter().any(|t| t == tool)
    }
}

/// Input to one agent invocation
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub run_id: String,
    pub session_id: String,
    pub task: String,
    /// 0 on the first call, incremented on every resume
    pub round: u32,
    pub memory: Option<MemorySnapshot>,
    /// Every completed tool call this agent requested so far, in request order
    pub tool_results: Vec<ToolCallRecord>,
    /// Observed at suspension points
    pub cancel: CancellationToken,
}

/// What an agent wants to do next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentAction {
    /// Final output of this agent
    Complete { output: Value },
    /// Run these tools, then resume the agent with the results
    CallTools { requests: Vec<ToolRequest> },
}

/// Internal agent failure; isolated to the agent's branch
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct AgentFault(pub String);

impl AgentFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Agent implementation
#[async_trait]
pub trait Agent: Send + Sync {
    fn descriptor(&self) -> &AgentDescriptor;

    async fn execute(&self, ctx: AgentContext) -> std::result::Result<AgentAction, AgentFault>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_contract() {
        assert!(OutputKind::Text.accepts(&json!("summary")));
        assert!(!OutputKind::Text.accepts(&json!({"summary": 1})));
        assert!(OutputKind::Json.accepts(&json!({"summary": 1})));
    }

    #[test]
    fn test_allowed_tools() {
        let open = AgentDescriptor::new("Researcher", "");
        assert!(open.allows_tool("web_search"));

        let restricted = AgentDescriptor::new("Analyst", "").allowed_tools(["fetch_report"]);
        assert!(restricted.allows_tool("fetch_report"));
        assert!(!restricted.allows_tool("web_search"));
    }

    #[test]
    fn test_action_serialization() {
        let action = AgentAction::CallTools {
            requests: vec![ToolRequest::new("fetch_report", json!({"quarter": "Q1"}))],
        };
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["action"], "call_tools");
    }
}
