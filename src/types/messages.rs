//! Message types exchanged between the engine, agents and tools
//!
//! Conversation turns, tool requests and the records that track a tool call
//! from the moment an agent asks for it until its result is handed back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool arguments: a JSON object with deterministic key order
pub type ToolArgs = serde_json::Map<String, Value>;

/// Author of a conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "name", rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Agent(String),
    Tool(String),
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Whether the turn should also be indexed into long-term memory
    pub durable: bool,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            durable: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Mark for long-term indexing
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Tool invocation requested by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub args: ToolArgs,
}

impl ToolRequest {
    /// Build a request; non-object `args` become an empty object
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => ToolArgs::new(),
        };

        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// Lifecycle of a tool call inside a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Requested by an agent, not dispatched yet
    Pending,
    /// Tool returned a result
    Succeeded { output: Value, duration_ms: u64 },
    /// Tool failed or timed out; handed back to the agent as an error
    Failed { error: String },
}

/// A tool call tracked in run state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Deterministic id: `<agent>#<round>.<index>`
    pub id: String,
    /// Agent that requested the call
    pub agent: String,
    /// Agent round in which the call was requested
    pub round: u32,
    pub request: ToolRequest,
    pub status: ToolCallStatus,
}

impl ToolCallRecord {
    pub fn pending(agent: &str, round: u32, index: usize, request: ToolRequest) -> Self {
        Self {
            id: format!("{}#{}.{}", agent, round, index),
            agent: agent.to_string(),
            round,
            request,
            status: ToolCallStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, ToolCallStatus::Pending)
    }

    /// Completed copy with a successful result
    pub fn succeeded(&self, output: Value, duration_ms: u64) -> Self {
        Self {
            status: ToolCallStatus::Succeeded { output, duration_ms },
            ..self.clone()
        }
    }

    /// Completed copy with a failure handed back to the agent
    pub fn failed(&self, error: impl Into<String>) -> Self {
        Self {
            status: ToolCallStatus::Failed { error: error.into() },
            ..self.clone()
        }
    }
}
