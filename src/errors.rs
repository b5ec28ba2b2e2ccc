//! Error types for agentflow
//!
//! Every failure inside a run is a `WorkflowError`, and every variant belongs
//! to exactly one `ErrorKind`. The engine uses the kind to decide between a
//! local bounded retry (transient) and aborting the run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input to a node or tool; never retried
    Validation,
    /// Timeout or temporary unavailability; retried with bounded backoff
    Transient,
    /// Checkpoint or memory store unavailable
    Resource,
    /// Router / coordinator / engine invariant violated; always fatal
    Logic,
    /// Loop or iteration cap reached
    BoundExceeded,
    /// Run cancelled by the caller between node boundaries
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Transient => "TransientError",
            ErrorKind::Resource => "ResourceError",
            ErrorKind::Logic => "LogicError",
            ErrorKind::BoundExceeded => "BoundExceeded",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Main error type for the workflow system
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    /// Input rejected by a node, agent contract or tool schema
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Tool arguments did not match the declared schema
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// Tool name not present in the registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Operation exceeded its time budget
    #[error("Operation '{operation}' timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Temporary failure of an agent, tool or collaborator
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Checkpoint store failure
    #[error("Checkpoint store error: {0}")]
    Checkpoint(String),

    /// Memory backend failure
    #[error("Memory backend error: {0}")]
    MemoryBackend(String),

    /// Router invoked with an empty agent registry
    #[error("No agents registered")]
    NoAgentsRegistered,

    /// Every fan-out branch failed, timed out or was cancelled
    #[error("All agents failed: {0}")]
    AllAgentsFailed(String),

    /// Engine, router or coordinator invariant violated
    #[error("Invariant violated: {0}")]
    Logic(String),

    /// Loop or iteration bound reached
    #[error("Bound exceeded: {what} reached limit {limit}")]
    BoundExceeded { what: String, limit: usize },

    /// Run cancelled by the caller
    #[error("Run cancelled")]
    Cancelled,

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WorkflowError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Validation(_)
            | WorkflowError::InvalidArguments { .. }
            | WorkflowError::ToolNotFound(_) => ErrorKind::Validation,
            WorkflowError::Timeout { .. } | WorkflowError::Transient(_) => ErrorKind::Transient,
            WorkflowError::Checkpoint(_) | WorkflowError::MemoryBackend(_) => ErrorKind::Resource,
            WorkflowError::NoAgentsRegistered
            | WorkflowError::AllAgentsFailed(_)
            | WorkflowError::Logic(_)
            | WorkflowError::Serialization(_) => ErrorKind::Logic,
            WorkflowError::BoundExceeded { .. } => ErrorKind::BoundExceeded,
            WorkflowError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Only transient failures are retried locally
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Serialization(err.to_string())
    }
}

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Structured error returned to the caller of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    /// Run that failed
    pub run_id: String,

    /// Failure class
    pub kind: ErrorKind,

    /// Step at which the failure occurred (the step the failing node would have produced)
    pub step: u64,

    /// Node that failed, if the failure happened inside a node
    pub node: Option<String>,

    /// Underlying cause
    pub message: String,
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at step {}", self.kind, self.step)?;
        if let Some(node) = &self.node {
            write!(f, " ({})", node)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for RunError {}

impl RunError {
    /// Build from a workflow error
    pub fn from_error(run_id: &str, step: u64, node: Option<String>, err: &WorkflowError) -> Self {
        Self {
            run_id: run_id.to_string(),
            kind: err.kind(),
            step,
            node,
            message: err.to_string(),
        }
    }

    /// Whether resubmitting the whole run might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Transient | ErrorKind::Resource)
    }

    /// Whether `resume` can pick the run up from its last checkpoint
    pub fn is_resumable(&self) -> bool {
        self.is_retryable() || self.kind == ErrorKind::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(WorkflowError::NoAgentsRegistered.kind(), ErrorKind::Logic);
        assert_eq!(
            WorkflowError::InvalidArguments {
                tool: "fetch_report".to_string(),
                reason: "missing 'quarter'".to_string(),
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            WorkflowError::Timeout { operation: "agent".to_string(), duration_ms: 10 }.kind(),
            ErrorKind::Transient
        );
        assert_eq!(WorkflowError::Checkpoint("disk full".to_string()).kind(), ErrorKind::Resource);
        assert_eq!(
            WorkflowError::BoundExceeded { what: "tool rounds".to_string(), limit: 3 }.kind(),
            ErrorKind::BoundExceeded
        );
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(WorkflowError::Transient("flaky".to_string()).is_retryable());
        assert!(!WorkflowError::Validation("bad".to_string()).is_retryable());
        assert!(!WorkflowError::Checkpoint("down".to_string()).is_retryable());
    }

    #[test]
    fn test_run_error_display() {
        let err = RunError::from_error(
            "run-1",
            2,
            Some("route".to_string()),
            &WorkflowError::NoAgentsRegistered,
        );
        let text = err.to_string();
        assert!(text.contains("LogicError"));
        assert!(text.contains("step 2"));
        assert!(text.contains("route"));
        assert!(!err.is_retryable());
        assert!(!err.is_resumable());
    }

    #[test]
    fn test_cancelled_run_is_resumable_but_not_retryable() {
        let err = RunError::from_error("run-2", 3, None, &WorkflowError::Cancelled);
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert!(!err.is_retryable());
        assert!(err.is_resumable());

        let err = RunError::from_error("run-3", 4, None, &WorkflowError::Transient("flaky".to_string()));
        assert!(err.is_resumable());
    }
}
