//! Type definitions module
//!
//! Run state, conversation turns, tool call records and execution results.

pub mod messages;
pub mod state;
pub mod execution;

// Re-export commonly used types
pub use messages::{Role, ToolArgs, ToolCallRecord, ToolCallStatus, ToolRequest, Turn};
pub use state::{RunState, StateUpdate};
pub use execution::{BranchRecord, BranchStatus, Contribution, FinalResponse, Omission};
