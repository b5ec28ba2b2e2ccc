//! Tool registry and dispatcher
//!
//! Provides validated tool execution for agents:
//! - Typed tool descriptors (parameters, result type, idempotency)
//! - Immutable registry built at startup
//! - Argument validation before any tool code runs
//! - Dispatcher with per-tool timeout, idempotent-only retry and statistics

pub mod types;
pub mod validation;
pub mod registry;
pub mod dispatcher;

// Re-export commonly used types
pub use types::{ParamType, Tool, ToolDescriptor, ToolFailure, ToolParameter, ToolStats};
pub use registry::{ToolRegistry, ToolRegistryBuilder};
pub use dispatcher::{DispatchError, ToolDispatcher};
pub use validation::{validate_args, validate_result};
