//! Workflow graph engine
//!
//! Nodes, the edges between them, checkpoint persistence and the engine that
//! drives a run from preprocessing to the final response.

pub mod checkpoint;
pub mod engine;
pub mod graph;
pub mod node;
pub mod nodes;

pub use checkpoint::{replay, Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use engine::{RunResult, WorkflowEngine, WorkflowEngineBuilder};
pub use graph::{has_pending_tool_calls, is_terminal, Condition, Edge, Predicate, WorkflowGraph};
pub use node::{Node, NodeContext, NodeKind, NodeOutput};
pub use nodes::{
    builtin_nodes, compose, AgentExecutionNode, PreprocessNode, ResponseGenerationNode, RouteNode,
    ToolCallingNode,
};
