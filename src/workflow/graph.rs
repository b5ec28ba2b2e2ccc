//! Workflow graph: edges and edge predicates
//!
//! Edge selection is a pure function of the updated state, the node that just
//! ran and its hint. The engine applies the tool-loop bound on top.

use crate::errors::{Result, WorkflowError};
use crate::types::RunState;
use crate::workflow::node::NodeKind;
use std::collections::HashMap;
use std::fmt;

/// Predicate evaluated on the updated state
pub type Predicate = fn(&RunState) -> bool;

/// At least one tool call is waiting for dispatch
pub fn has_pending_tool_calls(state: &RunState) -> bool {
    state.has_pending_tool_calls()
}

/// The run produced its final response
pub fn is_terminal(state: &RunState) -> bool {
    state.terminal
}

/// Named predicate, so edges stay printable
#[derive(Clone, Copy)]
pub struct Condition {
    pub name: &'static str,
    pub test: Predicate,
}

impl Condition {
    pub fn new(name: &'static str, test: Predicate) -> Self {
        Self { name, test }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Outgoing edge of a node
#[derive(Debug, Clone)]
pub enum Edge {
    /// Always continue with the given node
    Fixed(NodeKind),
    /// First matching condition wins; `default` when none match (`None` ends the run)
    Conditional {
        branches: Vec<(Condition, NodeKind)>,
        default: Option<NodeKind>,
    },
    End,
}

impl Edge {
    /// Every node this edge can lead to
    fn targets(&self) -> Vec<NodeKind> {
        match self {
            Edge::Fixed(next) => vec![*next],
            Edge::Conditional { branches, default } => branches
                .iter()
                .map(|(_, next)| *next)
                .chain(default.iter().copied())
                .collect(),
            Edge::End => Vec::new(),
        }
    }

    fn select(&self, state: &RunState) -> Option<NodeKind> {
        match self {
            Edge::Fixed(next) => Some(*next),
            Edge::Conditional { branches, default } => branches
                .iter()
                .find(|(condition, _)| (condition.test)(state))
                .map(|(_, next)| *next)
                .or(*default),
            Edge::End => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    entry: NodeKind,
    edges: HashMap<NodeKind, Edge>,
}

impl WorkflowGraph {
    /// Preprocess -> Route -> AgentExecution <-> ToolCalling -> ResponseGeneration
    pub fn standard() -> Self {
        let mut edges = HashMap::new();
        edges.insert(NodeKind::Preprocess, Edge::Fixed(NodeKind::Route));
        edges.insert(NodeKind::Route, Edge::Fixed(NodeKind::AgentExecution));
        edges.insert(
            NodeKind::AgentExecution,
            Edge::Conditional {
                branches: vec![(
                    Condition::new("has_pending_tool_calls", has_pending_tool_calls),
                    NodeKind::ToolCalling,
                )],
                default: Some(NodeKind::ResponseGeneration),
            },
        );
        edges.insert(NodeKind::ToolCalling, Edge::Fixed(NodeKind::AgentExecution));
        edges.insert(NodeKind::ResponseGeneration, Edge::End);

        Self {
            entry: NodeKind::Preprocess,
            edges,
        }
    }

    pub fn entry(&self) -> NodeKind {
        self.entry
    }

    pub fn edge(&self, from: NodeKind) -> Option<&Edge> {
        self.edges.get(&from)
    }

    /// Whether an edge leads from `from` to `to`
    pub fn is_reachable(&self, from: NodeKind, to: NodeKind) -> bool {
        self.edges
            .get(&from)
            .map(|edge| edge.targets().contains(&to))
            .unwrap_or(false)
    }

    /// Node to run after `from`, or `None` when the run is over
    ///
    /// A terminal state always ends the run. A hint is honoured only if an
    /// edge from `from` leads to it.
    pub fn next(
        &self,
        from: NodeKind,
        state: &RunState,
        hint: Option<NodeKind>,
    ) -> Result<Option<NodeKind>> {
        if is_terminal(state) {
            return Ok(None);
        }

        let edge = self.edges.get(&from).ok_or_else(|| {
            WorkflowError::Logic(format!("no outgoing edge defined for node {}", from))
        })?;

        match hint {
            Some(hint) if edge.targets().contains(&hint) => Ok(Some(hint)),
            Some(hint) => Err(WorkflowError::Logic(format!(
                "node {} hinted unreachable successor {}",
                from, hint
            ))),
            None => Ok(edge.select(state)),
        }
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::standard()
    }
}
