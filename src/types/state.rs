//! Run state threaded through the workflow graph
//!
//! `RunState` is owned by the engine. Nodes receive a copy and return a
//! `StateUpdate`; only `RunState::advance` merges updates, and it is also what
//! checkpoint replay uses, so a replayed run folds to the same state.

use crate::errors::{Result, WorkflowError};
use crate::memory::MemorySnapshot;
use crate::router::RoutingDecision;
use crate::types::execution::BranchRecord;
use crate::types::messages::{ToolCallRecord, Turn};
use crate::workflow::NodeKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Mutable state of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    /// Conversation / session the run belongs to
    pub session_id: String,
    /// Task text (normalised by preprocessing)
    pub task: String,
    /// Ordered conversation turns produced during the run
    pub messages: Vec<Turn>,
    /// Set once by the route node, immutable afterwards
    pub routing: Option<RoutingDecision>,
    /// Memory snapshot used for routing and handed to agents
    pub context: Option<MemorySnapshot>,
    /// Pending and completed tool calls, in request order
    pub tool_calls: Vec<ToolCallRecord>,
    /// Per-agent branch records, in registration order
    pub branches: Vec<BranchRecord>,
    /// Intermediate results keyed by `agent:<name>` / `tool:<call id>`
    pub results: BTreeMap<String, Value>,
    /// AgentExecution -> ToolCalling round trips taken
    pub tool_rounds: usize,
    /// Number of node executions applied
    pub step: u64,
    /// Node to execute next; `None` once the run has ended
    pub next_node: Option<NodeKind>,
    pub response: Option<String>,
    pub terminal: bool,
}

impl RunState {
    /// Initial state (step 0)
    pub fn new(run_id: impl Into<String>, session_id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            session_id: session_id.into(),
            task: task.into(),
            messages: Vec::new(),
            routing: None,
            context: None,
            tool_calls: Vec::new(),
            branches: Vec::new(),
            results: BTreeMap::new(),
            tool_rounds: 0,
            step: 0,
            next_node: Some(NodeKind::Preprocess),
            response: None,
            terminal: false,
        }
    }

    pub fn pending_tool_calls(&self) -> impl Iterator<Item = &ToolCallRecord> {
        self.tool_calls.iter().filter(|call| call.is_pending())
    }

    pub fn has_pending_tool_calls(&self) -> bool {
        self.tool_calls.iter().any(|call| call.is_pending())
    }

    /// Completed tool calls requested by one agent
    pub fn completed_calls_for(&self, agent: &str) -> Vec<ToolCallRecord> {
        self.tool_calls
            .iter()
            .filter(|call| call.agent == agent && !call.is_pending())
            .cloned()
            .collect()
    }

    pub fn branch(&self, agent: &str) -> Option<&BranchRecord> {
        self.branches.iter().find(|b| b.agent == agent)
    }

    pub fn memory_degraded(&self) -> bool {
        self.context.as_ref().map(|c| c.degraded).unwrap_or(false)
    }

    /// Produce the state of the next step
    ///
    /// Applies `update`, increments the step counter and records the node
    /// selected to run next. `self` is left untouched.
    pub fn advance(&self, update: &StateUpdate, next: Option<NodeKind>) -> Result<RunState> {
        if self.terminal {
            return Err(WorkflowError::Logic(format!(
                "run {} already terminal at step {}",
                self.run_id, self.step
            )));
        }

        let mut next_state = self.clone();
        update.apply_to(&mut next_state)?;
        next_state.step = self.step + 1;
        next_state.next_node = if next_state.terminal { None } else { next };

        Ok(next_state)
    }
}

/// Partial update returned by a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub append_messages: Vec<Turn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MemorySnapshot>,
    /// New pending calls; ids must be unused
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queue_tool_calls: Vec<ToolCallRecord>,
    /// Completed calls replacing pending records with the same id
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub complete_tool_calls: Vec<ToolCallRecord>,
    /// Branch records upserted by agent name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<BranchRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, Value>,
    #[serde(default)]
    pub tool_round_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default)]
    pub terminal: bool,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self == &StateUpdate::default()
    }

    fn apply_to(&self, state: &mut RunState) -> Result<()> {
        if let Some(task) = &self.task {
            state.task = task.clone();
        }

        state.messages.extend(self.append_messages.iter().cloned());

        if let Some(routing) = &self.routing {
            if state.routing.is_some() {
                return Err(WorkflowError::Logic(
                    "routing decision already attached to run".to_string(),
                ));
            }
            state.routing = Some(routing.clone());
        }

        if let Some(context) = &self.context {
            state.context = Some(context.clone());
        }

        for call in &self.queue_tool_calls {
            if state.tool_calls.iter().any(|c| c.id == call.id) {
                return Err(WorkflowError::Logic(format!("duplicate tool call id {}", call.id)));
            }
            if !call.is_pending() {
                return Err(WorkflowError::Logic(format!(
                    "queued tool call {} is not pending",
                    call.id
                )));
            }
            state.tool_calls.push(call.clone());
        }

        for done in &self.complete_tool_calls {
            let slot = state
                .tool_calls
                .iter_mut()
                .find(|c| c.id == done.id && c.is_pending())
                .ok_or_else(|| {
                    WorkflowError::Logic(format!("no pending tool call with id {}", done.id))
                })?;
            *slot = done.clone();
        }

        for branch in &self.branches {
            match state.branches.iter_mut().find(|b| b.agent == branch.agent) {
                Some(existing) => *existing = branch.clone(),
                None => state.branches.push(branch.clone()),
            }
        }
        state.branches.sort_by_key(|b| b.position);

        for (key, value) in &self.results {
            state.results.insert(key.clone(), value.clone());
        }

        if self.tool_round_completed {
            state.tool_rounds += 1;
        }

        if let Some(response) = &self.response {
            state.response = Some(response.clone());
        }

        if self.terminal {
            state.terminal = true;
        }

        Ok(())
    }
}
