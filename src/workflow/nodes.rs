//! Built-in nodes
//!
//! Each node reads the state copy it is given and returns an update; all
//! collaborator calls go through `NodeContext`.

use crate::coordinator::{merge, output_text};
use crate::errors::{Result, WorkflowError};
use crate::memory::MemorySnapshot;
use crate::types::{Contribution, Omission, RunState, StateUpdate, Turn};
use crate::workflow::node::{Node, NodeContext, NodeKind, NodeOutput};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Normalises the task, loads memory context and records the user turn
#[derive(Debug, Default)]
pub struct PreprocessNode;

#[async_trait]
impl Node for PreprocessNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Preprocess
    }

    async fn execute(&self, state: RunState, ctx: &NodeContext) -> Result<NodeOutput> {
        let task = state.task.split_whitespace().collect::<Vec<_>>().join(" ");
        if task.is_empty() {
            return Err(WorkflowError::Validation("task must not be empty".to_string()));
        }

        let memory_config = ctx.memory.config();
        // Retrieve before storing so the task does not match itself
        let snapshot = ctx
            .memory
            .retrieve(&task, &state.session_id, memory_config.long_term_k)
            .await;
        if snapshot.degraded {
            warn!(
                run_id = %state.run_id,
                reason = snapshot.degraded_reason.as_deref().unwrap_or("unknown"),
                "continuing with degraded memory context"
            );
        }

        let turn = Turn::user(task.clone()).durable(memory_config.persist_user_turns);
        let ticket = ctx.memory.store(&state.session_id, turn.clone());
        if let Err(e) = ticket.wait().await {
            warn!(run_id = %state.run_id, error = %e, "user turn not indexed");
        }

        debug!(
            run_id = %state.run_id,
            short_term = snapshot.short_term.len(),
            long_term = snapshot.long_term.len(),
            "memory context loaded"
        );

        Ok(NodeOutput::new(StateUpdate {
            task: Some(task),
            context: Some(snapshot),
            append_messages: vec![turn],
            ..Default::default()
        }))
    }
}

/// Picks the agent(s) for the task
#[derive(Debug, Default)]
pub struct RouteNode;

#[async_trait]
impl Node for RouteNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Route
    }

    async fn execute(&self, state: RunState, ctx: &NodeContext) -> Result<NodeOutput> {
        let snapshot = state
            .context
            .clone()
            .unwrap_or_else(|| MemorySnapshot::empty(&state.session_id, &state.task));

        let decision = ctx.router.route(&state.task, &snapshot, ctx.agents())?;
        info!(
            run_id = %state.run_id,
            agents = ?decision.agents,
            confidence = decision.confidence,
            fallback = decision.fallback,
            "task routed"
        );

        Ok(NodeOutput::new(StateUpdate {
            routing: Some(decision),
            ..Default::default()
        }))
    }
}

/// Runs (or resumes) the routed agents
#[derive(Debug, Default)]
pub struct AgentExecutionNode;

#[async_trait]
impl Node for AgentExecutionNode {
    fn kind(&self) -> NodeKind {
        NodeKind::AgentExecution
    }

    async fn execute(&self, state: RunState, ctx: &NodeContext) -> Result<NodeOutput> {
        let decision = state.routing.as_ref().ok_or_else(|| {
            WorkflowError::Logic("agent execution reached without a routing decision".to_string())
        })?;

        let update = ctx.coordinator.execute(decision, &state, &ctx.cancel).await?;
        Ok(NodeOutput::new(update))
    }
}

/// Dispatches pending tool calls
#[derive(Debug, Default)]
pub struct ToolCallingNode;

#[async_trait]
impl Node for ToolCallingNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ToolCalling
    }

    async fn execute(&self, state: RunState, ctx: &NodeContext) -> Result<NodeOutput> {
        let update = ctx.coordinator.dispatch_tools(&state).await?;
        Ok(NodeOutput::new(update))
    }
}

/// Composes the final response from the merged agent outputs
#[derive(Debug, Default)]
pub struct ResponseGenerationNode;

#[async_trait]
impl Node for ResponseGenerationNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ResponseGeneration
    }

    async fn execute(&self, state: RunState, ctx: &NodeContext) -> Result<NodeOutput> {
        let (contributions, omissions) = merge(&state);
        if contributions.is_empty() {
            return Err(WorkflowError::Logic(
                "response generation reached with no agent output".to_string(),
            ));
        }

        let degraded_reason = state
            .context
            .as_ref()
            .filter(|snapshot| snapshot.degraded)
            .map(|snapshot| {
                snapshot
                    .degraded_reason
                    .clone()
                    .unwrap_or_else(|| "long-term memory unavailable".to_string())
            });
        let content = compose(&contributions, &omissions, degraded_reason.as_deref());

        let turn = Turn::assistant(content.clone()).durable(ctx.memory.config().persist_responses);
        let ticket = ctx.memory.store(&state.session_id, turn.clone());
        if let Err(e) = ticket.wait().await {
            warn!(run_id = %state.run_id, error = %e, "response not indexed");
        }

        Ok(NodeOutput::new(StateUpdate {
            append_messages: vec![turn],
            response: Some(content),
            terminal: true,
            ..Default::default()
        }))
    }
}

/// Response text: contributions in registration order, then omissions and
/// the degraded-memory note
pub fn compose(
    contributions: &[Contribution],
    omissions: &[Omission],
    degraded_reason: Option<&str>,
) -> String {
    let mut sections: Vec<String> = if contributions.len() == 1 && omissions.is_empty() {
        vec![output_text(&contributions[0].output)]
    } else {
        contributions
            .iter()
            .map(|c| format!("[{}] {}", c.agent, output_text(&c.output)))
            .collect()
    };

    if !omissions.is_empty() {
        let omitted: Vec<String> = omissions
            .iter()
            .map(|o| format!("{} ({})", o.agent, o.reason))
            .collect();
        sections.push(format!("Omitted: {}", omitted.join("; ")));
    }

    if let Some(reason) = degraded_reason {
        sections.push(format!("Note: answered without long-term memory ({})", reason));
    }

    sections.join("\n\n")
}

/// The five built-in nodes
pub fn builtin_nodes() -> Vec<Arc<dyn Node>> {
    vec![
        Arc::new(PreprocessNode),
        Arc::new(RouteNode),
        Arc::new(AgentExecutionNode),
        Arc::new(ToolCallingNode),
        Arc::new(ResponseGenerationNode),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contribution(agent: &str, output: serde_json::Value) -> Contribution {
        Contribution {
            agent: agent.to_string(),
            output,
        }
    }

    #[test]
    fn test_compose_single_contribution_is_verbatim() {
        let text = compose(&[contribution("Analyst", json!("Q1 sales rose 4%"))], &[], None);
        assert_eq!(text, "Q1 sales rose 4%");
    }

    #[test]
    fn test_compose_lists_omissions_and_degraded_memory() {
        let text = compose(
            &[
                contribution("Researcher", json!("sources found")),
                contribution("Writer", json!({"draft": 1})),
            ],
            &[Omission {
                agent: "Analyst".to_string(),
                reason: "timed out after 300ms".to_string(),
            }],
            Some("backend offline"),
        );

        assert_eq!(
            text,
            "[Researcher] sources found\n\n[Writer] {\"draft\":1}\n\n\
             Omitted: Analyst (timed out after 300ms)\n\n\
             Note: answered without long-term memory (backend offline)"
        );
    }

    #[test]
    fn test_builtin_nodes_cover_every_kind() {
        let kinds: Vec<NodeKind> = builtin_nodes().iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, NodeKind::ALL.to_vec());
    }
}
