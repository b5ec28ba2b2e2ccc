//! Deterministic scripted agent
//!
//! Plays back one configured step per round. Used by the demo roster and by
//! tests that need controllable latency, tool requests and faults.

use crate::agents::{Agent, AgentAction, AgentContext, AgentDescriptor, AgentFault};
use crate::types::{ToolCallStatus, ToolRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One scripted round
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Complete with a fixed output
    Complete(Value),
    /// Complete with a text summary of the tool results received so far
    Summarize(String),
    /// Request tool calls
    CallTools(Vec<ToolRequest>),
    /// Report an internal fault
    Fault(String),
    /// Panic inside the agent task
    #[cfg(test)]
    Panic(String),
}

pub struct ScriptedAgent {
    descriptor: AgentDescriptor,
    /// Step for round `i`; the last step repeats
    script: Vec<ScriptStep>,
    delay: Duration,
    invocations: Arc<AtomicUsize>,
}

impl ScriptedAgent {
    pub fn new(descriptor: AgentDescriptor, script: Vec<ScriptStep>) -> Self {
        Self {
            descriptor,
            script,
            delay: Duration::ZERO,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Simulated latency before every step
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared invocation counter
    pub fn invocations(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.invocations)
    }

    fn step(&self, round: u32) -> Option<&ScriptStep> {
        self.script
            .get(round as usize)
            .or_else(|| self.script.last())
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: AgentContext) -> Result<AgentAction, AgentFault> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(AgentFault::new("cancelled")),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        match self.step(ctx.round) {
            None => Err(AgentFault::new(format!(
                "agent '{}' has no script",
                self.descriptor.name
            ))),
            Some(ScriptStep::Complete(output)) => Ok(AgentAction::Complete {
                output: output.clone(),
            }),
            Some(ScriptStep::Summarize(prefix)) => {
                let parts: Vec<String> = ctx
                    .tool_results
                    .iter()
                    .map(|call| match &call.status {
                        ToolCallStatus::Succeeded { output, .. } => {
                            format!("{} -> {}", call.request.tool, output)
                        }
                        ToolCallStatus::Failed { error } => {
                            format!("{} failed ({})", call.request.tool, error)
                        }
                        ToolCallStatus::Pending => format!("{} pending", call.request.tool),
                    })
                    .collect();

                let text = if parts.is_empty() {
                    prefix.clone()
                } else {
                    format!("{}: {}", prefix, parts.join("; "))
                };
                Ok(AgentAction::Complete {
                    output: Value::String(text),
                })
            }
            Some(ScriptStep::CallTools(requests)) => Ok(AgentAction::CallTools {
                requests: requests.clone(),
            }),
            Some(ScriptStep::Fault(message)) => Err(AgentFault::new(message.clone())),
            #[cfg(test)]
            Some(ScriptStep::Panic(message)) => panic!("{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCallRecord;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn ctx(round: u32, tool_results: Vec<ToolCallRecord>) -> AgentContext {
        AgentContext {
            run_id: "run".to_string(),
            session_id: "session".to_string(),
            task: "summarize sales for Q1".to_string(),
            round,
            memory: None,
            tool_results,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_script_plays_per_round() {
        let request = ToolRequest::new("fetch_report", json!({"quarter": "Q1"}));
        let agent = ScriptedAgent::new(
            AgentDescriptor::new("Analyst", ""),
            vec![
                ScriptStep::CallTools(vec![request.clone()]),
                ScriptStep::Summarize("Q1 summary".to_string()),
            ],
        );

        let first = agent.execute(ctx(0, Vec::new())).await.unwrap();
        assert_eq!(first, AgentAction::CallTools { requests: vec![request.clone()] });

        let done = ToolCallRecord::pending("Analyst", 0, 0, request).succeeded(json!({"total": 42}), 5);
        let second = agent.execute(ctx(1, vec![done])).await.unwrap();
        assert_eq!(
            second,
            AgentAction::Complete {
                output: json!("Q1 summary: fetch_report -> {\"total\":42}")
            }
        );
        assert_eq!(agent.invocations().load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_last_step_repeats() {
        let agent = ScriptedAgent::new(
            AgentDescriptor::new("Writer", ""),
            vec![ScriptStep::Complete(json!("draft"))],
        );
        let action = agent.execute(ctx(4, Vec::new())).await.unwrap();
        assert_eq!(action, AgentAction::Complete { output: json!("draft") });
    }

    #[tokio::test]
    async fn test_fault_and_empty_script() {
        let faulty = ScriptedAgent::new(
            AgentDescriptor::new("Researcher", ""),
            vec![ScriptStep::Fault("index corrupted".to_string())],
        );
        assert_eq!(
            faulty.execute(ctx(0, Vec::new())).await.unwrap_err(),
            AgentFault::new("index corrupted")
        );

        let empty = ScriptedAgent::new(AgentDescriptor::new("Empty", ""), Vec::new());
        assert!(empty.execute(ctx(0, Vec::new())).await.is_err());
    }

    #[tokio::test]
    async fn test_cancellation_observed_during_delay() {
        let agent = ScriptedAgent::new(
            AgentDescriptor::new("Slow", ""),
            vec![ScriptStep::Complete(json!("late"))],
        )
        .with_delay(Duration::from_secs(10));

        let context = ctx(0, Vec::new());
        context.cancel.cancel();
        assert_eq!(
            agent.execute(context).await.unwrap_err(),
            AgentFault::new("cancelled")
        );
    }
}
