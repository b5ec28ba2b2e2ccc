//! Multi-agent coordinator
//!
//! Runs the agents named by a routing decision as independent tokio tasks,
//! each bounded by the per-agent timeout and observing a cancellation token.
//! Branch results are merged by registration order, never completion order,
//! and every excluded branch is recorded with its reason.

use crate::agents::{Agent, AgentAction, AgentContext, AgentFault, AgentRegistry};
use crate::config::{CoordinatorConfig, WaitPolicy};
use crate::errors::{Result, WorkflowError};
use crate::router::RoutingDecision;
use crate::telemetry::{TelemetryCollector, WorkflowEvent};
use crate::tools::ToolDispatcher;
use crate::types::{
    BranchRecord, BranchStatus, Contribution, Omission, Role, RunState, StateUpdate,
    ToolCallRecord, ToolCallStatus, ToolRequest, Turn,
};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{AbortHandle, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How one branch ended, before it is turned into a `BranchStatus`
enum BranchOutcome {
    Action(AgentAction),
    Fault(AgentFault),
    TimedOut,
    Cancelled,
}

/// Aborts the spawned agent tasks when the fan-out future is dropped
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Branch scheduled in the current round
struct Branch {
    agent: Arc<dyn Agent>,
    name: String,
    position: usize,
    round: u32,
}

/// Multi-agent coordinator
pub struct MultiAgentCoordinator {
    agents: Arc<AgentRegistry>,
    dispatcher: Arc<ToolDispatcher>,
    config: CoordinatorConfig,
    telemetry: Option<TelemetryCollector>,
}

impl MultiAgentCoordinator {
    pub fn new(
        agents: Arc<AgentRegistry>,
        dispatcher: Arc<ToolDispatcher>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            agents,
            dispatcher,
            config,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Run (or resume) every routed agent that has not finished yet
    ///
    /// Agents waiting on tools are called again with their completed tool
    /// calls. Fails with `AllAgentsFailed` when no branch is still viable and
    /// with `Cancelled` when `cancel` fired during the join.
    pub async fn execute(
        &self,
        decision: &RoutingDecision,
        state: &RunState,
        cancel: &CancellationToken,
    ) -> Result<StateUpdate> {
        let branches = self.runnable_branches(decision, state)?;
        if branches.is_empty() {
            return Err(WorkflowError::Logic(
                "agent execution scheduled with no runnable agents".to_string(),
            ));
        }

        let names: Vec<String> = branches.iter().map(|b| b.name.clone()).collect();
        info!(run_id = %state.run_id, agents = ?names, "dispatching agents");
        self.emit(WorkflowEvent::FanOut {
            run_id: state.run_id.clone(),
            agents: names,
            timestamp: Instant::now(),
        });

        // Dropping this future (node timeout, caller abort) ends every branch
        let fan_out = cancel.child_token();
        let _cancel_on_drop = fan_out.clone().drop_guard();
        let mut agent_tasks = AbortOnDrop(Vec::with_capacity(branches.len()));
        let mut join_set = JoinSet::new();

        for (slot, branch) in branches.iter().enumerate() {
            let ctx = AgentContext {
                run_id: state.run_id.clone(),
                session_id: state.session_id.clone(),
                task: state.task.clone(),
                round: branch.round,
                memory: state.context.clone(),
                tool_results: state.completed_calls_for(&branch.name),
                cancel: fan_out.child_token(),
            };
            let agent = Arc::clone(&branch.agent);
            let timeout = self.config.agent_timeout();

            // Inner task isolates panics; the supervising task always reports back
            let inner = tokio::spawn(async move {
                let token = ctx.cancel.clone();
                tokio::select! {
                    biased;
                    _ = token.cancelled() => BranchOutcome::Cancelled,
                    result = tokio::time::timeout(timeout, agent.execute(ctx)) => match result {
                        Ok(Ok(action)) => BranchOutcome::Action(action),
                        Ok(Err(fault)) => BranchOutcome::Fault(fault),
                        Err(_) => BranchOutcome::TimedOut,
                    },
                }
            });
            agent_tasks.0.push(inner.abort_handle());
            join_set.spawn(async move {
                let started = Instant::now();
                let outcome = inner.await;
                (slot, outcome, started.elapsed().as_millis() as u64)
            });
        }

        let mut finished: Vec<Option<(BranchStatus, Vec<ToolRequest>)>> =
            (0..branches.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            let (slot, outcome, duration_ms) = match joined {
                Ok(reported) => reported,
                // supervisor tasks never panic; only reachable on runtime shutdown
                Err(e) => {
                    return Err(WorkflowError::Logic(format!("branch supervisor lost: {}", e)))
                }
            };
            let branch = &branches[slot];
            let (status, requests) = self.branch_status(branch, outcome);

            debug!(
                run_id = %state.run_id,
                agent = %branch.name,
                round = branch.round,
                duration_ms,
                status = status_label(&status),
                "branch finished"
            );
            self.emit(WorkflowEvent::BranchFinished {
                run_id: state.run_id.clone(),
                agent: branch.name.clone(),
                outcome: status_label(&status).to_string(),
                duration_ms,
                timestamp: Instant::now(),
            });

            if self.config.wait_policy == WaitPolicy::FirstCompleted && status.is_completed() {
                fan_out.cancel();
            }
            finished[slot] = Some((status, requests));
        }

        if cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        // Under FirstCompleted, one completion ends every other branch
        let settled = self.config.wait_policy == WaitPolicy::FirstCompleted
            && finished
                .iter()
                .flatten()
                .any(|(status, _)| status.is_completed());

        let mut update = StateUpdate::new();
        for (branch, outcome) in branches.iter().zip(finished) {
            let (mut status, mut requests) =
                outcome.unwrap_or((BranchStatus::Cancelled, Vec::new()));

            if settled && matches!(status, BranchStatus::AwaitingTools { .. }) {
                status = BranchStatus::Cancelled;
                requests.clear();
            }

            match &status {
                BranchStatus::Completed { output } => {
                    update
                        .results
                        .insert(format!("agent:{}", branch.name), output.clone());
                    update.append_messages.push(Turn::new(
                        Role::Agent(branch.name.clone()),
                        output_text(output),
                    ));
                }
                BranchStatus::Failed { reason } => {
                    warn!(run_id = %state.run_id, agent = %branch.name, %reason, "agent branch failed");
                }
                BranchStatus::TimedOut { after_ms } => {
                    warn!(run_id = %state.run_id, agent = %branch.name, after_ms, "agent branch timed out");
                }
                _ => {}
            }

            for (index, request) in requests.into_iter().enumerate() {
                update.queue_tool_calls.push(ToolCallRecord::pending(
                    &branch.name,
                    branch.round,
                    index,
                    request,
                ));
            }

            update.branches.push(BranchRecord {
                agent: branch.name.clone(),
                position: branch.position,
                rounds: branch.round + 1,
                status,
            });
        }

        self.ensure_viable(decision, state, &update)?;
        Ok(update)
    }

    /// Invoke every pending tool call in request order
    ///
    /// Unknown tools, disallowed tools and invalid arguments abort with a
    /// validation error. Timeouts and tool failures are recorded on the call
    /// and handed back to the agent.
    pub async fn dispatch_tools(&self, state: &RunState) -> Result<StateUpdate> {
        let pending: Vec<&ToolCallRecord> = state.pending_tool_calls().collect();
        if pending.is_empty() {
            return Err(WorkflowError::Logic(
                "tool calling scheduled with no pending calls".to_string(),
            ));
        }

        let mut update = StateUpdate::new();
        update.tool_round_completed = true;

        for call in pending {
            let allowed = self
                .agents
                .descriptor(&call.agent)
                .map(|d| d.allows_tool(&call.request.tool))
                .unwrap_or(false);
            if !allowed {
                return Err(WorkflowError::Validation(format!(
                    "agent '{}' may not call tool '{}'",
                    call.agent, call.request.tool
                )));
            }

            let started = Instant::now();
            let completed = match self
                .dispatcher
                .invoke(&call.request.tool, call.request.args.clone())
                .await
            {
                Ok(output) => {
                    update
                        .results
                        .insert(format!("tool:{}", call.id), output.clone());
                    call.succeeded(output, started.elapsed().as_millis() as u64)
                }
                Err(e) if e.is_rejection() => {
                    warn!(run_id = %state.run_id, call = %call.id, error = %e, "tool call rejected");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(run_id = %state.run_id, call = %call.id, error = %e, "tool call failed, returning error to agent");
                    call.failed(e.to_string())
                }
            };

            update.append_messages.push(Turn::new(
                Role::Tool(call.request.tool.clone()),
                match &completed.status {
                    ToolCallStatus::Succeeded { output, .. } => output_text(output),
                    ToolCallStatus::Failed { error } => format!("error: {}", error),
                    ToolCallStatus::Pending => String::new(),
                },
            ));
            update.complete_tool_calls.push(completed);
        }

        Ok(update)
    }

    fn runnable_branches(&self, decision: &RoutingDecision, state: &RunState) -> Result<Vec<Branch>> {
        let mut branches = Vec::new();

        for name in &decision.agents {
            let (agent, position) = match (self.agents.get(name), self.agents.position(name)) {
                (Some(agent), Some(position)) => (agent, position),
                _ => {
                    return Err(WorkflowError::Logic(format!(
                        "routing decision names unregistered agent '{}'",
                        name
                    )))
                }
            };

            let round = match state.branch(name) {
                None => 0,
                Some(record) => match record.status {
                    BranchStatus::AwaitingTools { .. } => record.rounds,
                    _ => continue,
                },
            };

            branches.push(Branch {
                agent,
                name: name.clone(),
                position,
                round,
            });
        }

        branches.sort_by_key(|b| b.position);
        Ok(branches)
    }

    fn branch_status(
        &self,
        branch: &Branch,
        outcome: std::result::Result<BranchOutcome, JoinError>,
    ) -> (BranchStatus, Vec<ToolRequest>) {
        match outcome {
            Ok(BranchOutcome::Action(AgentAction::Complete { output })) => {
                let contract = branch.agent.descriptor().output;
                if contract.accepts(&output) {
                    (BranchStatus::Completed { output }, Vec::new())
                } else {
                    let reason = format!("output violates {:?} contract", contract);
                    (BranchStatus::Failed { reason }, Vec::new())
                }
            }
            Ok(BranchOutcome::Action(AgentAction::CallTools { requests })) => {
                if requests.is_empty() {
                    let reason = "requested an empty tool batch".to_string();
                    (BranchStatus::Failed { reason }, Vec::new())
                } else {
                    let requested = requests.len();
                    (BranchStatus::AwaitingTools { requested }, requests)
                }
            }
            Ok(BranchOutcome::Fault(fault)) => {
                let reason = fault.to_string();
                (BranchStatus::Failed { reason }, Vec::new())
            }
            Ok(BranchOutcome::TimedOut) => {
                let after_ms = self.config.agent_timeout_ms;
                (BranchStatus::TimedOut { after_ms }, Vec::new())
            }
            Ok(BranchOutcome::Cancelled) => (BranchStatus::Cancelled, Vec::new()),
            Err(e) if e.is_panic() => {
                let reason = format!("panicked: {}", panic_message(e.into_panic()));
                (BranchStatus::Failed { reason }, Vec::new())
            }
            Err(_) => (BranchStatus::Cancelled, Vec::new()),
        }
    }

    /// At least one routed agent must have completed or still be working
    fn ensure_viable(
        &self,
        decision: &RoutingDecision,
        state: &RunState,
        update: &StateUpdate,
    ) -> Result<()> {
        let mut reasons = Vec::new();

        for name in &decision.agents {
            let status = update
                .branches
                .iter()
                .find(|b| &b.agent == name)
                .or_else(|| state.branch(name))
                .map(|b| &b.status);

            match status {
                Some(status) if status.is_viable() => return Ok(()),
                Some(status) => reasons.push(format!(
                    "{}: {}",
                    name,
                    status.omission_reason().unwrap_or_default()
                )),
                None => reasons.push(format!("{}: never ran", name)),
            }
        }

        Err(WorkflowError::AllAgentsFailed(reasons.join("; ")))
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(event);
        }
    }
}

fn status_label(status: &BranchStatus) -> &'static str {
    match status {
        BranchStatus::Completed { .. } => "completed",
        BranchStatus::AwaitingTools { .. } => "awaiting_tools",
        BranchStatus::TimedOut { .. } => "timed_out",
        BranchStatus::Failed { .. } => "failed",
        BranchStatus::Cancelled => "cancelled",
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Plain text of an agent or tool output
pub fn output_text(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Contributions and omissions of a run, in registration order
pub fn merge(state: &RunState) -> (Vec<Contribution>, Vec<Omission>) {
    let mut contributions = Vec::new();
    let mut omissions = Vec::new();

    for branch in &state.branches {
        match &branch.status {
            BranchStatus::Completed { output } => contributions.push(Contribution {
                agent: branch.agent.clone(),
                output: output.clone(),
            }),
            status => omissions.push(Omission {
                agent: branch.agent.clone(),
                reason: status
                    .omission_reason()
                    .unwrap_or_else(|| "did not complete".to_string()),
            }),
        }
    }

    (contributions, omissions)
}
