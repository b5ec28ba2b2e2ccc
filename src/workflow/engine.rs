//! Workflow graph engine
//!
//! Owns the run state, executes one node at a time, applies its update,
//! selects the next node from the graph and checkpoints before moving on.
//! A run restarted with an existing id continues after its latest committed
//! step and never re-executes a checkpointed node.

use crate::agents::AgentRegistry;
use crate::config::WorkflowConfig;
use crate::coordinator::{merge, MultiAgentCoordinator};
use crate::errors::{ErrorKind, Result, RunError, WorkflowError};
use crate::memory::{HierarchicalMemory, InMemoryVectorStore, MemoryBackend};
use crate::retry::RetryManager;
use crate::router::IntelligentRouter;
use crate::telemetry::{TelemetryCollector, WorkflowEvent};
use crate::tools::{ToolDispatcher, ToolRegistry};
use crate::types::{FinalResponse, RunState};
use crate::workflow::checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::node::{Node, NodeContext, NodeKind, NodeOutput};
use crate::workflow::nodes::builtin_nodes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a run as seen by the caller
pub type RunResult = std::result::Result<FinalResponse, RunError>;

pub struct WorkflowEngine {
    config: Arc<WorkflowConfig>,
    graph: WorkflowGraph,
    nodes: HashMap<NodeKind, Arc<dyn Node>>,
    memory: Arc<HierarchicalMemory>,
    router: Arc<IntelligentRouter>,
    coordinator: Arc<MultiAgentCoordinator>,
    store: Arc<dyn CheckpointStore>,
    node_retry: RetryManager,
    checkpoint_retry: RetryManager,
    telemetry: TelemetryCollector,
}

impl WorkflowEngine {
    pub fn builder(config: WorkflowConfig) -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::new(config)
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn memory(&self) -> &HierarchicalMemory {
        &self.memory
    }

    pub fn coordinator(&self) -> &MultiAgentCoordinator {
        &self.coordinator
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    pub fn checkpoint_store(&self) -> &dyn CheckpointStore {
        self.store.as_ref()
    }

    /// Start a new run under a fresh id
    pub async fn submit(&self, task: &str, session_id: &str) -> RunResult {
        self.submit_with_cancel(task, session_id, CancellationToken::new())
            .await
    }

    pub async fn submit_with_cancel(
        &self,
        task: &str,
        session_id: &str,
        cancel: CancellationToken,
    ) -> RunResult {
        let run_id = Uuid::new_v4().to_string();
        self.start(&run_id, task, session_id, &cancel).await
    }

    /// Resume `run_id` if it has checkpoints, otherwise start it
    pub async fn run_with_id(&self, run_id: &str, task: &str, session_id: &str) -> RunResult {
        self.run_with_id_with_cancel(run_id, task, session_id, CancellationToken::new())
            .await
    }

    pub async fn run_with_id_with_cancel(
        &self,
        run_id: &str,
        task: &str,
        session_id: &str,
        cancel: CancellationToken,
    ) -> RunResult {
        match self.store.load_latest(run_id).await {
            Ok(Some(checkpoint)) => self.resume_from(checkpoint, &cancel).await,
            Ok(None) => self.start(run_id, task, session_id, &cancel).await,
            Err(e) => Err(RunError::from_error(run_id, 0, None, &e)),
        }
    }

    /// Continue a run from its latest checkpoint
    pub async fn resume(&self, run_id: &str) -> RunResult {
        self.resume_with_cancel(run_id, CancellationToken::new())
            .await
    }

    pub async fn resume_with_cancel(&self, run_id: &str, cancel: CancellationToken) -> RunResult {
        match self.store.load_latest(run_id).await {
            Ok(Some(checkpoint)) => self.resume_from(checkpoint, &cancel).await,
            Ok(None) => Err(RunError::from_error(
                run_id,
                0,
                None,
                &WorkflowError::Validation(format!("no checkpoints found for run {}", run_id)),
            )),
            Err(e) => Err(RunError::from_error(run_id, 0, None, &e)),
        }
    }

    /// Every committed checkpoint of a run
    pub async fn checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>> {
        self.store.load_all(run_id).await
    }

    async fn start(
        &self,
        run_id: &str,
        task: &str,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> RunResult {
        let state = RunState::new(run_id, session_id, task);
        info!(run_id = %run_id, session = %session_id, "run started");

        if let Err(e) = self.commit(Checkpoint::initial(state.clone())).await {
            return Err(self.fail(&state, None, e, 0));
        }
        self.drive(state, cancel).await
    }

    async fn resume_from(&self, checkpoint: Checkpoint, cancel: &CancellationToken) -> RunResult {
        info!(
            run_id = %checkpoint.run_id,
            step = checkpoint.step,
            next = ?checkpoint.state.next_node,
            "resuming run from checkpoint"
        );
        self.drive(checkpoint.state, cancel).await
    }

    async fn drive(&self, mut state: RunState, cancel: &CancellationToken) -> RunResult {
        let ctx = NodeContext {
            memory: Arc::clone(&self.memory),
            router: Arc::clone(&self.router),
            coordinator: Arc::clone(&self.coordinator),
            config: Arc::clone(&self.config),
            cancel: cancel.clone(),
        };
        let max_steps = self.config.engine.max_steps;

        loop {
            if state.terminal {
                return match self.final_response(&state) {
                    Ok(response) => {
                        info!(run_id = %state.run_id, steps = state.step, "run finished");
                        self.telemetry.record(WorkflowEvent::RunFinished {
                            run_id: state.run_id.clone(),
                            steps: state.step,
                            success: true,
                            timestamp: Instant::now(),
                        });
                        Ok(response)
                    }
                    Err(e) => Err(self.fail(&state, None, e, state.step)),
                };
            }

            let kind = match state.next_node {
                Some(kind) => kind,
                None => {
                    let e = WorkflowError::Logic("run has no next node and no response".to_string());
                    return Err(self.fail(&state, None, e, state.step + 1));
                }
            };

            if cancel.is_cancelled() {
                return Err(self.fail(&state, Some(kind), WorkflowError::Cancelled, state.step + 1));
            }
            if state.step >= max_steps as u64 {
                let e = WorkflowError::BoundExceeded {
                    what: "workflow steps".to_string(),
                    limit: max_steps,
                };
                return Err(self.fail(&state, Some(kind), e, state.step + 1));
            }

            match self.step(&state, kind, &ctx).await {
                Ok(next) => state = next,
                Err(e) => return Err(self.fail(&state, Some(kind), e, state.step + 1)),
            }
        }
    }

    /// Execute `kind`, select its successor and commit the resulting step
    async fn step(&self, state: &RunState, kind: NodeKind, ctx: &NodeContext) -> Result<RunState> {
        let node = self
            .nodes
            .get(&kind)
            .ok_or_else(|| WorkflowError::Logic(format!("no node registered for {}", kind)))?;
        let step = state.step + 1;

        debug!(run_id = %state.run_id, step, node = %kind, "node started");
        self.telemetry.record(WorkflowEvent::NodeStarted {
            run_id: state.run_id.clone(),
            step,
            node: kind.to_string(),
            timestamp: Instant::now(),
        });
        let started = Instant::now();

        let output = self.execute_node(node.as_ref(), kind, state, ctx).await?;

        let mut next_state = state.advance(&output.update, None)?;
        let next = self.graph.next(kind, &next_state, output.hint)?;
        self.check_tool_bound(kind, next, &next_state)?;
        if next.is_none() && !next_state.terminal {
            return Err(WorkflowError::Logic(format!(
                "graph ended after {} without a final response",
                kind
            )));
        }
        next_state.next_node = next;

        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(run_id = %state.run_id, step, node = %kind, duration_ms, next = ?next, "node completed");
        self.telemetry.record(WorkflowEvent::NodeCompleted {
            run_id: state.run_id.clone(),
            step,
            node: kind.to_string(),
            duration_ms,
            timestamp: Instant::now(),
        });

        self.commit(Checkpoint::after_node(kind, output.update, next_state.clone()))
            .await?;
        Ok(next_state)
    }

    /// One node execution with the configured timeout, retrying transient errors
    async fn execute_node(
        &self,
        node: &dyn Node,
        kind: NodeKind,
        state: &RunState,
        ctx: &NodeContext,
    ) -> Result<NodeOutput> {
        let limit = self.config.engine.node_timeout();

        self.node_retry
            .execute_with_retry(
                || async move {
                    let attempt = node.execute(state.clone(), ctx);
                    match limit {
                        None => attempt.await,
                        Some(limit) => match tokio::time::timeout(limit, attempt).await {
                            Ok(result) => result,
                            Err(_) => Err(WorkflowError::Timeout {
                                operation: format!("node {}", kind),
                                duration_ms: limit.as_millis() as u64,
                            }),
                        },
                    }
                },
                |e: &WorkflowError| e.is_retryable(),
                |attempt, e| {
                    warn!(run_id = %state.run_id, node = %kind, attempt, error = %e, "node failed, retrying");
                    self.telemetry.record(WorkflowEvent::NodeRetry {
                        run_id: state.run_id.clone(),
                        node: kind.to_string(),
                        attempt,
                        timestamp: Instant::now(),
                    });
                },
            )
            .await
    }

    /// AgentExecution -> ToolCalling is only taken while rounds remain
    fn check_tool_bound(&self, from: NodeKind, next: Option<NodeKind>, state: &RunState) -> Result<()> {
        let limit = self.config.engine.max_tool_iterations;
        if from == NodeKind::AgentExecution
            && next == Some(NodeKind::ToolCalling)
            && state.tool_rounds >= limit
        {
            return Err(WorkflowError::BoundExceeded {
                what: "tool iterations".to_string(),
                limit,
            });
        }
        Ok(())
    }

    /// Persist a checkpoint, retrying store failures up to the configured bound
    async fn commit(&self, checkpoint: Checkpoint) -> Result<()> {
        self.checkpoint_retry
            .execute_with_retry(
                || self.store.save(&checkpoint),
                |e: &WorkflowError| matches!(e.kind(), ErrorKind::Resource | ErrorKind::Transient),
                |attempt, e| {
                    warn!(
                        run_id = %checkpoint.run_id,
                        step = checkpoint.step,
                        attempt,
                        error = %e,
                        "checkpoint write failed, retrying"
                    );
                },
            )
            .await?;

        self.telemetry.record(WorkflowEvent::Checkpointed {
            run_id: checkpoint.run_id.clone(),
            step: checkpoint.step,
            timestamp: Instant::now(),
        });
        Ok(())
    }

    fn final_response(&self, state: &RunState) -> Result<FinalResponse> {
        let content = state.response.clone().ok_or_else(|| {
            WorkflowError::Logic("terminal state without a response".to_string())
        })?;
        let (contributions, omissions) = merge(state);

        Ok(FinalResponse {
            run_id: state.run_id.clone(),
            session_id: state.session_id.clone(),
            content,
            contributions,
            omissions,
            routing: state.routing.clone(),
            degraded_memory: state.memory_degraded(),
            steps: state.step,
        })
    }

    fn fail(&self, state: &RunState, node: Option<NodeKind>, err: WorkflowError, step: u64) -> RunError {
        let error = RunError::from_error(&state.run_id, step, node.map(|n| n.to_string()), &err);
        warn!(
            run_id = %state.run_id,
            step,
            kind = %error.kind,
            error = %error.message,
            last_committed = state.step,
            "run aborted"
        );
        self.telemetry.record(WorkflowEvent::RunFinished {
            run_id: state.run_id.clone(),
            steps: state.step,
            success: false,
            timestamp: Instant::now(),
        });
        error
    }
}

/// Assembles an engine and its collaborators
pub struct WorkflowEngineBuilder {
    config: WorkflowConfig,
    agents: AgentRegistry,
    tools: ToolRegistry,
    backend: Option<Arc<dyn MemoryBackend>>,
    store: Option<Arc<dyn CheckpointStore>>,
    nodes: Vec<Arc<dyn Node>>,
    telemetry: Option<TelemetryCollector>,
}

impl WorkflowEngineBuilder {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            agents: AgentRegistry::new(),
            tools: ToolRegistry::new(),
            backend: None,
            store: None,
            nodes: Vec::new(),
            telemetry: None,
        }
    }

    pub fn agents(mut self, agents: AgentRegistry) -> Self {
        self.agents = agents;
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Long-term memory backend; defaults to `InMemoryVectorStore`
    pub fn memory_backend(mut self, backend: Arc<dyn MemoryBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Checkpoint store; defaults to `InMemoryCheckpointStore`
    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the built-in node of the same kind
    pub fn node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn build(self) -> WorkflowEngine {
        let config = self.config;
        let telemetry = self
            .telemetry
            .unwrap_or_else(|| TelemetryCollector::with_capacity(config.engine.event_log_capacity));

        let dispatcher = ToolDispatcher::new(Arc::new(self.tools), &config.tools)
            .with_telemetry(telemetry.clone());
        let coordinator = MultiAgentCoordinator::new(
            Arc::new(self.agents),
            Arc::new(dispatcher),
            config.coordinator.clone(),
        )
        .with_telemetry(telemetry.clone());

        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(InMemoryVectorStore::new()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryCheckpointStore::new()));

        let mut nodes: HashMap<NodeKind, Arc<dyn Node>> = HashMap::new();
        for node in builtin_nodes().into_iter().chain(self.nodes) {
            nodes.insert(node.kind(), node);
        }

        WorkflowEngine {
            graph: WorkflowGraph::standard(),
            nodes,
            memory: Arc::new(HierarchicalMemory::new(config.memory.clone(), backend)),
            router: Arc::new(IntelligentRouter::new(config.router.clone())),
            coordinator: Arc::new(coordinator),
            store,
            node_retry: RetryManager::from_config(&config.engine.node_retry),
            checkpoint_retry: RetryManager::from_config(&config.engine.checkpoint_retry),
            telemetry,
            config: Arc::new(config),
        }
    }
}
