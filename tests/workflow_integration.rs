//! End-to-end runs through the workflow engine
//!
//! Uses scripted agents and in-process tools; no external services.

use agentflow::{
    agents::{AgentDescriptor, AgentRegistry, ScriptStep, ScriptedAgent},
    cli::{demo_agents, demo_tools},
    memory::{LongTermRecord, MemoryBackend, ScoredRecord},
    types::ToolRequest,
    ErrorKind, Result, WorkflowConfig, WorkflowEngine, WorkflowError,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn sales_agent(name: &str, output: &str, delay_ms: u64) -> ScriptedAgent {
    ScriptedAgent::new(
        AgentDescriptor::new(name, "").capabilities(["sales"]),
        vec![ScriptStep::Complete(json!(output))],
    )
    .with_delay(Duration::from_millis(delay_ms))
}

/// Long-term store that is always down
struct OfflineBackend;

#[async_trait]
impl MemoryBackend for OfflineBackend {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(WorkflowError::MemoryBackend("vector store offline".to_string()))
    }

    async fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<ScoredRecord>> {
        Err(WorkflowError::MemoryBackend("vector store offline".to_string()))
    }

    async fn append(&self, _record: LongTermRecord) -> Result<()> {
        Err(WorkflowError::MemoryBackend("vector store offline".to_string()))
    }
}

#[tokio::test]
async fn test_demo_roster_routes_sales_to_analyst() {
    let engine = WorkflowEngine::builder(WorkflowConfig::default())
        .agents(demo_agents().unwrap())
        .tools(demo_tools().unwrap())
        .build();

    let response = engine.submit("summarize sales for Q1", "demo").await.unwrap();

    let routing = response.routing.clone().unwrap();
    assert_eq!(routing.agents, vec!["Analyst"]);
    assert!(!routing.fallback);

    // preprocess, route, agent, tools, agent, response
    assert_eq!(response.steps, 6);
    assert!(response.content.starts_with("Sales analysis"));
    assert!(response.content.contains("1240000"));
    assert!(!response.degraded_memory);
}

#[tokio::test]
async fn test_fan_out_merges_in_registration_order() {
    let mut config = WorkflowConfig::default();
    config.router.max_fanout = 3;

    let agents = AgentRegistry::builder()
        .with(sales_agent("A", "a", 300))
        .unwrap()
        .with(sales_agent("B", "b", 100))
        .unwrap()
        .with(sales_agent("C", "c", 200))
        .unwrap()
        .build();

    let engine = WorkflowEngine::builder(config).agents(agents).build();

    let started = Instant::now();
    let response = engine.submit("sales", "fan-out").await.unwrap();
    let elapsed = started.elapsed();

    let order: Vec<&str> = response
        .contributions
        .iter()
        .map(|c| c.agent.as_str())
        .collect();
    assert_eq!(order, vec!["A", "B", "C"]);
    assert_eq!(response.content, "[A] a\n\n[B] b\n\n[C] c");
    assert!(response.omissions.is_empty());

    // branches ran concurrently
    assert!(elapsed < Duration::from_millis(580), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_slow_branch_omitted_after_timeout() {
    let mut config = WorkflowConfig::default();
    config.router.max_fanout = 2;
    config.coordinator.agent_timeout_ms = 100;

    let agents = AgentRegistry::builder()
        .with(sales_agent("Fast", "fast", 10))
        .unwrap()
        .with(sales_agent("Slow", "slow", 1_000))
        .unwrap()
        .build();

    let engine = WorkflowEngine::builder(config).agents(agents).build();
    let response = engine.submit("sales", "timeouts").await.unwrap();

    assert_eq!(response.contributions.len(), 1);
    assert_eq!(response.omissions.len(), 1);
    assert_eq!(response.omissions[0].agent, "Slow");
    assert!(response.content.contains("Omitted: Slow"));
}

#[tokio::test]
async fn test_empty_registry_aborts_at_route() {
    let engine = WorkflowEngine::builder(WorkflowConfig::default()).build();

    let err = engine.submit("summarize sales for Q1", "empty").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Logic);
    assert_eq!(err.step, 2);
    assert_eq!(err.node.as_deref(), Some("route"));
    assert!(err.message.contains("No agents registered"));

    // preprocess committed, route did not
    let checkpoints = engine.checkpoints(&err.run_id).await.unwrap();
    assert_eq!(checkpoints.len(), 2);
}

#[tokio::test]
async fn test_low_confidence_falls_back_to_default_agent() {
    let mut config = WorkflowConfig::default();
    config.router.default_agent = Some("Writer".to_string());

    let engine = WorkflowEngine::builder(config)
        .agents(demo_agents().unwrap())
        .tools(demo_tools().unwrap())
        .build();

    let response = engine.submit("hello there", "fallback").await.unwrap();
    let routing = response.routing.unwrap();
    assert!(routing.fallback);
    assert_eq!(routing.agents, vec!["Writer"]);
}

#[tokio::test]
async fn test_degraded_memory_is_reported() {
    let engine = WorkflowEngine::builder(WorkflowConfig::default())
        .agents(demo_agents().unwrap())
        .tools(demo_tools().unwrap())
        .memory_backend(Arc::new(OfflineBackend))
        .build();

    let response = engine.submit("summarize sales for Q1", "degraded").await.unwrap();

    assert!(response.degraded_memory);
    assert!(response.routing.unwrap().degraded_context);
    assert!(response
        .content
        .contains("Note: answered without long-term memory"));
}

#[tokio::test]
async fn test_tool_loop_bound() {
    let mut config = WorkflowConfig::default();
    config.engine.max_tool_iterations = 1;

    let looper = ScriptedAgent::new(
        AgentDescriptor::new("Looper", "")
            .capabilities(["sales"])
            .allowed_tools(["fetch_report"]),
        vec![ScriptStep::CallTools(vec![ToolRequest::new(
            "fetch_report",
            json!({"quarter": "Q2"}),
        )])],
    );

    let engine = WorkflowEngine::builder(config)
        .agents(AgentRegistry::builder().with(looper).unwrap().build())
        .tools(demo_tools().unwrap())
        .build();

    let err = engine.submit("sales", "loop").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BoundExceeded);
    assert_eq!(err.step, 5);
    assert_eq!(err.node.as_deref(), Some("agent_execution"));
    assert!(err.message.contains("tool iterations"));
}

#[tokio::test]
async fn test_cancelled_before_first_node() {
    let engine = WorkflowEngine::builder(WorkflowConfig::default())
        .agents(demo_agents().unwrap())
        .build();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .submit_with_cancel("summarize sales for Q1", "cancel", cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert_eq!(err.step, 1);
    assert!(!err.is_retryable());
    assert!(err.is_resumable());

    let checkpoints = engine.checkpoints(&err.run_id).await.unwrap();
    assert_eq!(checkpoints.len(), 1);
}

#[tokio::test]
async fn test_cancelled_during_fan_out() {
    let agents = AgentRegistry::builder()
        .with(sales_agent("Slow", "slow", 2_000))
        .unwrap()
        .build();
    let engine = Arc::new(WorkflowEngine::builder(WorkflowConfig::default()).agents(agents).build());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = engine
        .submit_with_cancel("sales", "cancel-mid", cancel)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert_eq!(err.node.as_deref(), Some("agent_execution"));
    assert!(started.elapsed() < Duration::from_millis(1_500));

    // nothing after route was committed
    let checkpoints = engine.checkpoints(&err.run_id).await.unwrap();
    assert_eq!(checkpoints.last().unwrap().step, 2);
}

#[tokio::test]
async fn test_session_memory_carries_into_next_run() {
    let engine = WorkflowEngine::builder(WorkflowConfig::default())
        .agents(demo_agents().unwrap())
        .tools(demo_tools().unwrap())
        .build();

    engine.submit("summarize sales for Q1", "carry").await.unwrap();
    engine.submit("and for Q2", "carry").await.unwrap();

    let turns = engine.memory().short_term_turns("carry");
    // user and assistant turn per run
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[2].content, "and for Q2");

    // other sessions stay isolated
    assert!(engine.memory().short_term_turns("other").is_empty());
}
