//! Demo roster used by the binary
//!
//! Three scripted agents and one reporting tool, enough to exercise routing,
//! a tool round trip and fan-out without any external service.

use crate::agents::{AgentDescriptor, AgentRegistry, ScriptStep, ScriptedAgent};
use crate::errors::Result;
use crate::tools::{ParamType, Tool, ToolDescriptor, ToolFailure, ToolParameter, ToolRegistry};
use crate::types::{ToolArgs, ToolRequest};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Quarterly sales figures from a fixed table
pub struct FetchReportTool {
    descriptor: ToolDescriptor,
}

impl FetchReportTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new("fetch_report", "Fetch the sales report for a quarter")
                .category("data")
                .param(ToolParameter::required("quarter", ParamType::String).describe("Q1 to Q4"))
                .param(
                    ToolParameter::optional("region", ParamType::String, Some(json!("global")))
                        .describe("Sales region"),
                )
                .returns(ParamType::Object)
                .idempotent(true)
                .timeout(Duration::from_secs(5)),
        }
    }
}

impl Default for FetchReportTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FetchReportTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: ToolArgs) -> std::result::Result<Value, ToolFailure> {
        let quarter = args
            .get("quarter")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_uppercase();
        let region = args.get("region").and_then(Value::as_str).unwrap_or("global");

        let (revenue, growth_pct) = match quarter.as_str() {
            "Q1" => (1_240_000, 4.2),
            "Q2" => (1_310_000, 5.6),
            "Q3" => (1_185_000, -9.5),
            "Q4" => (1_420_000, 19.8),
            other => return Err(ToolFailure::Fatal(format!("no report for quarter '{}'", other))),
        };

        Ok(json!({
            "quarter": quarter,
            "region": region,
            "revenue": revenue,
            "growth_pct": growth_pct,
        }))
    }
}

/// Tools available to the demo roster
pub fn demo_tools() -> Result<ToolRegistry> {
    Ok(ToolRegistry::builder().with(FetchReportTool::new())?.build())
}

/// Researcher, Analyst and Writer, in that registration order
pub fn demo_agents() -> Result<AgentRegistry> {
    let researcher = ScriptedAgent::new(
        AgentDescriptor::new("Researcher", "Finds background material")
            .capabilities(["research", "sources", "search", "find", "background"])
            .allowed_tools(["fetch_report"]),
        vec![ScriptStep::Complete(json!(
            "Collected background sources relevant to the request."
        ))],
    )
    .with_delay(Duration::from_millis(40));

    let analyst = ScriptedAgent::new(
        AgentDescriptor::new("Analyst", "Analyses sales figures")
            .capabilities(["sales", "revenue", "analyze", "summarize", "report", "metrics", "quarter"])
            .allowed_tools(["fetch_report"]),
        vec![
            ScriptStep::CallTools(vec![ToolRequest::new(
                "fetch_report",
                json!({"quarter": "Q1"}),
            )]),
            ScriptStep::Summarize("Sales analysis".to_string()),
        ],
    )
    .with_delay(Duration::from_millis(20));

    let writer = ScriptedAgent::new(
        AgentDescriptor::new("Writer", "Drafts prose")
            .capabilities(["write", "draft", "email", "document", "announcement"]),
        vec![ScriptStep::Complete(json!("Drafted a short write-up."))],
    )
    .with_delay(Duration::from_millis(30));

    Ok(AgentRegistry::builder()
        .with(researcher)?
        .with(analyst)?
        .with(writer)?
        .build())
}
