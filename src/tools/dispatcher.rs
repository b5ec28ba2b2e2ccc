//! Tool dispatcher
//!
//! Validates a request against the registry, runs the tool under a timeout
//! and records per-tool statistics. Only idempotent tools are retried here;
//! for everything else retry is the caller's decision.

use crate::config::ToolsConfig;
use crate::errors::WorkflowError;
use crate::retry::RetryManager;
use crate::telemetry::{TelemetryCollector, WorkflowEvent};
use crate::tools::registry::ToolRegistry;
use crate::tools::types::{ToolStats, ToolFailure};
use crate::tools::validation::{validate_args, validate_result};
use crate::types::ToolArgs;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Dispatch failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Name not present in the registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Arguments rejected before the tool ran
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// Tool-internal error, with the underlying cause
    #[error("Tool '{tool}' failed: {cause}")]
    ExecutionFailed {
        tool: String,
        cause: String,
        transient: bool,
    },

    #[error("Tool '{tool}' timed out after {duration_ms}ms")]
    Timeout { tool: String, duration_ms: u64 },
}

impl DispatchError {
    /// Failures an idempotent tool may be retried on
    pub fn is_transient(&self) -> bool {
        match self {
            DispatchError::Timeout { .. } => true,
            DispatchError::ExecutionFailed { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Rejected before execution; never reached the tool
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DispatchError::ToolNotFound(_) | DispatchError::InvalidArguments { .. }
        )
    }
}

impl From<DispatchError> for WorkflowError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::ToolNotFound(name) => WorkflowError::ToolNotFound(name),
            DispatchError::InvalidArguments { tool, reason } => {
                WorkflowError::InvalidArguments { tool, reason }
            }
            DispatchError::Timeout { tool, duration_ms } => WorkflowError::Timeout {
                operation: format!("tool '{}'", tool),
                duration_ms,
            },
            err @ DispatchError::ExecutionFailed { .. } => WorkflowError::Transient(err.to_string()),
        }
    }
}

/// Tool dispatcher
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    default_timeout: Duration,
    retry_manager: RetryManager,
    stats: Mutex<HashMap<String, ToolStats>>,
    telemetry: Option<TelemetryCollector>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, config: &ToolsConfig) -> Self {
        Self {
            registry,
            default_timeout: config.default_timeout(),
            retry_manager: RetryManager::from_config(&config.retry),
            stats: Mutex::new(HashMap::new()),
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Validate and execute a tool
    pub async fn invoke(&self, name: &str, args: ToolArgs) -> Result<Value, DispatchError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| DispatchError::ToolNotFound(name.to_string()))?;
        let descriptor = tool.descriptor();

        let args = validate_args(descriptor, &args).map_err(|reason| {
            debug!(tool = name, %reason, "rejected tool arguments");
            DispatchError::InvalidArguments {
                tool: name.to_string(),
                reason,
            }
        })?;

        let timeout = descriptor
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        let retry_manager = if descriptor.idempotent {
            self.retry_manager.clone()
        } else {
            RetryManager::no_retry()
        };

        let start = Instant::now();
        let result = retry_manager
            .execute_with_retry(
                || {
                    let tool = Arc::clone(&tool);
                    let args = args.clone();
                    async move {
                        match tokio::time::timeout(timeout, tool.invoke(args)).await {
                            Ok(Ok(value)) => Ok(value),
                            Ok(Err(failure)) => Err(execution_failed(name, failure)),
                            Err(_) => Err(DispatchError::Timeout {
                                tool: name.to_string(),
                                duration_ms: timeout.as_millis() as u64,
                            }),
                        }
                    }
                },
                DispatchError::is_transient,
                |attempt, err| {
                    warn!(tool = name, attempt, error = %err, "retrying idempotent tool");
                    self.with_stats(name, |stats| stats.record_retry());
                    self.emit(WorkflowEvent::ToolRetry {
                        tool: name.to_string(),
                        attempt,
                        timestamp: Instant::now(),
                    });
                },
            )
            .await
            .and_then(|value| {
                validate_result(descriptor, &value)
                    .map(|_| value)
                    .map_err(|cause| DispatchError::ExecutionFailed {
                        tool: name.to_string(),
                        cause,
                        transient: false,
                    })
            });

        let duration_ms = start.elapsed().as_millis() as u64;
        let success = result.is_ok();
        self.with_stats(name, |stats| {
            if success {
                stats.record_success(duration_ms);
            } else {
                stats.record_failure(duration_ms);
            }
        });
        self.emit(WorkflowEvent::ToolDispatched {
            tool: name.to_string(),
            duration_ms,
            success,
            timestamp: Instant::now(),
        });

        match &result {
            Ok(_) => debug!(tool = name, duration_ms, "tool succeeded"),
            Err(err) => warn!(tool = name, duration_ms, error = %err, "tool failed"),
        }

        result
    }

    /// Statistics for one tool
    pub fn stats(&self, name: &str) -> Option<ToolStats> {
        self.stats
            .lock()
            .ok()
            .and_then(|stats| stats.get(name).cloned())
    }

    /// Statistics for every tool invoked so far
    pub fn all_stats(&self) -> HashMap<String, ToolStats> {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    fn with_stats(&self, name: &str, update: impl FnOnce(&mut ToolStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(stats.entry(name.to_string()).or_default());
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(event);
        }
    }
}

fn execution_failed(tool: &str, failure: ToolFailure) -> DispatchError {
    DispatchError::ExecutionFailed {
        tool: tool.to_string(),
        transient: failure.is_transient(),
        cause: failure.message().to_string(),
    }
}
