//! Telemetry for workflow runs
//!
//! Collects typed events from the engine, coordinator and tool dispatcher and
//! keeps running counters. Complements the `tracing` logs: events are kept in
//! memory so callers (and tests) can inspect what a run actually did. The
//! event log is a bounded ring; counters cover every event ever recorded.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Events retained by a collector built with `new()`
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    // Engine events
    NodeStarted {
        run_id: String,
        step: u64,
        node: String,
        timestamp: Instant,
    },
    NodeCompleted {
        run_id: String,
        step: u64,
        node: String,
        duration_ms: u64,
        timestamp: Instant,
    },
    NodeRetry {
        run_id: String,
        node: String,
        attempt: u32,
        timestamp: Instant,
    },
    Checkpointed {
        run_id: String,
        step: u64,
        timestamp: Instant,
    },
    RunFinished {
        run_id: String,
        steps: u64,
        success: bool,
        timestamp: Instant,
    },

    // Coordinator events
    FanOut {
        run_id: String,
        agents: Vec<String>,
        timestamp: Instant,
    },
    BranchFinished {
        run_id: String,
        agent: String,
        outcome: String,
        duration_ms: u64,
        timestamp: Instant,
    },

    // Tool events
    ToolDispatched {
        tool: String,
        duration_ms: u64,
        success: bool,
        timestamp: Instant,
    },
    ToolRetry {
        tool: String,
        attempt: u32,
        timestamp: Instant,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryStats {
    pub nodes_executed: usize,
    pub node_retries: usize,
    pub checkpoints_written: usize,
    pub fan_outs: usize,
    pub branches_finished: usize,
    pub tools_executed: usize,
    pub tools_succeeded: usize,
    pub tools_failed: usize,
    pub tool_retries: usize,
    pub runs_succeeded: usize,
    pub runs_failed: usize,
}

/// Telemetry collector
///
/// Cheap to clone; clones share the same event log.
#[derive(Debug, Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<VecDeque<WorkflowEvent>>>,
    capacity: usize,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    /// Create a new telemetry collector
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Collector keeping at most `capacity` recent events
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: WorkflowEvent) {
        if let Ok(mut stats) = self.stats.lock() {
            match &event {
                WorkflowEvent::NodeStarted { .. } => {}
                WorkflowEvent::NodeCompleted { .. } => stats.nodes_executed += 1,
                WorkflowEvent::NodeRetry { .. } => stats.node_retries += 1,
                WorkflowEvent::Checkpointed { .. } => stats.checkpoints_written += 1,
                WorkflowEvent::RunFinished { success, .. } => {
                    if *success {
                        stats.runs_succeeded += 1;
                    } else {
                        stats.runs_failed += 1;
                    }
                }
                WorkflowEvent::FanOut { .. } => stats.fan_outs += 1,
                WorkflowEvent::BranchFinished { .. } => stats.branches_finished += 1,
                WorkflowEvent::ToolDispatched { success, .. } => {
                    stats.tools_executed += 1;
                    if *success {
                        stats.tools_succeeded += 1;
                    } else {
                        stats.tools_failed += 1;
                    }
                }
                WorkflowEvent::ToolRetry { .. } => stats.tool_retries += 1,
            }
        }

        if let Ok(mut events) = self.events.lock() {
            if events.len() == self.capacity {
                events.pop_front();
            }
            events.push_back(event);
        }
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<WorkflowEvent> {
        match self.events.lock() {
            Ok(events) => {
                let start = events.len().saturating_sub(n);
                events.iter().skip(start).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Calculate tool success rate
    pub fn tool_success_rate(&self) -> f64 {
        let stats = self.get_stats();
        let total = stats.tools_succeeded + stats.tools_failed;
        if total == 0 {
            1.0
        } else {
            stats.tools_succeeded as f64 / total as f64
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}
