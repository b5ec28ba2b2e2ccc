//! Static configuration for the workflow engine and its collaborators
//!
//! Loaded from TOML. Every field has a default so a partial file (or no file)
//! is valid. Router thresholds and the fan-out wait policy live here and are
//! never overridden per request.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bounded backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, first try included
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// AgentExecution -> ToolCalling round trips allowed per run
    pub max_tool_iterations: usize,
    /// Total node executions allowed per run
    pub max_steps: usize,
    /// Optional wall-clock budget for a single node attempt
    pub node_timeout_ms: Option<u64>,
    /// Retry policy for nodes failing with a transient error
    pub node_retry: RetryConfig,
    /// Retry policy for failed checkpoint writes
    pub checkpoint_retry: RetryConfig,
    /// Telemetry events kept in memory; older events are dropped
    pub event_log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 5,
            max_steps: 64,
            node_timeout_ms: None,
            node_retry: RetryConfig::default(),
            checkpoint_retry: RetryConfig::default(),
            event_log_capacity: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum confidence for a non-fallback decision
    pub confidence_threshold: f64,
    /// Agent used when nothing matches confidently
    pub default_agent: Option<String>,
    /// Maximum agents selected for one task
    pub max_fanout: usize,
    /// Agents within this distance of the best score join the fan-out
    pub fanout_margin: f64,
    /// Weight of memory context in the confidence blend
    pub context_weight: f64,
    /// Multiplier applied to `context_weight` for degraded snapshots
    pub degraded_context_penalty: f64,
    /// Seed for tie-breaking among equally scored agents
    pub tie_break_seed: Option<u64>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            default_agent: None,
            max_fanout: 1,
            fanout_margin: 0.0,
            context_weight: 0.2,
            degraded_context_penalty: 0.5,
            tie_break_seed: None,
        }
    }
}

/// When the fan-out join completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    /// Wait for every branch to finish, time out or fail
    All,
    /// Stop at the first completed branch and cancel the rest
    FirstCompleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub agent_timeout_ms: u64,
    pub wait_policy: WaitPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            agent_timeout_ms: 30_000,
            wait_policy: WaitPolicy::All,
        }
    }
}

impl CoordinatorConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Short-term turns kept per session
    pub short_term_window: usize,
    /// Long-term records returned per retrieval
    pub long_term_k: usize,
    /// Candidates fetched per returned record before decay re-ranking
    pub oversample: usize,
    /// Age at which a record's score is halved
    pub decay_half_life_secs: u64,
    /// Index user turns into long-term memory
    pub persist_user_turns: bool,
    /// Index final responses into long-term memory
    pub persist_responses: bool,
    /// Budget for a single backend call before the snapshot degrades
    pub backend_timeout_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_window: 20,
            long_term_k: 5,
            oversample: 3,
            decay_half_life_secs: 7 * 24 * 3600,
            persist_user_turns: true,
            persist_responses: true,
            backend_timeout_ms: 2_000,
        }
    }
}

impl MemoryConfig {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Timeout for tools that do not declare their own
    pub default_timeout_ms: u64,
    /// Retry policy applied to idempotent tools only
    pub retry: RetryConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

impl ToolsConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl WorkflowConfig {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = WorkflowConfig::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: WorkflowConfig = toml::from_str(contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for (name, retry) in [
            ("engine.node_retry", &self.engine.node_retry),
            ("engine.checkpoint_retry", &self.engine.checkpoint_retry),
            ("tools.retry", &self.tools.retry),
        ] {
            if retry.max_attempts == 0 {
                bail!("{}.max_attempts must be greater than 0", name);
            }
            if retry.base_delay_ms > retry.max_delay_ms {
                bail!("{}.base_delay_ms must not exceed max_delay_ms", name);
            }
        }

        if self.engine.max_steps == 0 {
            bail!("engine.max_steps must be greater than 0");
        }
        if self.engine.event_log_capacity == 0 {
            bail!("engine.event_log_capacity must be greater than 0");
        }
        if self.engine.node_timeout_ms == Some(0) {
            bail!("engine.node_timeout_ms must be greater than 0 when set");
        }

        for (name, value) in [
            ("router.confidence_threshold", self.router.confidence_threshold),
            ("router.fanout_margin", self.router.fanout_margin),
            ("router.context_weight", self.router.context_weight),
            ("router.degraded_context_penalty", self.router.degraded_context_penalty),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be between 0.0 and 1.0", name);
            }
        }
        if self.router.max_fanout == 0 {
            bail!("router.max_fanout must be greater than 0");
        }

        if self.coordinator.agent_timeout_ms == 0 {
            bail!("coordinator.agent_timeout_ms must be greater than 0");
        }
        if self.memory.short_term_window == 0 {
            bail!("memory.short_term_window must be greater than 0");
        }
        if self.memory.oversample == 0 {
            bail!("memory.oversample must be greater than 0");
        }
        if self.memory.backend_timeout_ms == 0 || self.tools.default_timeout_ms == 0 {
            bail!("backend and tool timeouts must be greater than 0");
        }

        Ok(())
    }

    /// Save configuration to a path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, toml_string).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;

        Ok(home.join(".agentflow").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = WorkflowConfig::default();
        assert_eq!(config.router.confidence_threshold, 0.5);
        assert_eq!(config.coordinator.wait_policy, WaitPolicy::All);
        assert_eq!(config.memory.short_term_window, 20);
        assert_eq!(config.engine.max_tool_iterations, 5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = WorkflowConfig::from_toml(
            r#"
            [router]
            confidence_threshold = 0.7
            default_agent = "Writer"

            [coordinator]
            wait_policy = "first_completed"
            "#,
        )
        .unwrap();

        assert_eq!(config.router.confidence_threshold, 0.7);
        assert_eq!(config.router.default_agent.as_deref(), Some("Writer"));
        assert_eq!(config.router.max_fanout, 1);
        assert_eq!(config.coordinator.wait_policy, WaitPolicy::FirstCompleted);
        assert_eq!(config.coordinator.agent_timeout_ms, 30_000);
        assert_eq!(config.tools, ToolsConfig::default());
    }

    #[test]
    fn test_config_round_trip_through_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = WorkflowConfig::default();
        config.memory.short_term_window = 4;
        config.engine.node_timeout_ms = Some(250);
        config.save_to(&path).unwrap();

        let loaded = WorkflowConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.engine.node_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_validation_rejects_out_of_range_values() {
        assert!(WorkflowConfig::default().validate().is_ok());

        let mut config = WorkflowConfig::default();
        config.router.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = WorkflowConfig::default();
        config.engine.node_retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = WorkflowConfig::default();
        config.memory.short_term_window = 0;
        assert!(config.validate().is_err());

        let mut config = WorkflowConfig::default();
        config.engine.event_log_capacity = 0;
        assert!(config.validate().is_err());

        assert!(WorkflowConfig::from_toml("[coordinator]\nagent_timeout_ms = 0").is_err());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(WorkflowConfig::from_toml("engine = 3").is_err());
    }
}
