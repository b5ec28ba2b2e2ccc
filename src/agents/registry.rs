//! Agent registry
//!
//! Same lifecycle as the tool registry: built at startup, then read-only.
//! Registration order is the router's tie-break order and the coordinator's
//! merge order.

use crate::agents::{Agent, AgentDescriptor};
use crate::errors::{Result, WorkflowError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<Arc<dyn Agent>>,
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> AgentRegistryBuilder {
        AgentRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.index.get(name).map(|&i| Arc::clone(&self.agents[i]))
    }

    pub fn descriptor(&self, name: &str) -> Option<&AgentDescriptor> {
        self.index.get(name).map(|&i| self.agents[i].descriptor())
    }

    /// Registration index of an agent
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors in registration order
    pub fn descriptors(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.iter().map(|agent| agent.descriptor())
    }

    pub fn names(&self) -> Vec<String> {
        self.descriptors().map(|d| d.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

#[derive(Default)]
pub struct AgentRegistryBuilder {
    registry: AgentRegistry,
}

impl AgentRegistryBuilder {
    /// Register an agent; duplicate or empty names are rejected
    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Result<&mut Self> {
        let name = agent.descriptor().name.clone();

        if name.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "agent name must not be empty".to_string(),
            ));
        }
        if self.registry.contains(&name) {
            return Err(WorkflowError::Validation(format!(
                "agent '{}' already registered",
                name
            )));
        }

        self.registry.index.insert(name, self.registry.agents.len());
        self.registry.agents.push(agent);
        Ok(self)
    }

    pub fn with(mut self, agent: impl Agent + 'static) -> Result<Self> {
        self.register(Arc::new(agent))?;
        Ok(self)
    }

    pub fn build(self) -> AgentRegistry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{ScriptStep, ScriptedAgent};
    use serde_json::json;

    fn agent(name: &str) -> ScriptedAgent {
        ScriptedAgent::new(
            AgentDescriptor::new(name, ""),
            vec![ScriptStep::Complete(json!(name))],
        )
    }

    #[test]
    fn test_registration_order_and_position() {
        let registry = AgentRegistry::builder()
            .with(agent("Researcher"))
            .unwrap()
            .with(agent("Analyst"))
            .unwrap()
            .with(agent("Writer"))
            .unwrap()
            .build();

        assert_eq!(registry.names(), vec!["Researcher", "Analyst", "Writer"]);
        assert_eq!(registry.position("Writer"), Some(2));
        assert_eq!(registry.position("Nobody"), None);
        assert!(registry.get("Analyst").is_some());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_and_empty_names_rejected() {
        let result = AgentRegistry::builder()
            .with(agent("Analyst"))
            .unwrap()
            .with(agent("Analyst"));
        assert!(result.is_err());

        assert!(AgentRegistry::builder().with(agent("")).is_err());
    }

    #[test]
    fn test_empty_registry() {
        let registry = AgentRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.descriptors().count(), 0);
    }
}
