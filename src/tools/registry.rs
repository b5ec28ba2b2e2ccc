//! Tool registry
//!
//! Built once at startup through `ToolRegistryBuilder` and immutable
//! afterwards, so it can be shared behind an `Arc` and read without locking.
//! Registration order is preserved for listings.

use crate::errors::{Result, WorkflowError};
use crate::tools::types::{Tool, ToolDescriptor};
use crate::tools::validation::validate_descriptor;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Tool registry
#[derive(Clone, Default)]
pub struct ToolRegistry {
    /// Tools in registration order
    tools: Vec<Arc<dyn Tool>>,

    /// Map of tool name to position in `tools`
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Get tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    /// Get tool descriptor by name
    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| self.tools[i].descriptor())
    }

    /// Check if tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Get all tool names, in registration order
    pub fn names(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|tool| tool.descriptor().name.clone())
            .collect()
    }

    /// Get all tool descriptors, in registration order
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().map(|tool| tool.descriptor()).collect()
    }

    /// Descriptors in one category
    pub fn by_category(&self, category: &str) -> Vec<&ToolDescriptor> {
        self.descriptors()
            .into_iter()
            .filter(|d| d.category == category)
            .collect()
    }

    /// Distinct categories, in order of first appearance
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for descriptor in self.descriptors() {
            if !categories.contains(&descriptor.category) {
                categories.push(descriptor.category.clone());
            }
        }
        categories
    }

    /// Case-insensitive substring search over name, description and category
    pub fn search(&self, query: &str) -> Vec<&ToolDescriptor> {
        let query = query.to_lowercase();
        self.descriptors()
            .into_iter()
            .filter(|d| {
                d.name.to_lowercase().contains(&query)
                    || d.description.to_lowercase().contains(&query)
                    || d.category.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Get total number of tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Collects tools before the registry is frozen
#[derive(Default)]
pub struct ToolRegistryBuilder {
    registry: ToolRegistry,
}

impl ToolRegistryBuilder {
    /// Register a tool; duplicate names and malformed descriptors are rejected
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<&mut Self> {
        let descriptor = tool.descriptor();

        validate_descriptor(descriptor).map_err(|reason| {
            WorkflowError::Validation(format!("tool '{}': {}", descriptor.name, reason))
        })?;

        if self.registry.contains(&descriptor.name) {
            return Err(WorkflowError::Validation(format!(
                "tool '{}' already registered",
                descriptor.name
            )));
        }

        let name = descriptor.name.clone();
        self.registry.index.insert(name, self.registry.tools.len());
        self.registry.tools.push(tool);

        Ok(self)
    }

    /// Chaining form of `register`
    pub fn with(mut self, tool: impl Tool + 'static) -> Result<Self> {
        self.register(Arc::new(tool))?;
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> ToolRegistry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::types::{ParamType, ToolFailure, ToolParameter};
    use crate::types::ToolArgs;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Static(ToolDescriptor);

    #[async_trait]
    impl Tool for Static {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.0
        }

        async fn invoke(&self, _args: ToolArgs) -> std::result::Result<Value, ToolFailure> {
            Ok(json!(null))
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::builder()
            .with(Static(
                ToolDescriptor::new("web_search", "Search the web for a query").category("search"),
            ))
            .unwrap()
            .with(Static(
                ToolDescriptor::new("fetch_report", "Fetch a sales report")
                    .category("data")
                    .param(ToolParameter::required("quarter", ParamType::String)),
            ))
            .unwrap()
            .with(Static(
                ToolDescriptor::new("transform", "Transform tabular data").category("data"),
            ))
            .unwrap()
            .build()
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["web_search", "fetch_report", "transform"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let result = ToolRegistry::builder()
            .with(Static(ToolDescriptor::new("dup", "")))
            .unwrap()
            .with(Static(ToolDescriptor::new("dup", "")));
        assert!(result.is_err());
    }

    #[test]
    fn test_lookup() {
        let registry = registry();
        assert!(registry.contains("fetch_report"));
        assert!(registry.get("fetch_report").is_some());
        assert_eq!(registry.descriptor("fetch_report").unwrap().parameters.len(), 1);
        assert!(!registry.contains("nonexistent_tool"));
        assert!(registry.get("nonexistent_tool").is_none());
    }

    #[test]
    fn test_categories_and_search() {
        let registry = registry();
        assert_eq!(registry.categories(), vec!["search", "data"]);
        assert_eq!(registry.by_category("data").len(), 2);

        let found: Vec<_> = registry.search("REPORT").iter().map(|d| d.name.clone()).collect();
        assert_eq!(found, vec!["fetch_report"]);
        assert_eq!(registry.search("data").len(), 2);
    }

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.names().is_empty());
    }
}
