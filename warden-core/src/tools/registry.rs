//! Tool registry
//!
//! The `ToolRegistry` provides:
//! - Registration of a tool together with its declared capabilities
//! - Lookup by name with duplicate detection
//! - Filtering by tag and by what a given caller may run
//! - Construction of [`SecureExecutor`]s sharing the registry's classifier
//!   and sinks
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_core::tools::ToolRegistry;
//! use warden_core::security::{AgentContext, ToolCapabilities};
//!
//! let mut registry = ToolRegistry::new().with_audit_sink(audit.clone());
//! registry.register(Arc::new(SearchTool::new()), ToolCapabilities::none().with_network())?;
//!
//! let executor = registry.executor_for("search", AgentContext::new("agent-1"))?;
//! let output = executor.execute(json!({"query": "rust"})).await?;
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::tool::BoxedTool;
use crate::config::ExecutorConfig;
use crate::error::{Result, WardenError};
use crate::events::EventSink;
use crate::security::{
    AgentContext, AuditSink, PermissionClassifier, PermissionLevel, SecureExecutor,
    ToolCapabilities,
};

/// Summary of a registered tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSummary {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// Tags for categorization
    pub tags: Vec<String>,
    /// Declared capabilities
    pub capabilities: ToolCapabilities,
    /// Version if available
    pub version: Option<String>,
}

#[derive(Clone)]
struct Registration {
    tool: BoxedTool,
    capabilities: ToolCapabilities,
}

/// Registry of tools and the capabilities they declare
pub struct ToolRegistry {
    tools: HashMap<String, Registration>,
    classifier: Arc<PermissionClassifier>,
    audit: Option<Arc<dyn AuditSink>>,
    events: Option<Arc<dyn EventSink>>,
    config: ExecutorConfig,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tool_count", &self.tools.len())
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry with the built-in classifier
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            classifier: Arc::new(PermissionClassifier::new()),
            audit: None,
            events: None,
            config: ExecutorConfig::default(),
        }
    }

    /// Classifier shared by every executor built from this registry
    pub fn with_classifier(mut self, classifier: Arc<PermissionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn classifier(&self) -> &Arc<PermissionClassifier> {
        &self.classifier
    }

    /// Register a tool with its declared capabilities
    ///
    /// Returns an error if a tool with the same name is already registered.
    pub fn register(&mut self, tool: BoxedTool, capabilities: ToolCapabilities) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(WardenError::Registry(format!(
                "Tool '{}' is already registered",
                name
            )));
        }
        tracing::debug!(tool = %name, "Tool registered");
        self.tools.insert(name, Registration { tool, capabilities });
        Ok(())
    }

    /// Unregister a tool by name
    pub fn unregister(&mut self, name: &str) -> Option<BoxedTool> {
        self.tools.remove(name).map(|r| r.tool)
    }

    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.get(name).map(|r| &r.tool)
    }

    /// Declared capabilities of a registered tool
    pub fn capabilities(&self, name: &str) -> Option<&ToolCapabilities> {
        self.tools.get(name).map(|r| &r.capabilities)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Summaries of all tools, sorted by name
    pub fn list(&self) -> Vec<ToolSummary> {
        let mut summaries: Vec<ToolSummary> = self
            .tools
            .values()
            .map(|r| {
                let metadata = r.tool.metadata();
                ToolSummary {
                    name: metadata.name.clone(),
                    description: metadata.description.clone(),
                    tags: metadata.tags.clone(),
                    capabilities: r.capabilities.clone(),
                    version: metadata.version.clone(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Filter tools by tag
    pub fn filter_by_tag(&self, tag: &str) -> Vec<&BoxedTool> {
        self.tools
            .values()
            .filter(|r| r.tool.metadata().tags.iter().any(|t| t == tag))
            .map(|r| &r.tool)
            .collect()
    }

    /// Tools the caller could run right now, with the level each would run at
    pub fn permitted_for(&self, context: &AgentContext) -> Vec<(&str, PermissionLevel)> {
        let mut permitted: Vec<(&str, PermissionLevel)> = self
            .tools
            .iter()
            .filter_map(|(name, r)| {
                let level = self.classifier.classify(&r.capabilities, context);
                level
                    .permits_execution()
                    .then_some((name.as_str(), level))
            })
            .collect();
        permitted.sort_by(|a, b| a.0.cmp(b.0));
        permitted
    }

    /// Build an executor for a registered tool
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Registry`] if the tool is unknown.
    pub fn executor_for(&self, name: &str, context: AgentContext) -> Result<SecureExecutor> {
        self.shared_executor_for(name, Arc::new(RwLock::new(context)))
    }

    /// Build an executor whose context handle is shared with other executors
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Registry`] if the tool is unknown.
    pub fn shared_executor_for(
        &self,
        name: &str,
        context: Arc<RwLock<AgentContext>>,
    ) -> Result<SecureExecutor> {
        let registration = self
            .tools
            .get(name)
            .ok_or_else(|| WardenError::Registry(format!("Tool '{}' not found", name)))?;

        let mut executor = SecureExecutor::with_shared_context(
            Arc::clone(&registration.tool),
            registration.capabilities.clone(),
            context,
        )
        .with_classifier(Arc::clone(&self.classifier))
        .with_config(self.config.clone());

        if let Some(audit) = &self.audit {
            executor = executor.with_audit_sink(Arc::clone(audit));
        }
        if let Some(events) = &self.events {
            executor = executor.with_event_sink(Arc::clone(events));
        }
        Ok(executor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::InMemoryAuditLog;
    use crate::tools::{FnTool, ToolMetadata};
    use serde_json::json;

    fn tool(name: &str, tag: &str) -> BoxedTool {
        Arc::new(FnTool::new(
            ToolMetadata::new(name, format!("{} tool", name)).with_tag(tag),
            |input| async move { Ok(input) },
        ))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry
            .register(tool("search", "web"), ToolCapabilities::none().with_network())
            .unwrap();
        registry
            .register(tool("calc", "math"), ToolCapabilities::none())
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("search"));
        assert_eq!(registry.names(), vec!["calc", "search"]);
        assert!(registry.capabilities("search").unwrap().requires_network);
        assert_eq!(registry.filter_by_tag("math").len(), 1);
        assert_eq!(registry.list()[1].name, "search");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register(tool("search", "web"), ToolCapabilities::none())
            .unwrap();

        let err = registry
            .register(tool("search", "web"), ToolCapabilities::none())
            .unwrap_err();
        assert!(matches!(err, WardenError::Registry(_)));
    }

    #[test]
    fn test_permitted_for_context() {
        let mut registry = ToolRegistry::new();
        registry
            .register(tool("search", "web"), ToolCapabilities::none().with_network())
            .unwrap();
        registry
            .register(tool("calc", "math"), ToolCapabilities::none())
            .unwrap();

        let permitted = registry.permitted_for(&AgentContext::new("agent"));
        assert_eq!(permitted, vec![("calc", PermissionLevel::AllowedAudited)]);

        let permitted = registry.permitted_for(&AgentContext::new("agent").with_network(true));
        assert_eq!(permitted.len(), 2);
    }

    #[tokio::test]
    async fn test_executor_for_shares_audit_sink() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let mut registry = ToolRegistry::new().with_audit_sink(audit.clone());
        registry
            .register(tool("calc", "math"), ToolCapabilities::none())
            .unwrap();

        let executor = registry
            .executor_for("calc", AgentContext::new("agent"))
            .unwrap();
        executor.execute(json!(4)).await.unwrap();

        assert_eq!(audit.len().await, 1);
        assert!(registry.executor_for("missing", AgentContext::new("a")).is_err());
    }
}
