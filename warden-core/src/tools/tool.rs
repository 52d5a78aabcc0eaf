//! Tool trait and metadata definitions
//!
//! Tools are external collaborators: the runtime only knows how to describe
//! them and how to invoke them. What a tool *might* do is declared separately
//! through [`ToolCapabilities`](crate::security::ToolCapabilities) when it is
//! registered.

use super::result::ToolError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// How a tool presents itself in listings and audit entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Registry key and the tool id used in tokens and audit entries
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: None,
            tags: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Tag used by [`ToolRegistry::filter_by_tag`](super::ToolRegistry::filter_by_tag)
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Uniform invoke contract every tool adapter implements
///
/// The runtime checks permission before calling `invoke`, wraps the call in a
/// timeout and audits the outcome. Implementations report their own failures
/// through [`ToolError`]; those errors reach the caller unmodified.
#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn description(&self) -> &str {
        &self.metadata().description
    }

    /// Run the tool; called only after the caller was permitted
    async fn invoke(&self, input: Value) -> Result<Value, ToolError>;
}

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync>;

/// Tool backed by an async closure
///
/// Handy for adapters that are a single function call and for tests.
#[derive(Clone)]
pub struct FnTool {
    metadata: ToolMetadata,
    handler: Handler,
}

impl FnTool {
    /// Create a tool from metadata and an async handler
    pub fn new<F, Fut>(metadata: ToolMetadata, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            metadata,
            handler: Arc::new(move |input: Value| -> BoxFuture<'static, Result<Value, ToolError>> {
                Box::pin(handler(input))
            }),
        }
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.metadata.name)
            .finish()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, input: Value) -> Result<Value, ToolError> {
        (self.handler)(input).await
    }
}

/// Type alias for shared tools
pub type BoxedTool = Arc<dyn Tool>;
