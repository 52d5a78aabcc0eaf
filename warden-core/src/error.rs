//! Error types for Warden operations

use std::time::Duration;

use crate::tools::ToolError;

/// Result type for Warden operations
pub type Result<T> = std::result::Result<T, WardenError>;

/// Failures when presenting a capability token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The token's lifetime has elapsed
    #[error("capability token expired")]
    Expired,

    /// The token was explicitly revoked
    #[error("capability token revoked: {reason}")]
    Revoked { reason: String },
}

/// Error types for the Warden runtime
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Classification denied the invocation
    #[error("Permission denied for tool '{tool}': {reason}")]
    Permission { tool: String, reason: String },

    /// Token could not be used; the caller must request permission again
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// A single invocation exceeded its deadline
    #[error("Tool '{tool}' timed out after {timeout:?}")]
    ToolTimeout { tool: String, timeout: Duration },

    /// A budget or bypass could not be funded
    #[error("Insufficient capital for agent '{agent}': requested {requested:.4}, available {available:.4}")]
    InsufficientCapital {
        agent: String,
        requested: f64,
        available: f64,
    },

    /// The tool's own failure, passed through unmodified
    #[error("Tool execution failed: {0}")]
    ToolExecution(#[from] ToolError),

    /// Dependency graph contains a cycle
    #[error("Cyclic dependency between nodes: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    /// A node depends on a name that is not part of the graph
    #[error("Node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    /// Two nodes share a name
    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),

    /// Negative, NaN or infinite monetary amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Tool registry error
    #[error("Registry error: {0}")]
    Registry(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl WardenError {
    /// Whether retrying the same call may succeed without caller action
    pub fn is_retryable(&self) -> bool {
        match self {
            WardenError::ToolTimeout { .. } => true,
            WardenError::ToolExecution(error) => error.kind.is_retryable(),
            _ => false,
        }
    }

    /// The tool's own error, if this failure came from the tool
    pub fn tool_error(&self) -> Option<&ToolError> {
        match self {
            WardenError::ToolExecution(error) => Some(error),
            _ => None,
        }
    }
}

impl From<String> for WardenError {
    fn from(s: String) -> Self {
        WardenError::Other(s)
    }
}

impl From<&str> for WardenError {
    fn from(s: &str) -> Self {
        WardenError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for WardenError {
    fn from(err: anyhow::Error) -> Self {
        WardenError::Other(err.to_string())
    }
}

impl From<figment::Error> for WardenError {
    fn from(err: figment::Error) -> Self {
        WardenError::Configuration(err.to_string())
    }
}
