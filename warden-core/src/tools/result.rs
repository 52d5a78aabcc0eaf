//! Tool-level error model
//!
//! A tool reports its own failures through [`ToolError`]. The runtime never
//! rewrites these: the executor wraps them in
//! [`WardenError::ToolExecution`](crate::error::WardenError::ToolExecution)
//! so callers keep the tool's original kind, code and context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Failure reported by a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,

    /// Machine-readable code, e.g. `"RATE_LIMITED"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Tool-specific detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// How long the caller should wait before trying again
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub retry_after: Option<Duration>,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            context: None,
            retry_after: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// The tool rejected its input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidInput, message).with_code("INVALID_INPUT")
    }

    /// A backend hiccup worth retrying after a second
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Transient, message)
            .with_code("TRANSIENT")
            .with_retry_after(Duration::from_secs(1))
    }

    /// A quota was hit; retry after `delay`
    pub fn rate_limited(message: impl Into<String>, delay: Duration) -> Self {
        Self::new(ToolErrorKind::RateLimited, message)
            .with_code("RATE_LIMITED")
            .with_retry_after(delay)
    }

    /// The backend refused the tool's own credentials
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Unauthorized, message).with_code("UNAUTHORIZED")
    }

    /// A bug in the tool
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, message).with_code("INTERNAL_ERROR")
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for ToolError {}

/// What went wrong inside a tool
///
/// Distinct from runtime denials: [`Unauthorized`](Self::Unauthorized) means
/// an external system said no, not the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidInput,
    RateLimited,
    Transient,
    NotFound,
    Unauthorized,
    /// The backend answered with something the tool could not use
    BadResponse,
    Internal,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::InvalidInput => "invalid_input",
            ToolErrorKind::RateLimited => "rate_limited",
            ToolErrorKind::Transient => "transient",
            ToolErrorKind::NotFound => "not_found",
            ToolErrorKind::Unauthorized => "unauthorized",
            ToolErrorKind::BadResponse => "bad_response",
            ToolErrorKind::Internal => "internal",
        }
    }

    /// Whether the same call may succeed later unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ToolErrorKind::RateLimited | ToolErrorKind::Transient | ToolErrorKind::BadResponse
        )
    }
}
