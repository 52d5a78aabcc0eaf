//! Trust gate for tool invocations
//!
//! - [`PermissionClassifier`] decides a [`PermissionLevel`] from declared
//!   [`ToolCapabilities`] and the caller's [`AgentContext`]
//! - [`CapabilityToken`] is a time-boxed, revocable grant
//! - [`SecureExecutor`] gates, times and audits a single tool
//! - [`AuditSink`] receives one [`AuditEntry`] per check and execution
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_core::security::{AgentContext, SecureExecutor, ToolCapabilities};
//!
//! let executor = SecureExecutor::new(tool, ToolCapabilities::none().with_network(), context)
//!     .with_audit_sink(audit.clone());
//!
//! let output = executor.execute(serde_json::json!({"query": "rust"})).await?;
//! ```

mod audit;
mod capability;
mod classifier;
mod executor;
mod token;

pub use audit::{
    AuditEntry, AuditKind, AuditSink, DEFAULT_SUMMARY_CHARS, InMemoryAuditLog, JsonlAuditLog,
    digest, summarize,
};
pub use capability::{AgentContext, PRODUCTION_ENVIRONMENT, SecurityLevel, ToolCapabilities};
pub use classifier::{Classification, PermissionClassifier, PermissionLevel, RuleFn};
pub use executor::{PermissionStatus, SecureExecutor};
pub use token::CapabilityToken;
