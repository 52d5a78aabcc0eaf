//! # Warden - trust-gated tool execution for autonomous agents
//!
//! Warden sits between an agent and the tools it wants to call:
//! - Attribute-based permission classification with custom rules
//! - Time-bounded, revocable capability tokens
//! - A secure executor with timeouts and an audit trail
//! - Bounded-concurrency orchestration of parallel batches and DAGs
//! - A capital ledger, composable cost factors and scoped budgets
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden_core::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut warden = Warden::builder().build().await?;
//!
//!     let echo = FnTool::new(ToolMetadata::new("echo", "Echoes input"), |input| async move {
//!         Ok(input)
//!     });
//!     warden.register(Arc::new(echo), ToolCapabilities::none())?;
//!
//!     let executor = warden.executor_for("echo", AgentContext::new("agent-1"))?;
//!     let output = executor.execute(json!({"hello": "world"})).await?;
//!     println!("{output}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **security**: classifier, tokens, audit sinks and the [`SecureExecutor`](security::SecureExecutor)
//! - **tools**: the `Tool` contract and the registry that builds executors
//! - **workflow**: parallel and dependency-graph orchestration
//! - **economics**: ledger, cost algebra, budgets and bypass purchases
//! - **events**: lifecycle notifications for an injected event bus

pub mod config;
pub mod economics;
pub mod error;
pub mod events;
pub mod runtime;
pub mod security;
pub mod telemetry;
pub mod tools;
pub mod workflow;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use runtime::{Warden, WardenBuilder};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{
        AuditConfig, BudgetConfig, EventConfig, ExecutorConfig, OrchestratorConfig, WardenConfig,
    };
    pub use crate::economics::{
        BudgetHandle, BypassGrant, BypassRequest, CapitalLedger, CostContext, CostFactor,
        LedgerEvent, LedgerEventKind, ResourceBudget, bypass_cost, issue_budget, purchase_bypass,
        with_budget,
    };
    pub use crate::error::{Result, TokenError, WardenError};
    pub use crate::events::{ChannelEventSink, EventSink, LifecycleEvent, event_channel};
    pub use crate::runtime::{Warden, WardenBuilder};
    pub use crate::security::{
        AgentContext, AuditEntry, AuditKind, AuditSink, CapabilityToken, InMemoryAuditLog,
        JsonlAuditLog, PermissionClassifier, PermissionLevel, PermissionStatus, SecureExecutor,
        SecurityLevel, ToolCapabilities,
    };
    pub use crate::telemetry::init_tracing;
    pub use crate::tools::{
        BoxedTool, FnTool, Tool, ToolError, ToolErrorKind, ToolMetadata, ToolRegistry,
    };
    pub use crate::workflow::{
        DagNode, NodeOutcome, NodeResult, NodeStatus, Orchestrator, OrchestratorResult,
    };
}
