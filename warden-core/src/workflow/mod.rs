//! Scheduling many tool invocations
//!
//! This module runs [`SecureExecutor`](crate::security::SecureExecutor)s in
//! bulk:
//!
//! - **Parallel**: every executor against the same input, collect-all
//! - **DAG**: a dependency graph, validated up front and executed with
//!   skip propagation past failed nodes
//!
//! Both honour one concurrency limit and report a [`OrchestratorResult`]
//! partitioned into successes, failures and skipped nodes.
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_core::workflow::{DagNode, Orchestrator};
//!
//! let orchestrator = Orchestrator::new().with_max_concurrency(4);
//!
//! let nodes = vec![
//!     DagNode::new("fetch", fetch.clone()),
//!     DagNode::new("parse", parse.clone()).depends_on("fetch"),
//!     DagNode::new("store", store.clone()).depends_on("parse"),
//! ];
//!
//! let result = orchestrator.execute_dag(nodes, &HashMap::new(), input).await?;
//! if !result.all_succeeded() {
//!     for failed in result.failures() {
//!         eprintln!("{} failed", failed.name);
//!     }
//! }
//! ```

mod dag;
mod execution;
mod orchestrator;

pub use dag::DagNode;
pub use execution::{NodeOutcome, NodeResult, NodeStatus, OrchestratorResult, OutcomeSummary};
pub use orchestrator::Orchestrator;
