//! Per-node outcomes and batch results

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WardenError;

/// What happened to one node
#[derive(Debug)]
pub enum NodeOutcome {
    /// The tool ran and returned output
    Success(Value),
    /// The call failed: denied, timed out, token rejected or tool error
    Failure(WardenError),
    /// Never invoked because a dependency did not succeed
    Skipped(String),
}

/// Outcome without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Success,
    Failure,
    Skipped,
}

impl NodeOutcome {
    pub fn status(&self) -> NodeStatus {
        match self {
            NodeOutcome::Success(_) => NodeStatus::Success,
            NodeOutcome::Failure(_) => NodeStatus::Failure,
            NodeOutcome::Skipped(_) => NodeStatus::Skipped,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, NodeOutcome::Failure(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, NodeOutcome::Skipped(_))
    }

    pub fn output(&self) -> Option<&Value> {
        match self {
            NodeOutcome::Success(output) => Some(output),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&WardenError> {
        match self {
            NodeOutcome::Failure(error) => Some(error),
            _ => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            NodeOutcome::Skipped(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<crate::error::Result<Value>> for NodeOutcome {
    fn from(result: crate::error::Result<Value>) -> Self {
        match result {
            Ok(output) => NodeOutcome::Success(output),
            Err(error) => NodeOutcome::Failure(error),
        }
    }
}

/// Result of one node or one parallel branch
#[derive(Debug)]
pub struct NodeResult {
    /// Node name; the tool id for parallel batches
    pub name: String,
    pub outcome: NodeOutcome,
    /// Zero for skipped nodes
    pub duration_ms: u64,
}

/// Counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub success: usize,
    pub failure: usize,
    pub skipped: usize,
}

/// Collected results of a batch or graph
///
/// The orchestrator never fails a batch because one node failed; callers pick
/// the pass/fail policy with [`all_succeeded`](Self::all_succeeded),
/// [`any_succeeded`](Self::any_succeeded) or by inspecting the partition.
#[derive(Debug, Default)]
pub struct OrchestratorResult {
    results: Vec<NodeResult>,
    /// Wall time of the whole batch
    pub duration_ms: u64,
}

impl OrchestratorResult {
    pub(crate) fn new(results: Vec<NodeResult>, duration_ms: u64) -> Self {
        Self {
            results,
            duration_ms,
        }
    }

    /// Results in input (parallel) or declaration (graph) order
    pub fn results(&self) -> &[NodeResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<NodeResult> {
        self.results
    }

    /// First result with the given name
    pub fn get(&self, name: &str) -> Option<&NodeResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn successes(&self) -> Vec<&NodeResult> {
        self.with_status(NodeStatus::Success)
    }

    pub fn failures(&self) -> Vec<&NodeResult> {
        self.with_status(NodeStatus::Failure)
    }

    pub fn skipped(&self) -> Vec<&NodeResult> {
        self.with_status(NodeStatus::Skipped)
    }

    fn with_status(&self, status: NodeStatus) -> Vec<&NodeResult> {
        self.results
            .iter()
            .filter(|r| r.outcome.status() == status)
            .collect()
    }

    pub fn summary(&self) -> OutcomeSummary {
        let mut summary = OutcomeSummary::default();
        for result in &self.results {
            match result.outcome.status() {
                NodeStatus::Success => summary.success += 1,
                NodeStatus::Failure => summary.failure += 1,
                NodeStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// Every node succeeded (vacuously true when empty)
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_success())
    }

    pub fn any_succeeded(&self) -> bool {
        self.results.iter().any(|r| r.outcome.is_success())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
