//! Bounded-concurrency scheduling of secure executors
//!
//! Two entry points share one limiter discipline:
//!
//! - [`Orchestrator::execute_parallel`] runs every executor against the same
//!   input and collects every result
//! - [`Orchestrator::execute_dag`] schedules a validated dependency graph;
//!   a node starts only after all of its dependencies resolved, and a node
//!   with any unsuccessful dependency is skipped
//!
//! Neither entry point fails because a node failed. Running invocations live
//! in a [`JoinSet`], so dropping the returned future aborts them; ledger and
//! audit writes already made stay as they are.

use chrono::Utc;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::dag::{DagNode, DependencyGraph};
use super::execution::{NodeOutcome, NodeResult, OrchestratorResult};
use crate::config::OrchestratorConfig;
use crate::error::{Result, WardenError};
use crate::events::{EventSink, LifecycleEvent};
use crate::security::SecureExecutor;

/// Schedules many tool invocations
#[derive(Clone, Default)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    events: Option<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish()
    }
}

/// Run one executor, turning a panic into a failure
async fn run_node(
    name: String,
    executor: Arc<SecureExecutor>,
    input: Value,
) -> NodeResult {
    let started = Instant::now();
    let outcome = match AssertUnwindSafe(executor.execute(input)).catch_unwind().await {
        Ok(result) => NodeOutcome::from(result),
        Err(_) => NodeOutcome::Failure(WardenError::Other(format!(
            "tool '{}' panicked",
            executor.tool_id()
        ))),
    };
    NodeResult {
        name,
        outcome,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

fn lost(name: &str) -> NodeResult {
    NodeResult {
        name: name.to_string(),
        outcome: NodeOutcome::Failure(WardenError::Other("task did not complete".to_string())),
        duration_ms: 0,
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = max_concurrency;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.config.max_concurrency
    }

    fn limiter(&self, max_concurrency: Option<usize>) -> Arc<Semaphore> {
        let permits = max_concurrency.unwrap_or(self.config.max_concurrency).max(1);
        Arc::new(Semaphore::new(permits))
    }

    /// Run every executor against `input`
    ///
    /// At most `max_concurrency` (default from config) invocations run at
    /// once. Returns one result per executor, in input order, named by tool id.
    pub async fn execute_parallel(
        &self,
        tools: Vec<Arc<SecureExecutor>>,
        input: Value,
        max_concurrency: Option<usize>,
    ) -> OrchestratorResult {
        let started = Instant::now();
        let limiter = self.limiter(max_concurrency);
        let names: Vec<String> = tools.iter().map(|t| t.tool_id().to_string()).collect();

        tracing::info!(
            tools = tools.len(),
            max_concurrency = limiter.available_permits(),
            "Starting parallel batch"
        );

        let mut running = JoinSet::new();
        for (index, executor) in tools.into_iter().enumerate() {
            let limiter = Arc::clone(&limiter);
            let input = input.clone();
            let name = names[index].clone();
            running.spawn(async move {
                let _permit = limiter.acquire_owned().await;
                (index, run_node(name, executor, input).await)
            });
        }

        let mut slots: Vec<Option<NodeResult>> = names.iter().map(|_| None).collect();
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "Parallel task lost"),
            }
        }

        let results: Vec<NodeResult> = slots
            .into_iter()
            .zip(&names)
            .map(|(slot, name)| slot.unwrap_or_else(|| lost(name)))
            .collect();

        let batch = OrchestratorResult::new(results, started.elapsed().as_millis() as u64);
        let summary = batch.summary();
        tracing::info!(
            success = summary.success,
            failure = summary.failure,
            duration_ms = batch.duration_ms,
            "Parallel batch finished"
        );
        batch
    }

    /// Run a dependency graph
    ///
    /// Edges are the union of each node's `depends_on` and `dependency_map`.
    /// A node with no dependencies receives `input`; any other node receives
    /// an object mapping each dependency name to that dependency's output.
    /// Ready nodes start in the order they became ready, ties broken by
    /// declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::DuplicateNode`], [`WardenError::UnknownDependency`]
    /// or [`WardenError::CyclicDependency`] before anything runs. Node
    /// failures are reported in the result, never as an error.
    pub async fn execute_dag(
        &self,
        nodes: Vec<DagNode>,
        dependency_map: &HashMap<String, Vec<String>>,
        input: Value,
    ) -> Result<OrchestratorResult> {
        let graph = DependencyGraph::build(&nodes, dependency_map)?;
        let started = Instant::now();
        let limiter = self.limiter(None);

        tracing::info!(
            nodes = nodes.len(),
            max_concurrency = limiter.available_permits(),
            "Starting dependency graph"
        );

        let mut outcomes: Vec<Option<NodeResult>> = nodes.iter().map(|_| None).collect();
        let mut pending: Vec<usize> = graph.dependencies.iter().map(Vec::len).collect();
        let mut ready: VecDeque<usize> = graph.roots().collect();
        let mut running: JoinSet<(usize, NodeResult)> = JoinSet::new();

        loop {
            while let Some(index) = ready.pop_front() {
                if let Some(reason) = skip_reason(&graph, &outcomes, index) {
                    tracing::warn!(node = %graph.names[index], reason = %reason, "Node skipped");
                    if let Some(events) = &self.events {
                        events
                            .emit(LifecycleEvent::NodeSkipped {
                                node: graph.names[index].clone(),
                                reason: reason.clone(),
                                timestamp: Utc::now(),
                            })
                            .await;
                    }
                    outcomes[index] = Some(NodeResult {
                        name: graph.names[index].clone(),
                        outcome: NodeOutcome::Skipped(reason),
                        duration_ms: 0,
                    });
                    release(&graph, &mut pending, &mut ready, index);
                    continue;
                }

                let node_input = node_input(&graph, &outcomes, index, &input);
                let permit = Arc::clone(&limiter)
                    .acquire_owned()
                    .await
                    .map_err(|e| WardenError::Other(format!("limiter closed: {}", e)))?;
                let name = graph.names[index].clone();
                let executor = Arc::clone(&nodes[index].executor);

                tracing::debug!(node = %name, "Node started");
                running.spawn(async move {
                    let result = run_node(name, executor, node_input).await;
                    drop(permit);
                    (index, result)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            match joined {
                Ok((index, result)) => {
                    tracing::debug!(
                        node = %result.name,
                        status = ?result.outcome.status(),
                        duration_ms = result.duration_ms,
                        "Node resolved"
                    );
                    outcomes[index] = Some(result);
                    release(&graph, &mut pending, &mut ready, index);
                }
                Err(e) => {
                    // Only reachable if the task was aborted from outside
                    tracing::error!(error = %e, "Graph task lost");
                }
            }
        }

        let results: Vec<NodeResult> = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| NodeResult {
                    name: graph.names[index].clone(),
                    outcome: NodeOutcome::Skipped("never became ready".to_string()),
                    duration_ms: 0,
                })
            })
            .collect();

        let batch = OrchestratorResult::new(results, started.elapsed().as_millis() as u64);
        let summary = batch.summary();
        tracing::info!(
            success = summary.success,
            failure = summary.failure,
            skipped = summary.skipped,
            duration_ms = batch.duration_ms,
            "Dependency graph finished"
        );
        Ok(batch)
    }
}

/// Why a ready node must not run, if any dependency did not succeed
fn skip_reason(
    graph: &DependencyGraph,
    outcomes: &[Option<NodeResult>],
    index: usize,
) -> Option<String> {
    graph.dependencies[index].iter().find_map(|&dep| {
        let name = &graph.names[dep];
        match outcomes[dep].as_ref().map(|r| &r.outcome) {
            Some(NodeOutcome::Success(_)) => None,
            Some(NodeOutcome::Failure(_)) => Some(format!("dependency '{}' failed", name)),
            Some(NodeOutcome::Skipped(_)) => Some(format!("dependency '{}' was skipped", name)),
            None => Some(format!("dependency '{}' did not resolve", name)),
        }
    })
}

/// Effective input: the global input for roots, dependency outputs otherwise
fn node_input(
    graph: &DependencyGraph,
    outcomes: &[Option<NodeResult>],
    index: usize,
    input: &Value,
) -> Value {
    let dependencies = &graph.dependencies[index];
    if dependencies.is_empty() {
        return input.clone();
    }

    let mut combined = Map::new();
    for &dep in dependencies {
        let output = outcomes[dep]
            .as_ref()
            .and_then(|r| r.outcome.output())
            .cloned()
            .unwrap_or(Value::Null);
        combined.insert(graph.names[dep].clone(), output);
    }
    Value::Object(combined)
}

/// Mark `index` resolved and queue dependents that have nothing left to wait on
fn release(
    graph: &DependencyGraph,
    pending: &mut [usize],
    ready: &mut VecDeque<usize>,
    index: usize,
) {
    for &dependent in &graph.dependents[index] {
        pending[dependent] -= 1;
        if pending[dependent] == 0 {
            ready.push_back(dependent);
        }
    }
}
