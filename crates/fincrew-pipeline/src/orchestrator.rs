//! Orchestrator - runs a task graph in dependency order
//!
//! Sequential scheduling walks the resolved order one node at a time.
//! Concurrent scheduling starts every node whose dependencies have all
//! completed and waits on whichever finishes first. Either way the first
//! failure halts the run and nothing downstream of it starts.

use crate::graph::{realize, GraphError, RealizedTask, TaskGraph};
use fincrew_agent::{RoleError, TemplateVars};
use fincrew_core::SchedulingPolicy;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{error, info};

/// Why a single node failed.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Role(#[from] RoleError),

    #[error("no role named '{0}' is bound for this job")]
    UnboundRole(String),
}

#[derive(Debug, thiserror::Error)]
#[error("stage '{node_id}' failed: {cause}")]
pub struct StageFailure {
    pub node_id: String,
    #[source]
    pub cause: NodeError,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid task graph: {0}")]
    InvalidGraph(#[from] GraphError),

    #[error("cannot bind role: {0}")]
    Binding(RoleError),

    #[error(transparent)]
    Stage(#[from] StageFailure),
}

impl PipelineError {
    /// Id of the node that failed, when a stage failure ended the run.
    pub fn failed_node(&self) -> Option<&str> {
        match self {
            Self::Stage(f) => Some(&f.node_id),
            _ => None,
        }
    }
}

/// Executes one realized node. The production runner drives a bound role;
/// tests substitute their own.
#[async_trait::async_trait]
pub trait NodeRunner: Send + Sync {
    async fn run_node(&self, task: RealizedTask) -> Result<String, NodeError>;
}

/// Told about every stage result as soon as it is recorded.
pub trait StageObserver: Send + Sync {
    fn stage_completed(&self, node_id: &str, text: &str);
}

impl StageObserver for () {
    fn stage_completed(&self, _node_id: &str, _text: &str) {}
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub final_text: String,
    pub terminal: String,
    /// Node id to result, each recorded once.
    pub stages: BTreeMap<String, String>,
    /// Node ids in completion order.
    pub completed: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Orchestrator {
    policy: SchedulingPolicy,
}

impl Orchestrator {
    pub fn new(policy: SchedulingPolicy) -> Self {
        Self { policy }
    }

    pub async fn execute(
        &self,
        graph: &TaskGraph,
        vars: &TemplateVars,
        runner: &dyn NodeRunner,
        observer: &dyn StageObserver,
    ) -> Result<PipelineOutput, PipelineError> {
        let order = graph.resolve()?;
        let terminal = graph.terminal(&order)?;
        let started = Instant::now();

        info!(nodes = order.len(), policy = ?self.policy, "pipeline_started");

        let mut run = RunState::default();
        match self.policy {
            SchedulingPolicy::Sequential => {
                self.run_sequential(graph, &order, vars, runner, observer, &mut run).await?
            }
            SchedulingPolicy::Concurrent => {
                self.run_concurrent(graph, &order, vars, runner, observer, &mut run).await?
            }
        }

        let final_text = run
            .results
            .get(&terminal)
            .cloned()
            .ok_or_else(|| GraphError::DependencyNotReady {
                node: "<output>".into(),
                dependency: terminal.clone(),
            })?;

        info!(
            terminal = %terminal,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline_completed"
        );
        Ok(PipelineOutput { final_text, terminal, stages: run.results, completed: run.completed })
    }

    async fn run_sequential(
        &self,
        graph: &TaskGraph,
        order: &[String],
        vars: &TemplateVars,
        runner: &dyn NodeRunner,
        observer: &dyn StageObserver,
        run: &mut RunState,
    ) -> Result<(), PipelineError> {
        for id in order {
            let Some(node) = graph.node(id) else { continue };
            let task = realize(node, vars, &run.results)?;
            let started = Instant::now();
            let result = runner.run_node(task).await;
            run.settle(id, &node.role, result, started, observer)?;
        }
        Ok(())
    }

    async fn run_concurrent(
        &self,
        graph: &TaskGraph,
        order: &[String],
        vars: &TemplateVars,
        runner: &dyn NodeRunner,
        observer: &dyn StageObserver,
        run: &mut RunState,
    ) -> Result<(), PipelineError> {
        let mut waiting: Vec<&str> = order.iter().map(String::as_str).collect();
        let mut in_flight = FuturesUnordered::new();

        loop {
            let mut i = 0;
            while i < waiting.len() {
                let Some(node) = graph.node(waiting[i]) else {
                    waiting.remove(i);
                    continue;
                };
                if node.depends_on.iter().all(|d| run.results.contains_key(d)) {
                    waiting.remove(i);
                    let task = realize(node, vars, &run.results)?;
                    let role = node.role.clone();
                    in_flight.push(async move {
                        let started = Instant::now();
                        let id = task.node_id.clone();
                        let result = runner.run_node(task).await;
                        (id, role, result, started)
                    });
                } else {
                    i += 1;
                }
            }

            // Returning early drops the in-flight siblings.
            match in_flight.next().await {
                Some((id, role, result, started)) => run.settle(&id, &role, result, started, observer)?,
                None => break,
            }
        }

        if !waiting.is_empty() {
            return Err(GraphError::Cyclic {
                remaining: waiting.iter().map(|s| s.to_string()).collect(),
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Default)]
struct RunState {
    results: BTreeMap<String, String>,
    completed: Vec<String>,
}

impl RunState {
    fn settle(
        &mut self,
        node_id: &str,
        role: &str,
        result: Result<String, NodeError>,
        started: Instant,
        observer: &dyn StageObserver,
    ) -> Result<(), StageFailure> {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(text) => {
                info!(node_id, role, elapsed_ms, output_len = text.len(), "stage_completed");
                if !self.results.contains_key(node_id) {
                    observer.stage_completed(node_id, &text);
                    self.results.insert(node_id.to_string(), text);
                    self.completed.push(node_id.to_string());
                }
                Ok(())
            }
            Err(cause) => {
                error!(node_id, role, elapsed_ms, error = %cause, "stage_failed");
                Err(StageFailure { node_id: node_id.to_string(), cause })
            }
        }
    }
}
