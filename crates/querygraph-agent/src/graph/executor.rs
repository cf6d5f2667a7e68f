use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use querygraph_core::error::{QueryGraphError, Result};

use super::edge::{EdgeTable, Label, Route};
use super::node::Step;

/// Engine-owned bounds on a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowLimits {
    /// Maximum number of node steps before the run gives up.
    pub max_steps: usize,
    /// Wall-clock budget for the whole run.
    pub max_duration: Option<Duration>,
}

impl Default for FlowLimits {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_duration: None,
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The last node's label had no successor.
    Completed,
    /// The halt predicate matched the context.
    Halted,
    /// `max_steps` was reached with a successor still pending.
    StepLimit,
    /// `max_duration` elapsed.
    TimedOut,
    /// The cancellation token fired.
    Cancelled,
}

/// Trace entry for one executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// 1-based step index.
    pub step: usize,
    pub node: String,
    pub label: Label,
    /// Successor chosen by the edge table, if any.
    pub next: Option<String>,
    pub elapsed_ms: u64,
}

/// Result of running a flow.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Executed steps in order.
    pub steps: Vec<StepRecord>,
    pub outcome: RunOutcome,
    pub total_elapsed_ms: u64,
}

impl ExecutionResult {
    /// Name of the last node that ran.
    pub fn last_node(&self) -> Option<&str> {
        self.steps.last().map(|s| s.node.as_str())
    }

    /// Node names in execution order.
    pub fn path(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.node.as_str()).collect()
    }
}

type HaltPredicate<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;

enum Interrupt {
    Cancelled,
    TimedOut,
}

/// Drives a flow over a context of type `C`.
///
/// Starting from the entry node, each step runs the current node, resolves
/// the emitted label through the edge table and moves on. The engine keeps
/// no per-run state, so one engine can serve concurrent runs over distinct
/// contexts.
pub struct FlowEngine<C> {
    nodes: HashMap<String, Arc<dyn Step<C>>>,
    edges: EdgeTable,
    entry: String,
    limits: FlowLimits,
    halt_when: Option<HaltPredicate<C>>,
    cancel: Option<CancellationToken>,
}

impl<C: Send + 'static> FlowEngine<C> {
    /// Build an engine. Fails with `NodeNotFound` when the entry node or any
    /// edge endpoint is not among `nodes`.
    pub fn new(
        nodes: Vec<Arc<dyn Step<C>>>,
        edges: EdgeTable,
        entry: impl Into<String>,
    ) -> Result<Self> {
        let nodes: HashMap<String, Arc<dyn Step<C>>> = nodes
            .into_iter()
            .map(|n| (n.name().to_string(), n))
            .collect();
        let entry = entry.into();

        if !nodes.contains_key(&entry) {
            return Err(QueryGraphError::NodeNotFound(entry));
        }
        for (from, to) in edges.endpoints() {
            for name in [from, to] {
                if !nodes.contains_key(name) {
                    return Err(QueryGraphError::NodeNotFound(name.to_string()));
                }
            }
        }

        Ok(Self {
            nodes,
            edges,
            entry,
            limits: FlowLimits::default(),
            halt_when: None,
            cancel: None,
        })
    }

    pub fn with_limits(mut self, limits: FlowLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Stop the run after any step whose resulting context matches.
    pub fn halt_when(mut self, predicate: impl Fn(&C) -> bool + Send + Sync + 'static) -> Self {
        self.halt_when = Some(Arc::new(predicate));
        self
    }

    /// Observe `token` between steps and while a step is suspended.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn limits(&self) -> FlowLimits {
        self.limits
    }

    /// Run the flow to completion over `ctx`.
    ///
    /// A node's hard failure aborts the run with that error. Cancellation
    /// and timeouts also interrupt a suspended step; since nodes only write
    /// the context after their execute phase, an interrupted step leaves the
    /// context as the previous step left it.
    pub async fn run(&self, ctx: &mut C) -> Result<ExecutionResult> {
        let start = Instant::now();
        let deadline = self
            .limits
            .max_duration
            .map(|d| tokio::time::Instant::now() + d);
        let mut steps: Vec<StepRecord> = Vec::new();
        let mut current = self.entry.clone();

        let outcome = loop {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                warn!(node = %current, "Flow cancelled");
                break RunOutcome::Cancelled;
            }
            if steps.len() >= self.limits.max_steps {
                warn!(
                    node = %current,
                    max_steps = self.limits.max_steps,
                    "Step limit reached, giving up"
                );
                break RunOutcome::StepLimit;
            }
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                warn!(node = %current, "Flow time budget exhausted");
                break RunOutcome::TimedOut;
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| QueryGraphError::NodeNotFound(current.clone()))?;
            let step = steps.len() + 1;
            info!(step, node = %current, "Executing flow node");

            let node_start = Instant::now();
            let stepped = tokio::select! {
                biased;
                _ = cancelled(self.cancel.as_ref()) => Err(Interrupt::Cancelled),
                _ = expired(deadline) => Err(Interrupt::TimedOut),
                result = node.step(ctx) => Ok(result),
            };
            let label = match stepped {
                Ok(result) => result?,
                Err(Interrupt::Cancelled) => {
                    warn!(node = %current, "Flow cancelled during step");
                    break RunOutcome::Cancelled;
                }
                Err(Interrupt::TimedOut) => {
                    warn!(node = %current, "Flow time budget exhausted during step");
                    break RunOutcome::TimedOut;
                }
            };
            let elapsed_ms = node_start.elapsed().as_millis() as u64;

            let next = match self.edges.resolve(&current, &label) {
                Some(Route::Labeled(to)) => {
                    debug!(node = %current, label = %label, next = %to, "Transition");
                    Some(to.to_string())
                }
                Some(Route::Default(to)) => {
                    debug!(node = %current, label = %label, next = %to, "Transition via default edge");
                    Some(to.to_string())
                }
                None => {
                    debug!(node = %current, label = %label, "No successor, flow complete");
                    None
                }
            };

            steps.push(StepRecord {
                step,
                node: current.clone(),
                label,
                next: next.clone(),
                elapsed_ms,
            });

            if self.halt_when.as_ref().is_some_and(|halt| halt(&*ctx)) {
                info!(node = %current, "Halt condition met");
                break RunOutcome::Halted;
            }

            match next {
                Some(to) => current = to,
                None => break RunOutcome::Completed,
            }
        };

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            steps = steps.len(),
            outcome = ?outcome,
            total_elapsed_ms,
            "Flow finished"
        );

        Ok(ExecutionResult {
            steps,
            outcome,
            total_elapsed_ms,
        })
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(t) => t.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn expired(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
