//! The execution loop: worklist scheduling over a validated graph.
//!
//! One [`Runner`] drives one run. Ready nodes sit in a flume queue; the loop
//! pulls from it while concurrency allows and awaits completions through a
//! [`tokio::task::JoinSet`]. A dependent is enqueued only once **every** one
//! of its upstream sources has reached a terminal step status, so fan-in
//! joins fire exactly once with all inputs present.
//!
//! Pause and cancel are cooperative and take effect at the dispatch point:
//! in-flight handlers always run to completion (or their timeout), but no
//! new node is dispatched while paused or after cancel. The controller
//! communicates both through a `tokio::sync::watch` channel, which makes
//! resume/cancel wakeups race-free even when the loop is idle.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::instrument;

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::events::{StatusEvent, StatusHub};
use crate::graph::ExecutionGraph;
use crate::handlers::{HandlerInput, HandlerRegistry, NodeHandler};
use crate::registry::NodeTypeRegistry;
use crate::types::{ExecutionStatus, StepStatus};
use crate::workflow::WorkflowDefinition;

/// Cooperative control state pushed by the controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlState {
    pub paused: bool,
    pub cancelled: bool,
}

/// Why a single step failed.
#[derive(Debug, Error, Diagnostic)]
pub enum StepError {
    /// The handler exceeded the per-node timeout.
    #[error("handler timed out after {timeout:?}")]
    #[diagnostic(
        code(flowgrid::runner::timeout),
        help("Raise the node timeout in EngineConfig or make the handler faster.")
    )]
    Timeout { timeout: Duration },

    /// The handler returned an error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Handler(#[from] crate::handlers::HandlerError),

    /// The handler task panicked.
    #[error("handler task panicked: {0}")]
    #[diagnostic(code(flowgrid::runner::panic))]
    Panicked(String),
}

/// Drives one run to a terminal status. Constructed by the controller and
/// consumed by [`Runner::run`].
pub struct Runner {
    pub(crate) workflow: Arc<WorkflowDefinition>,
    pub(crate) graph: ExecutionGraph,
    pub(crate) context: Arc<ExecutionContext>,
    pub(crate) handlers: Arc<HandlerRegistry>,
    pub(crate) registry: Arc<NodeTypeRegistry>,
    pub(crate) hub: Arc<StatusHub>,
    pub(crate) config: EngineConfig,
    pub(crate) control: watch::Receiver<ControlState>,
    /// Caller-supplied run payload, handed to trigger nodes as their inputs.
    pub(crate) initial_inputs: FxHashMap<String, serde_json::Value>,
}

impl Runner {
    /// Execute the run. Always resolves the run to a terminal status and
    /// publishes `ExecutionFinished` as the last event, even on internal
    /// failure paths.
    #[instrument(
        name = "run_execution",
        skip(self),
        fields(execution_id = %self.context.execution_id(), workflow_id = %self.workflow.workflow_id)
    )]
    pub async fn run(self) {
        let execution_id = self.context.execution_id().to_string();
        self.hub.publish(StatusEvent::ExecutionStarted {
            execution_id: execution_id.clone(),
            workflow_id: self.workflow.workflow_id.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.set_run_status(ExecutionStatus::Running);
        self.context.log(
            "info",
            format!("execution started with {} node(s)", self.graph.node_count()),
        );

        let (ready_tx, ready_rx) = flume::unbounded::<String>();
        let mut queued = 0usize;
        let mut scheduled: FxHashSet<String> = FxHashSet::default();
        for trigger in self.graph.triggers() {
            scheduled.insert(trigger.clone());
            let _ = ready_tx.send(trigger.clone());
            queued += 1;
        }

        let deadline = self
            .config
            .run_timeout
            .map(|t| tokio::time::Instant::now() + t);
        let mut in_flight: JoinSet<(String, Result<serde_json::Value, StepError>)> = JoinSet::new();
        // Moved out of self so the select arms can borrow self immutably.
        let mut control_rx = self.control.clone();
        // Pick up any command issued before the loop started.
        let mut control = *control_rx.borrow_and_update();
        let mut control_closed = false;
        // Set when a critical failure or run timeout halts dispatch.
        let mut halt_error: Option<String> = None;
        let mut timed_out = false;

        loop {
            let dispatching = !control.paused
                && !control.cancelled
                && halt_error.is_none()
                && !timed_out;
            if in_flight.is_empty() && (queued == 0 || !dispatching) {
                if dispatching && queued == 0 {
                    break; // all reachable work done
                }
                if control.cancelled || halt_error.is_some() || timed_out {
                    break; // drained after halt
                }
                // Paused with nothing in flight: wait for a control change.
                if control_closed {
                    // Controller went away while paused; treat as cancel so
                    // the run cannot hang forever.
                    control.cancelled = true;
                    continue;
                }
            }

            tokio::select! {
                biased;

                changed = control_rx.changed(), if !control_closed => {
                    match changed {
                        Ok(()) => {
                            let next = *control_rx.borrow_and_update();
                            self.apply_control_change(control, next);
                            control = next;
                        }
                        Err(_) => control_closed = true,
                    }
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    match joined {
                        Ok((node_id, outcome)) => {
                            if let Some(error) = self.finish_step(&node_id, outcome) {
                                halt_error = Some(error);
                            } else if halt_error.is_none() && !control.cancelled {
                                queued += self.enqueue_ready_dependents(
                                    &node_id,
                                    &ready_tx,
                                    &mut scheduled,
                                );
                            }
                        }
                        // Handler panics are caught inside the task; a join
                        // error here means the task itself was lost.
                        Err(join_err) => {
                            tracing::error!(error = %join_err, "execution task failed");
                            halt_error = Some(format!("execution task failed: {join_err}"));
                        }
                    }
                }

                node = ready_rx.recv_async(), if dispatching
                    && queued > 0
                    && in_flight.len() < self.config.max_concurrency =>
                {
                    if let Ok(node_id) = node {
                        queued -= 1;
                        self.dispatch(&node_id, &mut in_flight);
                    }
                }

                () = sleep_until_deadline(deadline), if deadline.is_some() && !timed_out => {
                    timed_out = true;
                }
            }
        }

        self.resolve_terminal(control, halt_error, timed_out);
    }

    /// React to a pause/resume flip from the controller. Cancel is handled
    /// in the main loop's drain logic.
    fn apply_control_change(&self, previous: ControlState, next: ControlState) {
        if next.cancelled {
            self.context.log("info", "cancel requested");
            return;
        }
        if next.paused && !previous.paused {
            self.set_run_status(ExecutionStatus::Paused);
            self.context.log("info", "execution paused");
        } else if !next.paused && previous.paused {
            self.set_run_status(ExecutionStatus::Running);
            self.context.log("info", "execution resumed");
        }
    }

    /// Spawn one node's handler into the join set, wrapped in the per-node
    /// timeout.
    fn dispatch(
        &self,
        node_id: &str,
        in_flight: &mut JoinSet<(String, Result<serde_json::Value, StepError>)>,
    ) {
        let Some(node) = self.workflow.node(node_id) else {
            // Graph and definition are built from the same node list.
            tracing::error!(node_id, "ready node missing from workflow definition");
            return;
        };
        let handler: Arc<dyn NodeHandler> = self.handlers.resolve(&node.node_type_id);
        let mut inputs = self
            .context
            .gather_inputs(node_id, &self.workflow.connections);
        // Trigger nodes have no upstream sources; they receive the run's
        // initial payload instead.
        if self.graph.in_degree(node_id) == 0 {
            for (key, value) in &self.initial_inputs {
                inputs
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        let input = HandlerInput {
            node_id: node.node_id.clone(),
            config: node.config.clone(),
            inputs,
        };
        self.context.mark_step_running(node_id);
        self.hub.publish(StatusEvent::StepStatusChanged {
            execution_id: self.context.execution_id().to_string(),
            node_id: node_id.to_string(),
            status: StepStatus::Running,
            timestamp: chrono::Utc::now(),
        });
        tracing::debug!(node_id, node_type = %node.node_type_id, "dispatching node");

        let timeout = self.config.node_timeout;
        let id = node.node_id.clone();
        in_flight.spawn(async move {
            // Catch panics here so the node id survives to the join point.
            let guarded = AssertUnwindSafe(handler.handle(input)).catch_unwind();
            let outcome = match tokio::time::timeout(timeout, guarded).await {
                Ok(Ok(Ok(value))) => Ok(value),
                Ok(Ok(Err(err))) => Err(StepError::Handler(err)),
                Ok(Err(panic)) => Err(StepError::Panicked(panic_message(&panic))),
                Err(_) => Err(StepError::Timeout { timeout }),
            };
            (id, outcome)
        });
    }

    /// Record a finished step and publish its events. Returns a run-halting
    /// error message when a critical step failed.
    fn finish_step(
        &self,
        node_id: &str,
        outcome: Result<serde_json::Value, StepError>,
    ) -> Option<String> {
        let execution_id = self.context.execution_id().to_string();
        match outcome {
            Ok(result) => {
                self.context.record_step_success(node_id, result.clone());
                self.hub.publish(StatusEvent::StepCompleted {
                    execution_id,
                    node_id: node_id.to_string(),
                    result,
                    timestamp: chrono::Utc::now(),
                });
                tracing::debug!(node_id, "node completed");
                None
            }
            Err(err) => {
                let message = err.to_string();
                let critical = self
                    .workflow
                    .node(node_id)
                    .map_or(true, |n| self.registry.is_critical(&n.node_type_id));
                self.context.record_step_failure(node_id, &message);
                self.hub.publish(StatusEvent::StepFailed {
                    execution_id,
                    node_id: node_id.to_string(),
                    error: message.clone(),
                    critical,
                    timestamp: chrono::Utc::now(),
                });
                if critical {
                    tracing::warn!(node_id, %message, "critical node failed, halting run");
                    Some(format!("node {node_id} failed: {message}"))
                } else {
                    tracing::warn!(node_id, %message, "non-critical node failed, continuing");
                    self.context
                        .log("warn", format!("non-critical node {node_id} failed: {message}"));
                    None
                }
            }
        }
    }

    /// Enqueue dependents of a finished node whose upstream sources are all
    /// terminal. Returns how many were enqueued.
    fn enqueue_ready_dependents(
        &self,
        node_id: &str,
        ready_tx: &flume::Sender<String>,
        scheduled: &mut FxHashSet<String>,
    ) -> usize {
        let mut enqueued = 0;
        for dependent in self.graph.dependents(node_id) {
            if scheduled.contains(dependent) {
                continue;
            }
            let Some(sources) = self.graph.upstream(dependent) else {
                continue;
            };
            if self.context.all_sources_terminal(sources) {
                scheduled.insert(dependent.clone());
                let _ = ready_tx.send(dependent.clone());
                enqueued += 1;
            }
        }
        enqueued
    }

    /// Resolve the run to its terminal status, mark unreached steps Skipped,
    /// and publish the final event.
    fn resolve_terminal(&self, control: ControlState, halt_error: Option<String>, timed_out: bool) {
        let (status, skip_reason) = if control.cancelled {
            (ExecutionStatus::Cancelled, "execution cancelled")
        } else if timed_out {
            let message = "execution timed out".to_string();
            self.context.set_error(&message);
            (ExecutionStatus::Failed, "execution timed out")
        } else if let Some(error) = halt_error {
            self.context.set_error(&error);
            (ExecutionStatus::Failed, "upstream failure")
        } else {
            (ExecutionStatus::Completed, "dependencies not satisfied")
        };

        for node_id in self.context.non_terminal_steps() {
            self.context.mark_step_skipped(&node_id, skip_reason);
            self.hub.publish(StatusEvent::StepStatusChanged {
                execution_id: self.context.execution_id().to_string(),
                node_id,
                status: StepStatus::Skipped,
                timestamp: chrono::Utc::now(),
            });
        }

        self.set_run_status(status);
        self.context
            .log("info", format!("execution finished: {status}"));
        tracing::info!(status = %status, "execution finished");
        self.hub.publish(StatusEvent::ExecutionFinished {
            execution_id: self.context.execution_id().to_string(),
            status,
            timestamp: chrono::Utc::now(),
        });
    }

    fn set_run_status(&self, status: ExecutionStatus) {
        if self.context.set_status(status) {
            self.hub.publish(StatusEvent::ExecutionStatusChanged {
                execution_id: self.context.execution_id().to_string(),
                status,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(instant) => tokio::time::sleep_until(instant).await,
        // Guarded out by the select arm; pend forever just in case.
        None => std::future::pending::<()>().await,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
