//! Execution controller: the public entry point for running workflows.
//!
//! [`ExecutionController`] validates a workflow, spawns its [`Runner`], and
//! tracks every live run in a shared table. It is the surface an API layer
//! calls: start, query, pause/resume/cancel, fetch logs, subscribe to status
//! events. Terminal runs stay queryable for the configured retention window
//! and are then evicted by a supervisor task.
//!
//! The controller holds no global state: the node-type registry and handler
//! table are injected at construction, so isolated controllers (with fake
//! handlers, tiny catalogs) are cheap to build in tests.

use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::context::{ExecutionContext, ExecutionSnapshot, LogEntry};
use crate::events::{StatusHub, StatusStream};
use crate::graph::{ExecutionGraph, ValidationError};
use crate::handlers::{HandlerInput, HandlerRegistry};
use crate::registry::NodeTypeRegistry;
use crate::runner::{ControlState, Runner, StepError};
use crate::types::ExecutionStatus;
use crate::workflow::{WorkflowDefinition, WorkflowNode, DEFAULT_INPUT_HANDLE};

#[derive(Debug, Error, Diagnostic)]
pub enum ControllerError {
    #[error("execution not found: {execution_id}")]
    #[diagnostic(
        code(flowgrid::controller::not_found),
        help("The execution id is unknown or the run was evicted after its retention window.")
    )]
    ExecutionNotFound { execution_id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidWorkflow(#[from] ValidationError),

    #[error("execution {execution_id} is {status}; command not applicable")]
    #[diagnostic(
        code(flowgrid::controller::invalid_state),
        help("Pause applies to running executions, resume to paused ones, cancel to any active run.")
    )]
    InvalidState {
        execution_id: String,
        status: ExecutionStatus,
    },

    #[error("node preview failed: {0}")]
    #[diagnostic(code(flowgrid::controller::preview))]
    PreviewFailed(#[from] StepError),
}

/// One log line as returned by [`ExecutionController::get_logs`]:
/// run-level entries carry no node id.
#[derive(Clone, Debug, Serialize)]
pub struct LogRecord {
    pub node_id: Option<String>,
    #[serde(flatten)]
    pub entry: LogEntry,
}

struct RunEntry {
    context: Arc<ExecutionContext>,
    hub: Arc<StatusHub>,
    control: watch::Sender<ControlState>,
}

/// Owns the run table and the lifecycle of every execution it starts.
pub struct ExecutionController {
    registry: Arc<NodeTypeRegistry>,
    handlers: Arc<HandlerRegistry>,
    config: EngineConfig,
    runs: Arc<RwLock<FxHashMap<String, RunEntry>>>,
}

impl ExecutionController {
    /// Controller over the built-in catalog and handlers.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_components(
            Arc::new(NodeTypeRegistry::with_builtin_catalog()),
            Arc::new(HandlerRegistry::with_builtin_handlers()),
            config,
        )
    }

    /// Controller with an injected registry and handler table.
    #[must_use]
    pub fn with_components(
        registry: Arc<NodeTypeRegistry>,
        handlers: Arc<HandlerRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            handlers,
            config,
            runs: Arc::new(RwLock::new(FxHashMap::default())),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &NodeTypeRegistry {
        &self.registry
    }

    /// Validate `workflow` and start executing it. `input_data` seeds the
    /// trigger nodes: an object's entries become their input map, `null`
    /// seeds nothing, any other value lands under the conventional input
    /// handle. Returns the new execution id immediately; the run proceeds on
    /// background tasks.
    ///
    /// # Errors
    ///
    /// [`ControllerError::InvalidWorkflow`] when validation rejects the
    /// definition; nothing executes in that case.
    #[instrument(
        skip(self, workflow, input_data),
        fields(workflow_id = %workflow.workflow_id),
        err
    )]
    pub fn start_execution(
        &self,
        workflow: WorkflowDefinition,
        input_data: Value,
    ) -> Result<String, ControllerError> {
        let graph = ExecutionGraph::build(&workflow, &self.registry)?;
        let execution_id = Uuid::new_v4().to_string();
        let workflow = Arc::new(workflow);
        let context = Arc::new(ExecutionContext::new(
            execution_id.clone(),
            &workflow,
            self.config.log_capacity,
        ));
        for warning in graph.warnings() {
            context.log("warn", format!("validation warning: {warning:?}"));
        }
        let hub = StatusHub::new(self.config.event_buffer_capacity);
        let (control_tx, control_rx) = watch::channel(ControlState::default());

        self.runs.write().insert(
            execution_id.clone(),
            RunEntry {
                context: Arc::clone(&context),
                hub: Arc::clone(&hub),
                control: control_tx,
            },
        );

        let runner = Runner {
            workflow,
            graph,
            context,
            handlers: Arc::clone(&self.handlers),
            registry: Arc::clone(&self.registry),
            hub,
            config: self.config.clone(),
            control: control_rx,
            initial_inputs: seed_inputs(input_data),
        };
        let run_task = tokio::spawn(runner.run());

        // Supervisor: evict the run from the table once the retention window
        // after termination has passed.
        let runs = Arc::clone(&self.runs);
        let retention = self.config.retention_window;
        let evict_id = execution_id.clone();
        tokio::spawn(async move {
            let _ = run_task.await;
            tokio::time::sleep(retention).await;
            runs.write().remove(&evict_id);
            tracing::debug!(execution_id = %evict_id, "run evicted after retention window");
        });

        tracing::info!(execution_id = %execution_id, "execution started");
        Ok(execution_id)
    }

    /// Point-in-time snapshot of a run.
    pub fn get_status(&self, execution_id: &str) -> Result<ExecutionSnapshot, ControllerError> {
        let runs = self.runs.read();
        let entry = runs
            .get(execution_id)
            .ok_or_else(|| ControllerError::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            })?;
        Ok(entry.context.snapshot())
    }

    /// Snapshots of every run that has not yet reached a terminal status.
    #[must_use]
    pub fn list_active(&self) -> Vec<ExecutionSnapshot> {
        let runs = self.runs.read();
        let mut active: Vec<ExecutionSnapshot> = runs
            .values()
            .filter(|entry| entry.context.status().is_active())
            .map(|entry| entry.context.snapshot())
            .collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        active
    }

    /// Stop dispatching new nodes; in-flight nodes finish. Valid only while
    /// the run is `Running`.
    #[instrument(skip(self), err)]
    pub fn pause(&self, execution_id: &str) -> Result<(), ControllerError> {
        self.send_control(execution_id, Some(ExecutionStatus::Running), |state| {
            state.paused = true;
        })
    }

    /// Resume dispatch after a pause. Valid only while the run is `Paused`.
    #[instrument(skip(self), err)]
    pub fn resume(&self, execution_id: &str) -> Result<(), ControllerError> {
        self.send_control(execution_id, Some(ExecutionStatus::Paused), |state| {
            state.paused = false;
        })
    }

    /// End the run: in-flight nodes finish, everything else is skipped and
    /// the run resolves to `Cancelled`. Valid from any non-terminal status.
    #[instrument(skip(self), err)]
    pub fn cancel(&self, execution_id: &str) -> Result<(), ControllerError> {
        self.send_control(execution_id, None, |state| state.cancelled = true)
    }

    /// `required` pins the command to one specific status; `None` accepts any
    /// non-terminal status.
    fn send_control(
        &self,
        execution_id: &str,
        required: Option<ExecutionStatus>,
        mutate: impl FnOnce(&mut ControlState),
    ) -> Result<(), ControllerError> {
        let runs = self.runs.read();
        let entry = runs
            .get(execution_id)
            .ok_or_else(|| ControllerError::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            })?;
        let status = entry.context.status();
        let applicable = match required {
            Some(required) => status == required,
            None => !status.is_terminal(),
        };
        if !applicable {
            return Err(ControllerError::InvalidState {
                execution_id: execution_id.to_string(),
                status,
            });
        }
        entry.control.send_modify(mutate);
        Ok(())
    }

    /// Merged run and step logs, ordered by timestamp, paginated by
    /// `offset`/`limit`.
    pub fn get_logs(
        &self,
        execution_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LogRecord>, ControllerError> {
        let runs = self.runs.read();
        let entry = runs
            .get(execution_id)
            .ok_or_else(|| ControllerError::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            })?;
        Ok(entry
            .context
            .all_logs()
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(node_id, entry)| LogRecord { node_id, entry })
            .collect())
    }

    /// Subscribe to a run's status events. Multiple subscribers are
    /// independent; each stream ends after the run's terminal event.
    pub fn subscribe(&self, execution_id: &str) -> Result<StatusStream, ControllerError> {
        let runs = self.runs.read();
        let entry = runs
            .get(execution_id)
            .ok_or_else(|| ControllerError::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            })?;
        Ok(entry.hub.subscribe())
    }

    /// Run a single node's handler outside any workflow, for editor-side
    /// testing of a configured node. `input_data` stands in for upstream
    /// results, seeded like [`start_execution`](Self::start_execution)'s
    /// initial payload. Applies the per-node timeout.
    #[instrument(skip(self, node, input_data), fields(node_type = %node.node_type_id), err)]
    pub async fn execute_node_preview(
        &self,
        node: &WorkflowNode,
        input_data: Value,
    ) -> Result<Value, ControllerError> {
        let handler = self.handlers.resolve(&node.node_type_id);
        let input = HandlerInput {
            node_id: node.node_id.clone(),
            config: node.config.clone(),
            inputs: seed_inputs(input_data),
        };
        let timeout = self.config.node_timeout;
        match tokio::time::timeout(timeout, handler.handle(input)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ControllerError::PreviewFailed(StepError::Handler(err))),
            Err(_) => Err(ControllerError::PreviewFailed(StepError::Timeout {
                timeout,
            })),
        }
    }
}

/// Turn a caller-supplied payload into an input map: an object's entries
/// become input keys, `null` seeds nothing, and any other value lands under
/// the conventional input handle.
fn seed_inputs(input_data: Value) -> FxHashMap<String, Value> {
    match input_data {
        Value::Null => FxHashMap::default(),
        Value::Object(map) => map.into_iter().collect(),
        other => {
            let mut inputs = FxHashMap::default();
            inputs.insert(DEFAULT_INPUT_HANDLE.to_string(), other);
            inputs
        }
    }
}
