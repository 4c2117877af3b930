//! Per-run mutable state: step progress, results, logs, snapshots.
//!
//! One [`ExecutionContext`] exists per run, shared between the execution
//! loop and the controller behind an `Arc`. All mutation goes through
//! synchronized methods (a single `parking_lot::RwLock` around the inner
//! state); readers observe consistent snapshots and concurrent node
//! completions interleave without tearing.
//!
//! Step terminality is enforced here: once a step reaches `Completed`,
//! `Failed`, or `Skipped`, later transition attempts are ignored.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;

use crate::types::{ExecutionStatus, StepStatus};
use crate::workflow::{Connection, WorkflowDefinition};

/// One timestamped log line, attached to a step or to the run itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

impl LogEntry {
    fn now(level: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: level.to_string(),
            message: message.into(),
        }
    }
}

/// Mutable progress record for one step. Log storage is a bounded ring;
/// old entries are dropped once `log_capacity` is reached.
#[derive(Clone, Debug)]
pub struct StepProgress {
    pub node_id: String,
    pub name: String,
    pub node_type_id: String,
    pub status: StepStatus,
    /// 0–100, advisory; handlers may report intermediate progress.
    pub progress: u8,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    logs: VecDeque<LogEntry>,
    log_capacity: usize,
}

impl StepProgress {
    fn new(node_id: &str, name: &str, node_type_id: &str, log_capacity: usize) -> Self {
        Self {
            node_id: node_id.to_string(),
            name: name.to_string(),
            node_type_id: node_type_id.to_string(),
            status: StepStatus::Waiting,
            progress: 0,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
            logs: VecDeque::new(),
            log_capacity,
        }
    }

    fn push_log(&mut self, entry: LogEntry) {
        if self.logs.len() == self.log_capacity {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
    }
}

/// Immutable view of one step, taken under the context lock.
#[derive(Clone, Debug, Serialize)]
pub struct StepSnapshot {
    pub node_id: String,
    pub name: String,
    pub node_type_id: String,
    pub status: StepStatus,
    pub progress: u8,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub logs: Vec<LogEntry>,
}

/// Immutable view of a whole run.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionSnapshot {
    pub execution_id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    /// Completed steps over total steps, 0–100.
    pub progress: u8,
    /// Node id of a currently running step, if any.
    pub current_step: Option<String>,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub total_steps: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub steps: Vec<StepSnapshot>,
}

struct ContextInner {
    status: ExecutionStatus,
    steps: FxHashMap<String, StepProgress>,
    /// Definition order, used for deterministic snapshots.
    step_order: Vec<String>,
    run_log: VecDeque<LogEntry>,
    error: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// Shared per-run state. Cheap to clone snapshots out of; all writes are
/// short critical sections.
pub struct ExecutionContext {
    execution_id: String,
    workflow_id: String,
    inner: RwLock<ContextInner>,
    log_capacity: usize,
}

impl ExecutionContext {
    /// Build a context with every node of `workflow` registered as a
    /// `Waiting` step.
    #[must_use]
    pub fn new(execution_id: impl Into<String>, workflow: &WorkflowDefinition, log_capacity: usize) -> Self {
        let mut steps = FxHashMap::default();
        let mut step_order = Vec::with_capacity(workflow.nodes.len());
        for node in &workflow.nodes {
            steps.insert(
                node.node_id.clone(),
                StepProgress::new(&node.node_id, &node.name, &node.node_type_id, log_capacity),
            );
            step_order.push(node.node_id.clone());
        }
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow.workflow_id.clone(),
            inner: RwLock::new(ContextInner {
                status: ExecutionStatus::Pending,
                steps,
                step_order,
                run_log: VecDeque::new(),
                error: None,
                started_at: Utc::now(),
                finished_at: None,
            }),
            log_capacity,
        }
    }

    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    #[must_use]
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Current run status.
    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        self.inner.read().status
    }

    /// Transition the run status. Transitions out of a terminal status are
    /// ignored and return `false`.
    pub fn set_status(&self, next: ExecutionStatus) -> bool {
        let mut inner = self.inner.write();
        if inner.status.is_terminal() {
            tracing::debug!(
                execution_id = %self.execution_id,
                from = %inner.status,
                to = %next,
                "ignoring status transition out of terminal state"
            );
            return false;
        }
        inner.status = next;
        if next.is_terminal() {
            inner.finished_at = Some(Utc::now());
        }
        true
    }

    /// Record a run-level error message (does not change status by itself).
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut inner = self.inner.write();
        push_capped(&mut inner.run_log, LogEntry::now("error", message.clone()), self.log_capacity);
        inner.error = Some(message);
    }

    /// Append a run-level log line.
    pub fn log(&self, level: &str, message: impl Into<String>) {
        let mut inner = self.inner.write();
        let entry = LogEntry::now(level, message);
        push_capped(&mut inner.run_log, entry, self.log_capacity);
    }

    /// Mark a step `Running` and stamp its start time. No-op if the step is
    /// already terminal or unknown.
    pub fn mark_step_running(&self, node_id: &str) {
        let mut inner = self.inner.write();
        if let Some(step) = inner.steps.get_mut(node_id) {
            if step.status.is_terminal() {
                return;
            }
            step.status = StepStatus::Running;
            step.started_at = Some(Utc::now());
            step.push_log(LogEntry::now("info", "step started"));
        }
    }

    /// Record a successful step result. Exactly-once: ignored if the step
    /// already reached a terminal status.
    pub fn record_step_success(&self, node_id: &str, result: Value) {
        let mut inner = self.inner.write();
        if let Some(step) = inner.steps.get_mut(node_id) {
            if step.status.is_terminal() {
                tracing::warn!(node_id, "ignoring duplicate terminal transition");
                return;
            }
            step.status = StepStatus::Completed;
            step.progress = 100;
            step.result = Some(result);
            step.finished_at = Some(Utc::now());
            step.push_log(LogEntry::now("info", "step completed"));
        }
    }

    /// Record a step failure. Exactly-once, like success.
    pub fn record_step_failure(&self, node_id: &str, error: impl Into<String>) {
        let error = error.into();
        let mut inner = self.inner.write();
        if let Some(step) = inner.steps.get_mut(node_id) {
            if step.status.is_terminal() {
                tracing::warn!(node_id, "ignoring duplicate terminal transition");
                return;
            }
            step.status = StepStatus::Failed;
            step.finished_at = Some(Utc::now());
            step.push_log(LogEntry::now("error", error.clone()));
            step.error = Some(error);
        }
    }

    /// Mark a step `Skipped`. Used at run teardown for steps that never
    /// became ready. No-op on terminal steps.
    pub fn mark_step_skipped(&self, node_id: &str, reason: &str) {
        let mut inner = self.inner.write();
        if let Some(step) = inner.steps.get_mut(node_id) {
            if step.status.is_terminal() {
                return;
            }
            step.status = StepStatus::Skipped;
            step.finished_at = Some(Utc::now());
            step.push_log(LogEntry::now("info", format!("skipped: {reason}")));
        }
    }

    /// Advisory intermediate progress for a running step (clamped to 0–100).
    pub fn update_step_progress(&self, node_id: &str, progress: u8) {
        let mut inner = self.inner.write();
        if let Some(step) = inner.steps.get_mut(node_id) {
            if step.status == StepStatus::Running {
                step.progress = progress.min(100);
            }
        }
    }

    /// Append a log line to a step's bounded log.
    pub fn log_step(&self, node_id: &str, level: &str, message: impl Into<String>) {
        let mut inner = self.inner.write();
        if let Some(step) = inner.steps.get_mut(node_id) {
            step.push_log(LogEntry::now(level, message));
        }
    }

    /// Status of a step, if it exists.
    #[must_use]
    pub fn step_status(&self, node_id: &str) -> Option<StepStatus> {
        self.inner.read().steps.get(node_id).map(|s| s.status)
    }

    /// Completed result of a step, if any.
    #[must_use]
    pub fn step_result(&self, node_id: &str) -> Option<Value> {
        self.inner.read().steps.get(node_id).and_then(|s| s.result.clone())
    }

    /// Whether every upstream source of a node has reached a terminal step
    /// status. Gate condition for enqueuing dependents.
    #[must_use]
    pub fn all_sources_terminal<'a, I>(&self, sources: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        let inner = self.inner.read();
        sources.into_iter().all(|id| {
            inner
                .steps
                .get(id.as_str())
                .is_some_and(|s| s.status.is_terminal())
        })
    }

    /// Assemble the input map for a node from its incoming connections.
    ///
    /// For each connection targeting `node_id` whose source completed: when
    /// the source result is a JSON object containing the connection's
    /// `source_output` key, that field is extracted; otherwise the whole
    /// result is passed. Values land under the connection's `target_input`
    /// key; collisions resolve last-write-wins in declaration order.
    #[must_use]
    pub fn gather_inputs(&self, node_id: &str, connections: &[Connection]) -> FxHashMap<String, Value> {
        let inner = self.inner.read();
        let mut inputs = FxHashMap::default();
        for conn in connections {
            if conn.target_node_id != node_id {
                continue;
            }
            let Some(source) = inner.steps.get(&conn.source_node_id) else {
                continue;
            };
            if source.status != StepStatus::Completed {
                continue;
            }
            let Some(result) = &source.result else {
                continue;
            };
            let value = match result {
                Value::Object(map) => map
                    .get(conn.source_output())
                    .cloned()
                    .unwrap_or_else(|| result.clone()),
                other => other.clone(),
            };
            inputs.insert(conn.target_input().to_string(), value);
        }
        inputs
    }

    /// Node ids of steps still `Waiting` or `Running`.
    #[must_use]
    pub fn non_terminal_steps(&self) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .step_order
            .iter()
            .filter(|id| {
                inner
                    .steps
                    .get(id.as_str())
                    .is_some_and(|s| !s.status.is_terminal())
            })
            .cloned()
            .collect()
    }

    /// Consistent point-in-time view of the whole run.
    #[must_use]
    pub fn snapshot(&self) -> ExecutionSnapshot {
        let inner = self.inner.read();
        let steps: Vec<StepSnapshot> = inner
            .step_order
            .iter()
            .filter_map(|id| inner.steps.get(id))
            .map(|s| StepSnapshot {
                node_id: s.node_id.clone(),
                name: s.name.clone(),
                node_type_id: s.node_type_id.clone(),
                status: s.status,
                progress: s.progress,
                result: s.result.clone(),
                error: s.error.clone(),
                started_at: s.started_at,
                finished_at: s.finished_at,
                logs: s.logs.iter().cloned().collect(),
            })
            .collect();

        let total = steps.len();
        let completed = steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        let failed = steps.iter().filter(|s| s.status == StepStatus::Failed).count();
        let current_step = steps
            .iter()
            .find(|s| s.status == StepStatus::Running)
            .map(|s| s.node_id.clone());
        // Failed and skipped steps never count toward progress.
        let progress = if total == 0 {
            100
        } else {
            ((completed * 100) / total) as u8
        };

        ExecutionSnapshot {
            execution_id: self.execution_id.clone(),
            workflow_id: self.workflow_id.clone(),
            status: inner.status,
            progress,
            current_step,
            completed_steps: completed,
            failed_steps: failed,
            total_steps: total,
            started_at: inner.started_at,
            finished_at: inner.finished_at,
            error: inner.error.clone(),
            steps,
        }
    }

    /// Run-level log entries, oldest first.
    #[must_use]
    pub fn run_log(&self) -> Vec<LogEntry> {
        self.inner.read().run_log.iter().cloned().collect()
    }

    /// Step and run logs merged, ordered by timestamp. Used by the
    /// controller's paginated log endpoint.
    #[must_use]
    pub fn all_logs(&self) -> Vec<(Option<String>, LogEntry)> {
        let inner = self.inner.read();
        let mut entries: Vec<(Option<String>, LogEntry)> = inner
            .run_log
            .iter()
            .map(|e| (None, e.clone()))
            .collect();
        for id in &inner.step_order {
            if let Some(step) = inner.steps.get(id) {
                entries.extend(step.logs.iter().map(|e| (Some(id.clone()), e.clone())));
            }
        }
        entries.sort_by_key(|(_, e)| e.timestamp);
        entries
    }
}

fn push_capped(log: &mut VecDeque<LogEntry>, entry: LogEntry, capacity: usize) {
    if log.len() == capacity {
        log.pop_front();
    }
    log.push_back(entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{WorkflowDefinition, WorkflowNode};
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        let wf = WorkflowDefinition::new("wf", "test")
            .with_node(WorkflowNode::new("a", "url_input", "A"))
            .with_node(WorkflowNode::new("b", "notification", "B"));
        ExecutionContext::new("exec-1", &wf, 16)
    }

    #[test]
    fn step_terminal_transition_happens_once() {
        let ctx = ctx();
        ctx.mark_step_running("a");
        ctx.record_step_success("a", json!({"result": 1}));
        // Later failure must not overwrite the completed result.
        ctx.record_step_failure("a", "too late");
        assert_eq!(ctx.step_status("a"), Some(StepStatus::Completed));
        assert_eq!(ctx.step_result("a"), Some(json!({"result": 1})));
    }

    #[test]
    fn run_status_terminal_is_sticky() {
        let ctx = ctx();
        assert!(ctx.set_status(ExecutionStatus::Running));
        assert!(ctx.set_status(ExecutionStatus::Cancelled));
        assert!(!ctx.set_status(ExecutionStatus::Completed));
        assert_eq!(ctx.status(), ExecutionStatus::Cancelled);
    }

    #[test]
    fn gather_inputs_extracts_named_field() {
        let wf = WorkflowDefinition::new("wf", "t")
            .with_node(WorkflowNode::new("src", "url_input", "S"))
            .with_node(WorkflowNode::new("dst", "notification", "D"))
            .with_connection(
                Connection::new("c1", "src", "dst")
                    .with_source_output("url")
                    .with_target_input("address"),
            );
        let ctx = ExecutionContext::new("exec", &wf, 16);
        ctx.mark_step_running("src");
        ctx.record_step_success("src", json!({"url": "https://example.com", "extra": 1}));
        let inputs = ctx.gather_inputs("dst", &wf.connections);
        assert_eq!(inputs.get("address"), Some(&json!("https://example.com")));
    }

    #[test]
    fn gather_inputs_falls_back_to_whole_result() {
        let wf = WorkflowDefinition::new("wf", "t")
            .with_node(WorkflowNode::new("src", "url_input", "S"))
            .with_node(WorkflowNode::new("dst", "notification", "D"))
            .with_connection(Connection::new("c1", "src", "dst"));
        let ctx = ExecutionContext::new("exec", &wf, 16);
        ctx.mark_step_running("src");
        // Non-object result: the whole value passes through.
        ctx.record_step_success("src", json!(42));
        let inputs = ctx.gather_inputs("dst", &wf.connections);
        assert_eq!(inputs.get("input"), Some(&json!(42)));
    }

    #[test]
    fn gather_inputs_last_write_wins_on_collision() {
        let wf = WorkflowDefinition::new("wf", "t")
            .with_node(WorkflowNode::new("s1", "url_input", "S1"))
            .with_node(WorkflowNode::new("s2", "url_input", "S2"))
            .with_node(WorkflowNode::new("dst", "notification", "D"))
            .with_connection(Connection::new("c1", "s1", "dst").with_target_input("x"))
            .with_connection(Connection::new("c2", "s2", "dst").with_target_input("x"));
        let ctx = ExecutionContext::new("exec", &wf, 16);
        for (id, v) in [("s1", json!(1)), ("s2", json!(2))] {
            ctx.mark_step_running(id);
            ctx.record_step_success(id, v);
        }
        let inputs = ctx.gather_inputs("dst", &wf.connections);
        assert_eq!(inputs.get("x"), Some(&json!(2)));
    }

    #[test]
    fn step_log_ring_is_bounded() {
        let wf = WorkflowDefinition::new("wf", "t").with_node(WorkflowNode::new("a", "url_input", "A"));
        let ctx = ExecutionContext::new("exec", &wf, 4);
        for i in 0..10 {
            ctx.log_step("a", "info", format!("line {i}"));
        }
        let snap = ctx.snapshot();
        assert_eq!(snap.steps[0].logs.len(), 4);
        assert_eq!(snap.steps[0].logs[0].message, "line 6");
    }

    #[test]
    fn snapshot_progress_counts_completed_steps() {
        let ctx = ctx();
        ctx.set_status(ExecutionStatus::Running);
        ctx.mark_step_running("a");
        ctx.record_step_success("a", json!(null));
        let snap = ctx.snapshot();
        assert_eq!(snap.progress, 50);
        assert_eq!(snap.completed_steps, 1);
        assert_eq!(snap.total_steps, 2);
        assert_eq!(snap.current_step, None);
    }

    #[test]
    fn failed_and_skipped_steps_do_not_count_as_progress() {
        let ctx = ctx();
        ctx.set_status(ExecutionStatus::Running);
        ctx.mark_step_running("a");
        ctx.record_step_failure("a", "boom");
        ctx.mark_step_skipped("b", "upstream failure");
        let snap = ctx.snapshot();
        assert_eq!(snap.progress, 0);
        assert_eq!(snap.failed_steps, 1);
        assert_eq!(snap.completed_steps, 0);
    }

    #[test]
    fn progress_updates_only_while_running() {
        let ctx = ctx();
        ctx.update_step_progress("a", 40);
        assert_eq!(ctx.snapshot().steps[0].progress, 0);
        ctx.mark_step_running("a");
        ctx.update_step_progress("a", 40);
        assert_eq!(ctx.snapshot().steps[0].progress, 40);
    }
}
