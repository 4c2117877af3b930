//! Core status types shared across the flowgrid engine.
//!
//! Two state machines live here:
//!
//! - [`ExecutionStatus`]: the overall status of one workflow run. The only
//!   cyclic transition is `Running ↔ Paused`; every other transition out of
//!   `Running`/`Paused` is terminal.
//! - [`StepStatus`]: the per-node status inside a run. A step starts in
//!   `Waiting`, moves to `Running` at dispatch, and transitions exactly once
//!   into `Completed`, `Failed`, or `Skipped`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall status of a workflow run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Run is registered but no node has been dispatched yet.
    Pending,
    /// At least one node has been dispatched and the run is making progress.
    Running,
    /// A pause command took effect; no new nodes are dispatched until resume.
    Paused,
    /// Every reachable node reached a terminal step status and none failed
    /// under the critical-failure policy.
    Completed,
    /// A critical node failure, a timeout, or an engine error ended the run.
    Failed,
    /// A cancel command took effect; in-flight nodes finished, nothing else ran.
    Cancelled,
}

impl ExecutionStatus {
    /// Returns `true` once the run can no longer change status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` while the run has not reached a terminal status.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Per-node status within one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Created with the run; dependencies not yet satisfied.
    Waiting,
    /// Handler dispatched and not yet finished.
    Running,
    /// Handler returned a result; the result is recorded for downstream use.
    Completed,
    /// Handler returned an error or exceeded its timeout.
    Failed,
    /// The run ended (failure, cancel, or unsatisfiable dependencies) before
    /// this step could run.
    Skipped,
}

impl StepStatus {
    /// Returns `true` once the step can no longer change status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_status_terminality() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn step_status_terminality() {
        assert!(!StepStatus::Waiting.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
    }

    #[test]
    fn serde_uses_snake_case() {
        let s = serde_json::to_string(&ExecutionStatus::Cancelled).unwrap();
        assert_eq!(s, "\"cancelled\"");
        let s = serde_json::to_string(&StepStatus::Waiting).unwrap();
        assert_eq!(s, "\"waiting\"");
    }
}
