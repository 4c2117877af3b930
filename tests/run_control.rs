//! Run control: pause/resume, cancel, timeouts, the run table, logs, and
//! single-node preview.

use std::sync::Arc;
use std::time::Duration;

use flowgrid::config::EngineConfig;
use flowgrid::controller::{ControllerError, ExecutionController};
use flowgrid::types::{ExecutionStatus, StepStatus};
use flowgrid::workflow::WorkflowNode;
use serde_json::json;

mod common;
use common::*;

fn gated_controller(config: EngineConfig) -> (ExecutionController, GateHandler) {
    let gate = GateHandler::new();
    let controller = {
        let gate = gate.clone();
        test_controller(config, move |handlers| {
            handlers.register("gate", Arc::new(gate));
            handlers.register("task", Arc::new(EchoHandler::new()));
        })
    };
    (controller, gate)
}

#[tokio::test]
async fn pause_blocks_dispatch_and_resume_continues() {
    let (controller, gate) = gated_controller(test_config());
    let id = controller.start_execution(gated_chain(), json!(null)).unwrap();

    wait_until(Duration::from_secs(5), "gate node to start", || {
        controller
            .get_status(&id)
            .unwrap()
            .steps
            .iter()
            .any(|s| s.node_id == "gate" && s.status == StepStatus::Running)
    })
    .await;

    controller.pause(&id).unwrap();
    gate.release();

    // The in-flight gate node finishes, but "after" must not be dispatched.
    wait_until(Duration::from_secs(5), "gate node to finish", || {
        controller
            .get_status(&id)
            .unwrap()
            .steps
            .iter()
            .any(|s| s.node_id == "gate" && s.status == StepStatus::Completed)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = controller.get_status(&id).unwrap();
    assert_eq!(snapshot.status, ExecutionStatus::Paused);
    let after = snapshot.steps.iter().find(|s| s.node_id == "after").unwrap();
    assert_eq!(after.status, StepStatus::Waiting);

    controller.resume(&id).unwrap();
    wait_until(Duration::from_secs(5), "run to complete", || {
        controller.get_status(&id).unwrap().status.is_terminal()
    })
    .await;
    assert_eq!(
        controller.get_status(&id).unwrap().status,
        ExecutionStatus::Completed
    );
}

#[tokio::test]
async fn cancel_finishes_in_flight_and_skips_the_rest() {
    let (controller, gate) = gated_controller(test_config());
    let id = controller.start_execution(gated_chain(), json!(null)).unwrap();

    wait_until(Duration::from_secs(5), "gate node to start", || {
        controller
            .get_status(&id)
            .unwrap()
            .steps
            .iter()
            .any(|s| s.node_id == "gate" && s.status == StepStatus::Running)
    })
    .await;

    controller.cancel(&id).unwrap();
    gate.release();

    wait_until(Duration::from_secs(5), "run to cancel", || {
        controller.get_status(&id).unwrap().status.is_terminal()
    })
    .await;

    let snapshot = controller.get_status(&id).unwrap();
    assert_eq!(snapshot.status, ExecutionStatus::Cancelled);
    let step = |node: &str| {
        snapshot
            .steps
            .iter()
            .find(|s| s.node_id == node)
            .unwrap()
            .status
    };
    // The in-flight node ran to completion; its dependent never started.
    assert_eq!(step("gate"), StepStatus::Completed);
    assert_eq!(step("after"), StepStatus::Skipped);
}

#[tokio::test]
async fn node_timeout_fails_the_step_and_the_run() {
    let controller = test_controller(
        test_config().with_node_timeout(Duration::from_millis(50)),
        |handlers| {
            handlers.register(
                "task",
                Arc::new(SleepHandler {
                    duration: Duration::from_secs(30),
                }),
            );
        },
    );

    let id = controller.start_execution(linear_chain(), json!(null)).unwrap();
    wait_until(Duration::from_secs(5), "run to fail", || {
        controller.get_status(&id).unwrap().status.is_terminal()
    })
    .await;

    let snapshot = controller.get_status(&id).unwrap();
    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    let a = snapshot.steps.iter().find(|s| s.node_id == "a").unwrap();
    assert_eq!(a.status, StepStatus::Failed);
    assert!(a.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn run_timeout_resolves_the_run_failed() {
    // The gate never releases; the node timeout drains the in-flight step
    // after the run deadline has already passed.
    let (controller, _gate) = gated_controller(
        test_config()
            .with_node_timeout(Duration::from_millis(300))
            .with_run_timeout(Duration::from_millis(100)),
    );
    let id = controller.start_execution(gated_chain(), json!(null)).unwrap();

    wait_until(Duration::from_secs(5), "run to time out", || {
        controller.get_status(&id).unwrap().status.is_terminal()
    })
    .await;

    let snapshot = controller.get_status(&id).unwrap();
    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    assert_eq!(snapshot.error.as_deref(), Some("execution timed out"));
}

#[tokio::test]
async fn run_table_tracks_active_runs_and_rejects_unknown_ids() {
    let (controller, gate) = gated_controller(test_config());
    assert!(controller.list_active().is_empty());

    let id = controller.start_execution(gated_chain(), json!(null)).unwrap();
    wait_until(Duration::from_secs(5), "run to appear active", || {
        controller.list_active().len() == 1
    })
    .await;
    assert_eq!(controller.list_active()[0].execution_id, id);

    gate.release();
    wait_until(Duration::from_secs(5), "run to complete", || {
        controller.get_status(&id).unwrap().status.is_terminal()
    })
    .await;
    // Terminal runs stay queryable but are no longer active.
    assert!(controller.list_active().is_empty());
    assert!(controller.get_status(&id).is_ok());

    let err = controller.get_status("no-such-id").unwrap_err();
    assert!(matches!(err, ControllerError::ExecutionNotFound { .. }));
}

#[tokio::test]
async fn pause_and_resume_require_matching_state() {
    let (controller, gate) = gated_controller(test_config());
    let id = controller.start_execution(gated_chain(), json!(null)).unwrap();

    wait_until(Duration::from_secs(5), "run to start", || {
        controller.get_status(&id).unwrap().status == ExecutionStatus::Running
    })
    .await;

    // Resuming a running execution is a state error.
    assert!(matches!(
        controller.resume(&id).unwrap_err(),
        ControllerError::InvalidState {
            status: ExecutionStatus::Running,
            ..
        }
    ));

    controller.pause(&id).unwrap();
    wait_until(Duration::from_secs(5), "run to pause", || {
        controller.get_status(&id).unwrap().status == ExecutionStatus::Paused
    })
    .await;
    // Pausing twice is likewise rejected.
    assert!(matches!(
        controller.pause(&id).unwrap_err(),
        ControllerError::InvalidState {
            status: ExecutionStatus::Paused,
            ..
        }
    ));

    controller.resume(&id).unwrap();
    gate.release();
    wait_until(Duration::from_secs(5), "run to complete", || {
        controller.get_status(&id).unwrap().status.is_terminal()
    })
    .await;
    assert_eq!(
        controller.get_status(&id).unwrap().status,
        ExecutionStatus::Completed
    );
}

#[tokio::test]
async fn control_commands_on_terminal_runs_are_invalid() {
    let controller = test_controller(test_config(), |handlers| {
        handlers.register("task", Arc::new(EchoHandler::new()));
    });
    let id = controller.start_execution(linear_chain(), json!(null)).unwrap();
    wait_until(Duration::from_secs(5), "run to complete", || {
        controller.get_status(&id).unwrap().status.is_terminal()
    })
    .await;

    for result in [
        controller.pause(&id),
        controller.resume(&id),
        controller.cancel(&id),
    ] {
        assert!(matches!(
            result.unwrap_err(),
            ControllerError::InvalidState {
                status: ExecutionStatus::Completed,
                ..
            }
        ));
    }
}

#[tokio::test]
async fn logs_are_merged_and_paginated() {
    let controller = test_controller(test_config(), |handlers| {
        handlers.register("task", Arc::new(EchoHandler::new()));
    });
    let id = controller.start_execution(linear_chain(), json!(null)).unwrap();
    wait_until(Duration::from_secs(5), "run to complete", || {
        controller.get_status(&id).unwrap().status.is_terminal()
    })
    .await;

    let all = controller.get_logs(&id, 0, usize::MAX).unwrap();
    // At least: run start, per-step start/finish lines, run finish.
    assert!(all.len() >= 8, "expected merged logs, got {}", all.len());
    assert!(all.windows(2).all(|w| w[0].entry.timestamp <= w[1].entry.timestamp));
    assert!(all.iter().any(|r| r.node_id.is_none()));
    assert!(all.iter().any(|r| r.node_id.as_deref() == Some("b")));

    let page = controller.get_logs(&id, 2, 3).unwrap();
    assert_eq!(page.len(), 3);
    assert_eq!(
        serde_json::to_value(&page[0]).unwrap()["message"],
        serde_json::to_value(&all[2]).unwrap()["message"]
    );

    assert!(controller.get_logs(&id, all.len(), 10).unwrap().is_empty());
}

#[tokio::test]
async fn node_preview_runs_one_handler_in_isolation() {
    // Built-in catalog and handlers.
    let controller = ExecutionController::new(test_config());

    let node = WorkflowNode::new("preview", "url_input", "Preview")
        .with_config("url", json!("https://example.com"));
    let value = controller
        .execute_node_preview(&node, json!(null))
        .await
        .unwrap();
    assert_eq!(value["url"], json!("https://example.com"));

    // Preview input stands in for upstream results.
    let scraper = WorkflowNode::new("preview", "web_scraper", "Preview");
    let value = controller
        .execute_node_preview(&scraper, json!({"target_url": "https://example.com"}))
        .await
        .unwrap();
    assert_eq!(value["source_url"], json!("https://example.com"));

    let bad = WorkflowNode::new("preview", "url_input", "Preview")
        .with_config("url", json!("not-a-url"));
    let err = controller
        .execute_node_preview(&bad, json!(null))
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::PreviewFailed(_)));
}
