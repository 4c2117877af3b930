#![allow(dead_code)]

pub mod fixtures;
pub mod handlers;

pub use fixtures::*;
pub use handlers::*;

use std::time::Duration;

use flowgrid::config::EngineConfig;
use flowgrid::controller::ExecutionController;
use flowgrid::handlers::HandlerRegistry;
use flowgrid::registry::{NodeCategory, NodeTypeDefinition, NodeTypeRegistry};
use std::sync::Arc;

/// Registry with a minimal set of test node types: `task` (critical, the
/// default), `optional_task` (non-critical), and `gate` (critical, used with
/// a blocking handler in run-control tests).
pub fn test_registry() -> NodeTypeRegistry {
    let mut registry = NodeTypeRegistry::new();
    registry.register_category(NodeCategory::new("test", "Test", "test nodes", 1));
    registry.register_type(NodeTypeDefinition::new("task", "Task", "generic task", "test"));
    registry.register_type(
        NodeTypeDefinition::new("optional_task", "Optional Task", "best-effort task", "test")
            .non_critical(),
    );
    registry.register_type(NodeTypeDefinition::new("gate", "Gate", "blocks until released", "test"));
    registry
}

/// Engine config tuned for fast tests: tight timeouts, short retention.
pub fn test_config() -> EngineConfig {
    EngineConfig::default()
        .with_node_timeout(Duration::from_secs(5))
        .with_retention_window(Duration::from_secs(60))
}

/// Controller over [`test_registry`] with handlers installed by `setup`.
pub fn test_controller(
    config: EngineConfig,
    setup: impl FnOnce(&mut HandlerRegistry),
) -> ExecutionController {
    let mut handlers = HandlerRegistry::new();
    setup(&mut handlers);
    ExecutionController::with_components(Arc::new(test_registry()), Arc::new(handlers), config)
}

/// Poll `probe` every few milliseconds until it returns true or `timeout`
/// elapses. Panics on timeout with `what` in the message.
pub async fn wait_until(timeout: Duration, what: &str, mut probe: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !probe() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
