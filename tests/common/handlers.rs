//! Test handlers: deterministic, observable stand-ins for real node logic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowgrid::handlers::{HandlerError, HandlerInput, NodeHandler};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

/// Records every invocation (node id plus gathered inputs, in completion
/// order) and returns `{"result": "<node_id>-output"}`.
#[derive(Clone, Default)]
pub struct EchoHandler {
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl EchoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node ids in the order their handlers ran.
    pub fn order(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    /// The input map the handler for `node_id` received, if it ran.
    pub fn inputs_of(&self, node_id: &str) -> Option<Value> {
        self.calls
            .lock()
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, inputs)| inputs.clone())
    }
}

#[async_trait]
impl NodeHandler for EchoHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let inputs = serde_json::to_value(
            input
                .inputs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<std::collections::BTreeMap<_, _>>(),
        )?;
        self.calls.lock().push((input.node_id.clone(), inputs));
        Ok(json!({ "result": format!("{}-output", input.node_id) }))
    }
}

/// Blocks until [`GateHandler::release`] is called, then succeeds. Used to
/// hold a node in flight while a test issues control commands.
#[derive(Clone, Default)]
pub struct GateHandler {
    notify: Arc<Notify>,
}

impl GateHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let one pending (or the next) invocation through.
    pub fn release(&self) {
        self.notify.notify_one();
    }
}

#[async_trait]
impl NodeHandler for GateHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        self.notify.notified().await;
        Ok(json!({ "result": format!("{}-output", input.node_id) }))
    }
}

/// Sleeps for a fixed duration before succeeding.
pub struct SleepHandler {
    pub duration: Duration,
}

#[async_trait]
impl NodeHandler for SleepHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        tokio::time::sleep(self.duration).await;
        Ok(json!({ "result": format!("{}-output", input.node_id) }))
    }
}

/// Always fails with a fixed message.
pub struct FailHandler;

#[async_trait]
impl NodeHandler for FailHandler {
    async fn handle(&self, _input: HandlerInput) -> Result<Value, HandlerError> {
        Err(HandlerError::Failed("boom".to_string()))
    }
}
