//! Node handler framework: the executable side of node types.
//!
//! A [`NodeHandler`] implements the behavior of one node type. Handlers are
//! stateless and deterministic over their inputs; per-run state lives in
//! [`ExecutionContext`](crate::context::ExecutionContext), never in the
//! handler. The [`HandlerRegistry`] is a dispatch table from node type id to
//! handler; an unregistered type falls back to [`PassthroughHandler`], so
//! new node types degrade gracefully instead of failing the run.
//!
//! # Error Handling
//!
//! Handlers signal failure by returning `Err(HandlerError)`. The execution
//! loop decides the consequence (critical vs non-critical policy); a handler
//! never terminates the run by itself.

mod builtin;

pub use builtin::register_builtin_handlers;

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors a handler can return. All variants are step-level: the execution
/// loop maps them onto the failing step, not onto the run directly.
#[derive(Debug, Error, Diagnostic)]
pub enum HandlerError {
    /// A required input key was absent from the gathered input map.
    #[error("missing expected input: {key}")]
    #[diagnostic(
        code(flowgrid::handlers::missing_input),
        help("Check that an upstream connection supplies this input key.")
    )]
    MissingInput { key: &'static str },

    /// A config value was absent or had the wrong shape.
    #[error("invalid config for key {key}: {message}")]
    #[diagnostic(
        code(flowgrid::handlers::invalid_config),
        help("Check the node's config against its type's config field schema.")
    )]
    InvalidConfig { key: &'static str, message: String },

    /// JSON (de)serialization error inside a handler.
    #[error(transparent)]
    #[diagnostic(code(flowgrid::handlers::serde_json))]
    Serde(#[from] serde_json::Error),

    /// The handler's own logic failed.
    #[error("{0}")]
    #[diagnostic(code(flowgrid::handlers::failed))]
    Failed(String),
}

/// Inputs handed to a handler at dispatch: the node's static config plus the
/// input map gathered from completed upstream steps.
#[derive(Clone, Debug, Default)]
pub struct HandlerInput {
    pub node_id: String,
    pub config: FxHashMap<String, Value>,
    pub inputs: FxHashMap<String, Value>,
}

impl HandlerInput {
    /// Config value for `key` as a string, if present.
    #[must_use]
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Config value for `key`, falling back to `default` when absent.
    #[must_use]
    pub fn config_str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.config_str(key).unwrap_or(default)
    }

    /// First input value, preferring the conventional "input" key.
    #[must_use]
    pub fn primary_input(&self) -> Option<&Value> {
        self.inputs
            .get(crate::workflow::DEFAULT_INPUT_HANDLE)
            .or_else(|| self.inputs.values().next())
    }
}

/// Executable behavior of one node type.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Run the node. The returned value is recorded as the step result and
    /// feeds downstream input gathering.
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError>;
}

/// Fallback handler: echoes its inputs under the conventional result key.
/// Registered as the default so unknown node types pass data through
/// unchanged rather than failing the run.
#[derive(Debug, Default)]
pub struct PassthroughHandler;

#[async_trait]
impl NodeHandler for PassthroughHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let passed: Value = match input.primary_input() {
            Some(value) => value.clone(),
            None => Value::Null,
        };
        Ok(json!({ "result": passed, "passthrough": true }))
    }
}

/// Dispatch table from node type id to handler.
pub struct HandlerRegistry {
    handlers: FxHashMap<String, Arc<dyn NodeHandler>>,
    fallback: Arc<dyn NodeHandler>,
}

impl HandlerRegistry {
    /// Empty table with [`PassthroughHandler`] as fallback.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: FxHashMap::default(),
            fallback: Arc::new(PassthroughHandler),
        }
    }

    /// Table pre-populated with the built-in handlers.
    #[must_use]
    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::new();
        register_builtin_handlers(&mut registry);
        registry
    }

    /// Register (or replace) the handler for a node type id.
    pub fn register(&mut self, node_type_id: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type_id.into(), handler);
    }

    /// Replace the fallback used for unregistered type ids.
    pub fn set_fallback(&mut self, handler: Arc<dyn NodeHandler>) {
        self.fallback = handler;
    }

    /// Resolve the handler for a node type id, falling back when absent.
    #[must_use]
    pub fn resolve(&self, node_type_id: &str) -> Arc<dyn NodeHandler> {
        self.handlers
            .get(node_type_id)
            .map_or_else(|| Arc::clone(&self.fallback), Arc::clone)
    }

    /// Whether a dedicated (non-fallback) handler exists for this type.
    #[must_use]
    pub fn has_handler(&self, node_type_id: &str) -> bool {
        self.handlers.contains_key(node_type_id)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passthrough_echoes_primary_input() {
        let handler = PassthroughHandler;
        let mut inputs = FxHashMap::default();
        inputs.insert("input".to_string(), json!({"k": 1}));
        let out = handler
            .handle(HandlerInput {
                node_id: "n".into(),
                config: FxHashMap::default(),
                inputs,
            })
            .await
            .unwrap();
        assert_eq!(out["result"], json!({"k": 1}));
        assert_eq!(out["passthrough"], json!(true));
    }

    #[tokio::test]
    async fn unregistered_type_resolves_to_fallback() {
        let registry = HandlerRegistry::new();
        let handler = registry.resolve("mystery_type");
        let out = handler.handle(HandlerInput::default()).await.unwrap();
        assert_eq!(out["passthrough"], json!(true));
        assert!(!registry.has_handler("mystery_type"));
    }

    #[tokio::test]
    async fn registered_handler_wins_over_fallback() {
        struct Fixed;
        #[async_trait]
        impl NodeHandler for Fixed {
            async fn handle(&self, _input: HandlerInput) -> Result<Value, HandlerError> {
                Ok(json!({"result": "fixed"}))
            }
        }

        let mut registry = HandlerRegistry::new();
        registry.register("fixed", Arc::new(Fixed));
        let out = registry
            .resolve("fixed")
            .handle(HandlerInput::default())
            .await
            .unwrap();
        assert_eq!(out["result"], json!("fixed"));
    }
}
