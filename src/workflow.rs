//! Workflow definition models consumed at the engine boundary.
//!
//! A [`WorkflowDefinition`] is the serialized form produced by the editor or
//! API layer: a list of configured nodes plus the directed, named data links
//! between them. The engine validates the definition ([`crate::graph`]) and
//! never mutates it.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conventional output handle used when a connection does not name one.
pub const DEFAULT_OUTPUT_HANDLE: &str = "result";

/// Conventional input handle used when a connection does not name one.
pub const DEFAULT_INPUT_HANDLE: &str = "input";

/// A configured unit of work inside a workflow graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique within a workflow.
    pub node_id: String,
    /// Must resolve in the [`NodeTypeRegistry`](crate::registry::NodeTypeRegistry).
    pub node_type_id: String,
    /// Display name; also used in log lines.
    pub name: String,
    /// Key→value map matching the node type's config field schema.
    #[serde(default)]
    pub config: FxHashMap<String, Value>,
}

impl WorkflowNode {
    pub fn new(
        node_id: impl Into<String>,
        node_type_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            node_type_id: node_type_id.into(),
            name: name.into(),
            config: FxHashMap::default(),
        }
    }

    /// Set a config value, consuming and returning the node for chaining.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// A directed, named data link from one node's output handle to another
/// node's input handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub connection_id: String,
    pub source_node_id: String,
    /// Output handle on the source node; `None` means the conventional
    /// [`DEFAULT_OUTPUT_HANDLE`].
    #[serde(default)]
    pub source_output: Option<String>,
    pub target_node_id: String,
    /// Input handle on the target node; `None` means the conventional
    /// [`DEFAULT_INPUT_HANDLE`].
    #[serde(default)]
    pub target_input: Option<String>,
}

impl Connection {
    pub fn new(
        connection_id: impl Into<String>,
        source_node_id: impl Into<String>,
        target_node_id: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            source_node_id: source_node_id.into(),
            source_output: None,
            target_node_id: target_node_id.into(),
            target_input: None,
        }
    }

    #[must_use]
    pub fn with_source_output(mut self, handle: impl Into<String>) -> Self {
        self.source_output = Some(handle.into());
        self
    }

    #[must_use]
    pub fn with_target_input(mut self, handle: impl Into<String>) -> Self {
        self.target_input = Some(handle.into());
        self
    }

    /// Output handle name, falling back to the conventional default.
    #[must_use]
    pub fn source_output(&self) -> &str {
        self.source_output.as_deref().unwrap_or(DEFAULT_OUTPUT_HANDLE)
    }

    /// Input handle name, falling back to the conventional default.
    #[must_use]
    pub fn target_input(&self) -> &str {
        self.target_input.as_deref().unwrap_or(DEFAULT_INPUT_HANDLE)
    }
}

/// A complete workflow definition: nodes plus connections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Stable identifier assigned by the surrounding service layer.
    pub workflow_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl WorkflowDefinition {
    pub fn new(workflow_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            name: name.into(),
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_node(mut self, node: WorkflowNode) -> Self {
        self.nodes.push(node);
        self
    }

    #[must_use]
    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }
}
