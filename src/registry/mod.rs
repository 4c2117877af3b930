//! Node type registry: the static catalog of node type definitions.
//!
//! A [`NodeTypeDefinition`] describes what a node *is* — its ports, its
//! config field schema, its category — and carries no execution logic; the
//! executable behavior lives in [`crate::handlers`]. The registry is an
//! explicitly constructed instance handed to the
//! [`ExecutionController`](crate::controller::ExecutionController) at
//! startup, so tests can build isolated registries.
//!
//! Lookups never error: a missing type is signaled by `None`, because absent
//! types are an expected outcome during workflow validation.

mod catalog;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared input or output port on a node type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Handle id referenced by connections.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Advisory data type ("string", "number", "object", "array", "any").
    pub data_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl PortSpec {
    pub fn new(id: impl Into<String>, label: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data_type: data_type.into(),
            required: false,
            description: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// One entry in a node type's config field schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigFieldSpec {
    pub key: String,
    /// Field type ("string", "number", "boolean", "select", "json", "url").
    pub field_type: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
    /// Options for `select` fields.
    #[serde(default)]
    pub options: Vec<String>,
}

impl ConfigFieldSpec {
    pub fn new(key: impl Into<String>, field_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field_type: field_type.into(),
            label: label.into(),
            required: false,
            default_value: None,
            options: Vec::new(),
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    #[must_use]
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }
}

/// Immutable definition of a node type. Owned exclusively by the registry
/// once registered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeDefinition {
    /// Unique key; referenced by [`WorkflowNode::node_type_id`](crate::workflow::WorkflowNode).
    pub id: String,
    pub name: String,
    pub description: String,
    /// Category id; see [`NodeCategory`].
    pub category: String,
    #[serde(default)]
    pub inputs: Vec<PortSpec>,
    #[serde(default)]
    pub outputs: Vec<PortSpec>,
    #[serde(default)]
    pub config_fields: Vec<ConfigFieldSpec>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// When set, a failure of this node type is recorded but does not fail
    /// the whole run; dependents that do not require its output may proceed.
    #[serde(default)]
    pub non_critical: bool,
}

impl NodeTypeDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            category: category.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            config_fields: Vec::new(),
            tags: Vec::new(),
            non_critical: false,
        }
    }

    #[must_use]
    pub fn with_input(mut self, port: PortSpec) -> Self {
        self.inputs.push(port);
        self
    }

    #[must_use]
    pub fn with_output(mut self, port: PortSpec) -> Self {
        self.outputs.push(port);
        self
    }

    #[must_use]
    pub fn with_config_field(mut self, field: ConfigFieldSpec) -> Self {
        self.config_fields.push(field);
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn non_critical(mut self) -> Self {
        self.non_critical = true;
        self
    }
}

/// Category used to group node types in the editor palette.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCategory {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Display ordering; lower first.
    pub order: u32,
}

impl NodeCategory {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        order: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            order,
        }
    }
}

/// Registry of node type definitions and categories.
#[derive(Debug, Default)]
pub struct NodeTypeRegistry {
    node_types: FxHashMap<String, NodeTypeDefinition>,
    categories: FxHashMap<String, NodeCategory>,
}

impl NodeTypeRegistry {
    /// Create an empty registry with no types registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the built-in catalog.
    #[must_use]
    pub fn with_builtin_catalog() -> Self {
        let mut registry = Self::new();
        catalog::install(&mut registry);
        registry
    }

    /// Register (or overwrite) a node type definition by id. Visible to all
    /// subsequent lookups immediately; there is no versioning.
    pub fn register_type(&mut self, def: NodeTypeDefinition) {
        self.node_types.insert(def.id.clone(), def);
    }

    /// Register (or overwrite) a category by id.
    pub fn register_category(&mut self, category: NodeCategory) {
        self.categories.insert(category.id.clone(), category);
    }

    /// Look up a node type definition.
    #[must_use]
    pub fn get_type(&self, id: &str) -> Option<&NodeTypeDefinition> {
        self.node_types.get(id)
    }

    /// All definitions in a given category.
    #[must_use]
    pub fn list_by_category(&self, category_id: &str) -> Vec<&NodeTypeDefinition> {
        let mut defs: Vec<_> = self
            .node_types
            .values()
            .filter(|def| def.category == category_id)
            .collect();
        defs.sort_by(|a, b| a.id.cmp(&b.id));
        defs
    }

    /// All registered definitions, ordered by id for deterministic output.
    #[must_use]
    pub fn list_all(&self) -> Vec<&NodeTypeDefinition> {
        let mut defs: Vec<_> = self.node_types.values().collect();
        defs.sort_by(|a, b| a.id.cmp(&b.id));
        defs
    }

    /// Case-insensitive match against name, description, or tags.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&NodeTypeDefinition> {
        let query = query.to_lowercase();
        let mut results: Vec<_> = self
            .node_types
            .values()
            .filter(|def| {
                def.name.to_lowercase().contains(&query)
                    || def.description.to_lowercase().contains(&query)
                    || def.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));
        results
    }

    /// Category of a node type, if both the type and its category exist.
    #[must_use]
    pub fn get_category(&self, node_type_id: &str) -> Option<&NodeCategory> {
        let def = self.node_types.get(node_type_id)?;
        self.categories.get(&def.category)
    }

    /// All categories ordered by their declared display order.
    #[must_use]
    pub fn list_categories(&self) -> Vec<&NodeCategory> {
        let mut cats: Vec<_> = self.categories.values().collect();
        cats.sort_by_key(|c| c.order);
        cats
    }

    /// Whether a failure of this node type fails the whole run. Unknown
    /// types are treated as critical.
    #[must_use]
    pub fn is_critical(&self, node_type_id: &str) -> bool {
        self.node_types
            .get(node_type_id)
            .map_or(true, |def| !def.non_critical)
    }
}
