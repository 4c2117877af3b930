//! Execution graph construction and workflow validation.
//!
//! [`ExecutionGraph::build`] converts a [`WorkflowDefinition`] into the
//! read-only adjacency/in-degree view the execution loop runs over.
//! Validation is all-or-nothing: the whole definition is checked up front,
//! every problem found is reported (not just the first), and nothing ever
//! executes for a rejected workflow. Non-blocking findings (orphan nodes,
//! input-key collisions) surface as warnings alongside a valid graph.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use thiserror::Error;

use crate::registry::NodeTypeRegistry;
use crate::workflow::{Connection, WorkflowDefinition};

/// A single validation problem. A rejected workflow carries one or more.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    /// The same node_id appears more than once.
    DuplicateNodeId { node_id: String },
    /// A connection references a node_id absent from the node list.
    DanglingConnection {
        connection_id: String,
        missing_node_id: String,
    },
    /// A node references a type the registry does not know.
    UnknownNodeType {
        node_id: String,
        node_type_id: String,
    },
    /// A required config key (with no default) is missing from a node.
    MissingRequiredConfig { node_id: String, key: String },
    /// No node has zero incoming edges and the workflow has more than one node.
    NoEntryPoint,
    /// A back-edge was found during depth-first traversal.
    CircularDependency { cycle: Vec<String> },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNodeId { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::DanglingConnection {
                connection_id,
                missing_node_id,
            } => write!(
                f,
                "connection {connection_id} references unknown node {missing_node_id}"
            ),
            Self::UnknownNodeType {
                node_id,
                node_type_id,
            } => write!(f, "node {node_id} has unknown type {node_type_id}"),
            Self::MissingRequiredConfig { node_id, key } => {
                write!(f, "node {node_id} is missing required config key {key}")
            }
            Self::NoEntryPoint => write!(f, "workflow has no entry point (no trigger nodes)"),
            Self::CircularDependency { cycle } => {
                write!(f, "circular dependency: {}", cycle.join(" -> "))
            }
        }
    }
}

/// Non-blocking validation finding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// A node with no connections at all in a multi-node workflow.
    OrphanNode { node_id: String },
    /// Two connections write the same input key on the same target node;
    /// last-write-wins at runtime.
    InputKeyCollision {
        target_node_id: String,
        target_input: String,
        connection_ids: Vec<String>,
    },
}

/// Malformed workflow definition, raised before any node executes.
#[derive(Debug, Error, Diagnostic)]
#[error("workflow validation failed with {} issue(s)", issues.len())]
#[diagnostic(
    code(flowgrid::graph::validation),
    help("Fix every listed issue; validation reports all problems at once.")
)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationWarning>,
}

/// Read-only dependency view of a validated workflow, built once per run.
#[derive(Clone, Debug)]
pub struct ExecutionGraph {
    /// node_id → dependent node ids, in connection declaration order.
    adjacency: FxHashMap<String, Vec<String>>,
    /// node_id → distinct upstream node ids.
    upstream: FxHashMap<String, FxHashSet<String>>,
    /// Nodes with zero incoming edges, in definition order.
    triggers: Vec<String>,
    /// Warnings found during validation; informational only.
    warnings: Vec<ValidationWarning>,
}

impl ExecutionGraph {
    /// Validate a workflow definition and build its execution graph.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] carrying every issue found: duplicate node
    /// ids, dangling connections, unknown node types, missing required
    /// config, missing entry point, and cycles.
    pub fn build(
        workflow: &WorkflowDefinition,
        registry: &NodeTypeRegistry,
    ) -> Result<Self, ValidationError> {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        let mut seen = FxHashSet::default();
        for node in &workflow.nodes {
            if !seen.insert(node.node_id.as_str()) {
                issues.push(ValidationIssue::DuplicateNodeId {
                    node_id: node.node_id.clone(),
                });
            }
        }
        let node_ids: FxHashSet<&str> = workflow.nodes.iter().map(|n| n.node_id.as_str()).collect();

        for conn in &workflow.connections {
            for endpoint in [&conn.source_node_id, &conn.target_node_id] {
                if !node_ids.contains(endpoint.as_str()) {
                    issues.push(ValidationIssue::DanglingConnection {
                        connection_id: conn.connection_id.clone(),
                        missing_node_id: endpoint.clone(),
                    });
                }
            }
        }

        for node in &workflow.nodes {
            match registry.get_type(&node.node_type_id) {
                None => issues.push(ValidationIssue::UnknownNodeType {
                    node_id: node.node_id.clone(),
                    node_type_id: node.node_type_id.clone(),
                }),
                Some(def) => {
                    for field in &def.config_fields {
                        if field.required
                            && field.default_value.is_none()
                            && !node.config.contains_key(&field.key)
                        {
                            issues.push(ValidationIssue::MissingRequiredConfig {
                                node_id: node.node_id.clone(),
                                key: field.key.clone(),
                            });
                        }
                    }
                }
            }
        }

        // Adjacency and upstream sets only over connections whose endpoints
        // exist; dangling connections were already reported above.
        let mut adjacency: FxHashMap<String, Vec<String>> = FxHashMap::default();
        let mut upstream: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
        for node in &workflow.nodes {
            adjacency.entry(node.node_id.clone()).or_default();
            upstream.entry(node.node_id.clone()).or_default();
        }
        for conn in &workflow.connections {
            if !node_ids.contains(conn.source_node_id.as_str())
                || !node_ids.contains(conn.target_node_id.as_str())
            {
                continue;
            }
            adjacency
                .entry(conn.source_node_id.clone())
                .or_default()
                .push(conn.target_node_id.clone());
            upstream
                .entry(conn.target_node_id.clone())
                .or_default()
                .insert(conn.source_node_id.clone());
        }

        let triggers: Vec<String> = workflow
            .nodes
            .iter()
            .filter(|n| upstream.get(&n.node_id).is_some_and(FxHashSet::is_empty))
            .map(|n| n.node_id.clone())
            .collect();

        // A single-node workflow is a trivial graph even without triggers
        // (possible when validation already flagged its connections).
        if triggers.is_empty() && workflow.nodes.len() > 1 {
            issues.push(ValidationIssue::NoEntryPoint);
        }

        if let Some(cycle) = find_cycle(&adjacency, workflow) {
            issues.push(ValidationIssue::CircularDependency { cycle });
        }

        collect_warnings(workflow, &adjacency, &upstream, &mut warnings);

        if !issues.is_empty() {
            tracing::debug!(
                workflow_id = %workflow.workflow_id,
                issue_count = issues.len(),
                "workflow rejected at validation"
            );
            return Err(ValidationError { issues, warnings });
        }

        Ok(Self {
            adjacency,
            upstream,
            triggers,
            warnings,
        })
    }

    /// Dependents of a node, in connection declaration order.
    #[must_use]
    pub fn dependents(&self, node_id: &str) -> &[String] {
        self.adjacency.get(node_id).map_or(&[], Vec::as_slice)
    }

    /// Distinct upstream sources of a node.
    #[must_use]
    pub fn upstream(&self, node_id: &str) -> Option<&FxHashSet<String>> {
        self.upstream.get(node_id)
    }

    /// Number of distinct upstream nodes.
    #[must_use]
    pub fn in_degree(&self, node_id: &str) -> usize {
        self.upstream.get(node_id).map_or(0, FxHashSet::len)
    }

    /// Nodes with zero incoming edges, in definition order.
    #[must_use]
    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    /// Warnings recorded during validation.
    #[must_use]
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// Total node count.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }
}

/// Depth-first cycle search with an explicit recursion stack. Returns the
/// node ids along the first back-edge found, in traversal order.
fn find_cycle(
    adjacency: &FxHashMap<String, Vec<String>>,
    workflow: &WorkflowDefinition,
) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InStack,
        Done,
    }

    let mut marks: FxHashMap<&str, Mark> = adjacency
        .keys()
        .map(|k| (k.as_str(), Mark::Unvisited))
        .collect();

    fn visit<'a>(
        node: &'a str,
        adjacency: &'a FxHashMap<String, Vec<String>>,
        marks: &mut FxHashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        marks.insert(node, Mark::InStack);
        stack.push(node);
        if let Some(nexts) = adjacency.get(node) {
            for next in nexts {
                match marks.get(next.as_str()).copied() {
                    Some(Mark::InStack) => {
                        let start = stack.iter().position(|n| *n == next.as_str()).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[start..].iter().map(|s| (*s).to_string()).collect();
                        cycle.push(next.clone());
                        return Some(cycle);
                    }
                    Some(Mark::Unvisited) => {
                        if let Some(cycle) = visit(next, adjacency, marks, stack) {
                            return Some(cycle);
                        }
                    }
                    _ => {}
                }
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    // Iterate in definition order so reports are deterministic.
    let mut stack = Vec::new();
    for node in &workflow.nodes {
        if marks.get(node.node_id.as_str()).copied() == Some(Mark::Unvisited) {
            if let Some(cycle) = visit(node.node_id.as_str(), adjacency, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

fn collect_warnings(
    workflow: &WorkflowDefinition,
    adjacency: &FxHashMap<String, Vec<String>>,
    upstream: &FxHashMap<String, FxHashSet<String>>,
    warnings: &mut Vec<ValidationWarning>,
) {
    if workflow.nodes.len() > 1 {
        for node in &workflow.nodes {
            let isolated = adjacency
                .get(&node.node_id)
                .is_some_and(Vec::is_empty)
                && upstream.get(&node.node_id).is_some_and(FxHashSet::is_empty);
            if isolated {
                warnings.push(ValidationWarning::OrphanNode {
                    node_id: node.node_id.clone(),
                });
            }
        }
    }

    // Two connections feeding the same (target, input) key collide;
    // last-write-wins at runtime, but the author should know.
    let mut by_target_input: FxHashMap<(String, String), Vec<&Connection>> = FxHashMap::default();
    for conn in &workflow.connections {
        by_target_input
            .entry((conn.target_node_id.clone(), conn.target_input().to_string()))
            .or_default()
            .push(conn);
    }
    let mut collisions: Vec<_> = by_target_input
        .into_iter()
        .filter(|(_, conns)| conns.len() > 1)
        .collect();
    collisions.sort_by(|a, b| a.0.cmp(&b.0));
    for ((target_node_id, target_input), conns) in collisions {
        warnings.push(ValidationWarning::InputKeyCollision {
            target_node_id,
            target_input,
            connection_ids: conns.iter().map(|c| c.connection_id.clone()).collect(),
        });
    }
}
