//! Workflow definition fixtures shared across integration tests.

use flowgrid::workflow::{Connection, WorkflowDefinition, WorkflowNode};

pub fn task(node_id: &str) -> WorkflowNode {
    WorkflowNode::new(node_id, "task", node_id)
}

/// `a -> b -> c`, all critical tasks.
pub fn linear_chain() -> WorkflowDefinition {
    WorkflowDefinition::new("wf-chain", "linear chain")
        .with_node(task("a"))
        .with_node(task("b"))
        .with_node(task("c"))
        .with_connection(Connection::new("c1", "a", "b"))
        .with_connection(Connection::new("c2", "b", "c"))
}

/// Diamond: `a` fans out to `b` and `c`, both feed `d` under distinct input
/// keys so the join sees one value per parent.
pub fn diamond() -> WorkflowDefinition {
    WorkflowDefinition::new("wf-diamond", "diamond")
        .with_node(task("a"))
        .with_node(task("b"))
        .with_node(task("c"))
        .with_node(task("d"))
        .with_connection(Connection::new("c1", "a", "b"))
        .with_connection(Connection::new("c2", "a", "c"))
        .with_connection(Connection::new("c3", "b", "d").with_target_input("from_b"))
        .with_connection(Connection::new("c4", "c", "d").with_target_input("from_c"))
}

/// `gate -> after`, where the gate node blocks until released.
pub fn gated_chain() -> WorkflowDefinition {
    WorkflowDefinition::new("wf-gated", "gated chain")
        .with_node(WorkflowNode::new("gate", "gate", "gate"))
        .with_node(task("after"))
        .with_connection(Connection::new("c1", "gate", "after"))
}
