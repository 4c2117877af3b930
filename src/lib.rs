//! # Flowgrid: typed-node workflow execution engine
//!
//! Flowgrid executes workflow graphs made of typed nodes: a workflow
//! definition names its nodes and the data connections between them, the
//! engine validates the graph, then runs nodes concurrently in dependency
//! order while streaming status events to any number of subscribers.
//!
//! ## Core Concepts
//!
//! - **Node types**: static definitions (ports, config schema, category) in
//!   a [`registry::NodeTypeRegistry`]
//! - **Handlers**: the executable side, one [`handlers::NodeHandler`] per
//!   node type, dispatched through a [`handlers::HandlerRegistry`]
//! - **Graph**: [`graph::ExecutionGraph::build`] validates a definition
//!   (cycles, dangling connections, missing config) before anything runs
//! - **Controller**: [`controller::ExecutionController`] starts runs and
//!   exposes pause/resume/cancel, status snapshots, logs, and event streams
//!
//! ## Quick Start
//!
//! ### Defining a Workflow
//!
//! ```
//! use flowgrid::workflow::{Connection, WorkflowDefinition, WorkflowNode};
//! use serde_json::json;
//!
//! let workflow = WorkflowDefinition::new("wf-1", "scrape and notify")
//!     .with_node(
//!         WorkflowNode::new("source", "url_input", "Source URL")
//!             .with_config("url", json!("https://example.com")),
//!     )
//!     .with_node(WorkflowNode::new("scrape", "web_scraper", "Scrape"))
//!     .with_node(WorkflowNode::new("notify", "notification", "Notify"))
//!     .with_connection(Connection::new("c1", "source", "scrape").with_target_input("target_url"))
//!     .with_connection(Connection::new("c2", "scrape", "notify").with_target_input("message"));
//!
//! assert_eq!(workflow.nodes.len(), 3);
//! ```
//!
//! ### Running It
//!
//! ```rust,no_run
//! use flowgrid::config::EngineConfig;
//! use flowgrid::controller::ExecutionController;
//! # use flowgrid::workflow::WorkflowDefinition;
//! # async fn example(workflow: WorkflowDefinition) -> miette::Result<()> {
//!
//! let controller = ExecutionController::new(EngineConfig::from_env());
//! let execution_id = controller.start_execution(workflow, serde_json::json!(null))?;
//!
//! // Follow the run live; the stream ends after the terminal event.
//! let mut events = controller.subscribe(&execution_id)?;
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//!
//! let snapshot = controller.get_status(&execution_id)?;
//! println!("finished: {} ({}%)", snapshot.status, snapshot.progress);
//! # Ok(())
//! # }
//! ```
//!
//! ### Browsing the Catalog
//!
//! ```
//! use flowgrid::registry::NodeTypeRegistry;
//!
//! let registry = NodeTypeRegistry::with_builtin_catalog();
//! for def in registry.search("scraping") {
//!     println!("{}: {}", def.id, def.description);
//! }
//! ```

pub mod config;
pub mod context;
pub mod controller;
pub mod events;
pub mod graph;
pub mod handlers;
pub mod registry;
pub mod runner;
pub mod telemetry;
pub mod types;
pub mod workflow;

pub use config::EngineConfig;
pub use controller::{ControllerError, ExecutionController};
pub use types::{ExecutionStatus, StepStatus};
pub use workflow::WorkflowDefinition;
