//! Workflow Definition Module
//!
//! Data structures for building step graphs and sharing state between
//! steps.
//!
//! # Structure
//!
//! - [`action`]: Action keys that select transitions
//! - [`store`]: The shared key-value store
//! - [`graph`]: Transition tables and the graph builder
//! - [`validator`]: Checks run when a graph is built
//! - [`config`]: Engine configuration loaded from YAML

pub mod action;
pub mod config;
pub mod graph;
pub mod store;
pub mod validator;

pub use action::Action;
pub use config::{load_config, parse_config, EngineConfig};
pub use graph::{EdgePolicy, Graph, GraphBuilder, NodeId};
pub use store::SharedStore;
pub use validator::{reachable_nodes, validate_graph};
