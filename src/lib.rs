//! StepGraph - Graph-Based Step Orchestration
//!
//! An embeddable engine that runs discrete units of work ("steps") along a
//! directed graph. After each step, the action it returns picks the next
//! edge, so branches and loops are decided at runtime rather than by fixed
//! control flow.
//!
//! # Architecture
//!
//! The library is organized into three main modules:
//!
//! - [`workflow`]: Shared store, action keys, graph construction, configuration
//! - [`execution`]: Step lifecycle with retry, batch variants, sync and async flows
//! - [`monitoring`]: Execution timeline for traced runs
//!
//! A flow is itself runnable, so a whole flow can be registered as one
//! node of another flow.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use stepgraph::execution::{Flow, FnStep, Node, Runnable};
//! use stepgraph::workflow::{Action, SharedStore};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut builder = Flow::builder("review");
//!     let review = builder.add(Node::new(
//!         "review",
//!         FnStep::new(|score| Ok(json!(score.as_i64().unwrap_or(0) >= 60)))
//!             .with_prepare(|store| Ok(store.get_value("score").cloned().unwrap_or_default()))
//!             .with_post(|_, _, passed| {
//!                 let action = if passed.as_bool() == Some(true) { "approve" } else { "reject" };
//!                 Ok(Some(Action::from(action)))
//!             }),
//!     ));
//!     let approve = builder.add(Node::new(
//!         "approve",
//!         FnStep::new(|_| Ok(json!("approved")))
//!             .with_post(|store, _, out| { store.insert_value("result", out.clone()); Ok(None) }),
//!     ));
//!     builder.connect_on(review, "approve", approve).start(review);
//!     let flow = builder.build()?;
//!
//!     let mut store = SharedStore::new();
//!     store.set("score", &80)?;
//!     flow.run(&mut store)?;
//!     assert_eq!(store.get::<String>("result")?, "approved");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use error::{ConfigError, FlowError, GraphError, StepError};
pub use execution::{AsyncFlow, Flow, Node, Runnable, Step};
pub use workflow::{Action, SharedStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "StepGraph";
