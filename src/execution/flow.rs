//! Synchronous Flows
//!
//! A flow owns a graph of runnables and drives it from the start node:
//! run the current node, look its action up in the node's transition
//! table, move to the successor, and stop when nothing matches.
//!
//! Cycles are followed without an iteration bound. Loops that must end
//! keep a counter in the shared store and return an unmatched action.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use stepgraph::execution::{Flow, FnStep, Node, Runnable};
//! use stepgraph::workflow::SharedStore;
//!
//! let mut builder = Flow::builder("greeting");
//! let hello = builder.add(Node::new(
//!     "hello",
//!     FnStep::new(|_| Ok(json!("Hello")))
//!         .with_post(|store, _, out| { store.insert_value("greeting", out.clone()); Ok(None) }),
//! ));
//! let shout = builder.add(Node::new(
//!     "shout",
//!     FnStep::new(|g| Ok(json!(format!("{}!", g.as_str().unwrap_or_default()))))
//!         .with_prepare(|store| Ok(store.get_value("greeting").cloned().unwrap_or_default()))
//!         .with_post(|store, _, out| { store.insert_value("greeting", out.clone()); Ok(None) }),
//! ));
//! builder.connect(hello, shout).start(hello);
//! let flow = builder.build().unwrap();
//!
//! let mut store = SharedStore::new();
//! flow.run(&mut store).unwrap();
//! assert_eq!(store.get::<String>("greeting").unwrap(), "Hello!");
//! ```

use log::{debug, info};

use crate::error::Result;
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::{Action, EdgePolicy, Graph, GraphBuilder, NodeId, SharedStore};

use super::step::Runnable;

/// A graph of runnables driven over one shared store.
pub struct Flow {
    graph: Graph<Box<dyn Runnable>>,
}

impl Flow {
    pub fn builder(name: impl Into<String>) -> FlowBuilder {
        FlowBuilder {
            graph: GraphBuilder::new(name),
        }
    }

    pub fn graph(&self) -> &Graph<Box<dyn Runnable>> {
        &self.graph
    }

    /// Runs the flow and records every step visit in `timeline`.
    pub fn run_traced(&self, store: &mut SharedStore, timeline: &mut ExecutionTimeline) -> Result<Option<Action>> {
        self.orchestrate(store, Some(timeline))
    }

    fn orchestrate(
        &self,
        store: &mut SharedStore,
        mut timeline: Option<&mut ExecutionTimeline>,
    ) -> Result<Option<Action>> {
        info!("Starting flow '{}'", self.graph.name());

        let mut current = Some(self.graph.start());
        let mut last_action = None;
        let mut visits = 0usize;

        while let Some(id) = current {
            let Some(node) = self.graph.node(id) else {
                break;
            };
            visits += 1;

            if let Some(t) = timeline.as_deref_mut() {
                t.add_event(node.name(), EventType::Started);
            }

            let outcome = node.run(store);

            if let Some(t) = timeline.as_deref_mut() {
                let event = if outcome.is_ok() { EventType::Completed } else { EventType::Failed };
                t.add_event(node.name(), event);
            }

            let action = outcome?;
            debug!(
                "Step '{}' returned action '{}'",
                node.name(),
                Action::resolve(action.as_ref())
            );

            current = self.graph.next(id, action.as_ref());
            last_action = action;
        }

        info!(
            "Flow '{}' finished after {} step visit(s)",
            self.graph.name(),
            visits
        );
        Ok(last_action)
    }
}

impl Runnable for Flow {
    fn name(&self) -> &str {
        self.graph.name()
    }

    /// Drives the graph to completion and returns the last step's action,
    /// which becomes this flow's action inside an enclosing flow.
    fn run(&self, store: &mut SharedStore) -> Result<Option<Action>> {
        self.orchestrate(store, None)
    }
}

/// Wires runnables into a [`Flow`].
pub struct FlowBuilder {
    graph: GraphBuilder<Box<dyn Runnable>>,
}

impl FlowBuilder {
    pub fn edge_policy(&mut self, policy: EdgePolicy) -> &mut Self {
        self.graph.edge_policy(policy);
        self
    }

    /// Adds a step, batch step, or nested flow.
    pub fn add<R: Runnable + 'static>(&mut self, node: R) -> NodeId {
        let name = node.name().to_string();
        self.graph.add(name, Box::new(node))
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> &mut Self {
        self.graph.connect(from, to);
        self
    }

    pub fn connect_on(&mut self, from: NodeId, action: impl Into<Action>, to: NodeId) -> &mut Self {
        self.graph.connect_on(from, action, to);
        self
    }

    pub fn start(&mut self, id: NodeId) -> &mut Self {
        self.graph.start(id);
        self
    }

    pub fn build(self) -> Result<Flow> {
        Ok(Flow {
            graph: self.graph.build()?,
        })
    }
}
