//! Transition Graph
//!
//! Nodes live in an arena owned by the graph and are addressed by
//! [`NodeId`]. Each node carries its own transition table mapping an
//! [`Action`] to a successor, so cycles and self-loops need no shared
//! ownership.
//!
//! # Example
//!
//! ```
//! use stepgraph::workflow::{Action, GraphBuilder};
//!
//! let mut builder = GraphBuilder::new("review");
//! let review = builder.add("review", ());
//! let approve = builder.add("approve", ());
//! let reject = builder.add("reject", ());
//! builder
//!     .connect_on(review, "approve", approve)
//!     .connect_on(review, "reject", reject)
//!     .start(review);
//!
//! let graph = builder.build().unwrap();
//! assert_eq!(graph.next(review, Some(&Action::from("reject"))), Some(reject));
//! assert_eq!(graph.next(review, None), None);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

use super::action::Action;
use super::validator::validate_graph;

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a node inside the graph that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    graph: u64,
    index: usize,
}

impl NodeId {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// What to do when a node already has an edge for an action key.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolicy {
    /// Replace the existing edge and log a warning
    #[default]
    Overwrite,
    /// Fail the build with [`GraphError::DuplicateTransition`]
    Reject,
}

pub(crate) struct GraphNode<N> {
    pub(crate) name: String,
    pub(crate) node: N,
    pub(crate) successors: HashMap<Action, NodeId>,
}

/// A built, immutable transition graph.
pub struct Graph<N> {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) nodes: Vec<GraphNode<N>>,
    pub(crate) start: NodeId,
}

impl<N> Graph<N> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the node behind `id`, or `None` for an id from another graph.
    pub fn node(&self, id: NodeId) -> Option<&N> {
        self.slot(id).map(|n| &n.node)
    }

    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.slot(id).map(|n| n.name.as_str())
    }

    /// Returns the transition table of a node.
    pub fn successors(&self, id: NodeId) -> Option<&HashMap<Action, NodeId>> {
        self.slot(id).map(|n| &n.successors)
    }

    /// Resolves the successor for an action returned by `post`.
    ///
    /// `None` and empty actions select the default edge. Any other action
    /// selects only the edge registered under that exact key. No match
    /// ends the run at this node.
    pub fn next(&self, from: NodeId, action: Option<&Action>) -> Option<NodeId> {
        let slot = self.slot(from)?;
        let key = Action::resolve(action);

        match slot.successors.get(&key) {
            Some(next) => Some(*next),
            None => {
                if !slot.successors.is_empty() {
                    let mut known: Vec<&str> = slot.successors.keys().map(Action::as_str).collect();
                    known.sort_unstable();
                    warn!(
                        "Flow '{}' ends at '{}': action '{}' not found in {:?}",
                        self.name, slot.name, key, known
                    );
                }
                None
            }
        }
    }

    fn slot(&self, id: NodeId) -> Option<&GraphNode<N>> {
        if id.graph != self.id {
            return None;
        }
        self.nodes.get(id.index)
    }
}

/// Build-time surface for wiring nodes together.
pub struct GraphBuilder<N> {
    id: u64,
    name: String,
    nodes: Vec<GraphNode<N>>,
    start: Option<NodeId>,
    policy: EdgePolicy,
    errors: Vec<GraphError>,
}

impl<N> GraphBuilder<N> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            nodes: Vec::new(),
            start: None,
            policy: EdgePolicy::default(),
            errors: Vec::new(),
        }
    }

    /// Sets how duplicate action keys are handled.
    pub fn edge_policy(&mut self, policy: EdgePolicy) -> &mut Self {
        self.policy = policy;
        self
    }

    /// Adds a node and returns its handle.
    pub fn add(&mut self, name: impl Into<String>, node: N) -> NodeId {
        let id = NodeId {
            graph: self.id,
            index: self.nodes.len(),
        };
        self.nodes.push(GraphNode {
            name: name.into(),
            node,
            successors: HashMap::new(),
        });
        id
    }

    /// Adds an unconditional edge, taken when `post` returns no action.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> &mut Self {
        self.connect_on(from, Action::DEFAULT, to)
    }

    /// Adds an edge taken when `post` returns exactly `action`.
    pub fn connect_on(&mut self, from: NodeId, action: impl Into<Action>, to: NodeId) -> &mut Self {
        let action = Action::resolve(Some(&action.into()));

        for id in [from, to] {
            if !self.owns(id) {
                self.errors.push(GraphError::UnknownNode {
                    graph: self.name.clone(),
                    id: id.index,
                });
                return self;
            }
        }

        let policy = self.policy;
        let slot = &mut self.nodes[from.index];
        if let Some(previous) = slot.successors.get(&action) {
            match policy {
                EdgePolicy::Overwrite => {
                    warn!(
                        "Overwriting successor of '{}' for action '{}' (was node {})",
                        slot.name, action, previous.index
                    );
                }
                EdgePolicy::Reject => {
                    self.errors.push(GraphError::DuplicateTransition {
                        node: slot.name.clone(),
                        action,
                    });
                    return self;
                }
            }
        }

        debug!("Edge '{}' -[{}]-> node {}", slot.name, action, to.index);
        slot.successors.insert(action, to);
        self
    }

    /// Sets the node traversal begins at.
    pub fn start(&mut self, id: NodeId) -> &mut Self {
        if self.owns(id) {
            self.start = Some(id);
        } else {
            self.errors.push(GraphError::UnknownNode {
                graph: self.name.clone(),
                id: id.index,
            });
        }
        self
    }

    /// Validates the wiring and freezes the graph.
    pub fn build(self) -> Result<Graph<N>, GraphError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let start = self
            .start
            .ok_or_else(|| GraphError::MissingStart(self.name.clone()))?;

        let graph = Graph {
            id: self.id,
            name: self.name,
            nodes: self.nodes,
            start,
        };
        validate_graph(&graph)?;
        Ok(graph)
    }

    fn owns(&self, id: NodeId) -> bool {
        id.graph == self.id && id.index < self.nodes.len()
    }
}
