//! Graph Validation
//!
//! Checks run when a graph is built:
//! - The start node belongs to the graph
//! - Every edge points at a node of the same graph
//! - Nodes unreachable from the start are reported
//!
//! Cycles are legal (loop and retry patterns rely on them) and are never
//! rejected.

use std::collections::{HashSet, VecDeque};

use log::{debug, info};

use crate::error::GraphError;

use super::graph::{Graph, NodeId};

/// Validates a freshly built graph.
pub fn validate_graph<N>(graph: &Graph<N>) -> Result<(), GraphError> {
    check_handle(graph, graph.start)?;

    for slot in &graph.nodes {
        for target in slot.successors.values() {
            check_handle(graph, *target)?;
        }
    }

    let reachable = reachable_nodes(graph);
    for (index, slot) in graph.nodes.iter().enumerate() {
        if !reachable.contains(&index) {
            debug!(
                "Node '{}' in flow '{}' is not reachable from the start node",
                slot.name, graph.name
            );
        }
    }

    info!(
        "Flow '{}' validated: {} nodes, {} reachable",
        graph.name,
        graph.nodes.len(),
        reachable.len()
    );
    Ok(())
}

/// Returns the indices of nodes reachable from the start node.
pub fn reachable_nodes<N>(graph: &Graph<N>) -> HashSet<usize> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([graph.start.index()]);

    while let Some(index) = queue.pop_front() {
        if !seen.insert(index) {
            continue;
        }
        if let Some(slot) = graph.nodes.get(index) {
            queue.extend(slot.successors.values().map(NodeId::index));
        }
    }

    seen
}

fn check_handle<N>(graph: &Graph<N>, id: NodeId) -> Result<(), GraphError> {
    if graph.node(id).is_some() {
        Ok(())
    } else {
        Err(GraphError::UnknownNode {
            graph: graph.name.clone(),
            id: id.index(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::graph::GraphBuilder;

    #[test]
    fn test_reachable_nodes_follows_all_actions() {
        let mut builder = GraphBuilder::new("g");
        let a = builder.add("a", ());
        let b = builder.add("b", ());
        let c = builder.add("c", ());
        let orphan = builder.add("orphan", ());
        builder.connect(a, b).connect_on(b, "x", c).start(a);
        let graph = builder.build().unwrap();

        let reachable = reachable_nodes(&graph);
        assert!(reachable.contains(&a.index()));
        assert!(reachable.contains(&c.index()));
        assert!(!reachable.contains(&orphan.index()));
    }

    #[test]
    fn test_cycle_is_valid() {
        let mut builder = GraphBuilder::new("cycle");
        let a = builder.add("a", ());
        let b = builder.add("b", ());
        builder.connect(a, b).connect_on(b, "again", a).start(a);
        let graph = builder.build().unwrap();

        assert!(validate_graph(&graph).is_ok());
        assert_eq!(reachable_nodes(&graph).len(), 2);
    }

    #[test]
    fn test_single_node_graph() {
        let mut builder = GraphBuilder::new("one");
        let only = builder.add("only", ());
        builder.start(only);
        let graph = builder.build().unwrap();

        assert_eq!(graph.len(), 1);
        assert_eq!(reachable_nodes(&graph).len(), 1);
    }
}
