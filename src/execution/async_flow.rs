//! Asynchronous Flows
//!
//! Same traversal as [`Flow`](super::Flow) over async runnables. Sync
//! runnables, including whole sync flows, can join an async flow through
//! [`AsyncFlowBuilder::add_blocking`]; they run inline on the current task.

use async_trait::async_trait;
use log::{debug, info};

use crate::error::Result;
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::{Action, EdgePolicy, Graph, GraphBuilder, NodeId, SharedStore};

use super::async_step::AsyncRunnable;
use super::step::Runnable;

/// A graph of async runnables driven over one shared store.
pub struct AsyncFlow {
    graph: Graph<Box<dyn AsyncRunnable>>,
}

impl AsyncFlow {
    pub fn builder(name: impl Into<String>) -> AsyncFlowBuilder {
        AsyncFlowBuilder {
            graph: GraphBuilder::new(name),
        }
    }

    pub fn graph(&self) -> &Graph<Box<dyn AsyncRunnable>> {
        &self.graph
    }

    /// Runs the flow and records every step visit in `timeline`.
    pub async fn run_traced(
        &self,
        store: &mut SharedStore,
        timeline: &mut ExecutionTimeline,
    ) -> Result<Option<Action>> {
        self.orchestrate(store, Some(timeline)).await
    }

    async fn orchestrate(
        &self,
        store: &mut SharedStore,
        mut timeline: Option<&mut ExecutionTimeline>,
    ) -> Result<Option<Action>> {
        info!("Starting async flow '{}'", self.graph.name());

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

            let outcome = node.run(store).await;

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
            "Async flow '{}' finished after {} step visit(s)",
            self.graph.name(),
            visits
        );
        Ok(last_action)
    }
}

#[async_trait]
impl AsyncRunnable for AsyncFlow {
    fn name(&self) -> &str {
        self.graph.name()
    }

    async fn run(&self, store: &mut SharedStore) -> Result<Option<Action>> {
        self.orchestrate(store, None).await
    }
}

/// Runs a sync runnable inside an async flow.
struct Blocking(Box<dyn Runnable>);

#[async_trait]
impl AsyncRunnable for Blocking {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn run(&self, store: &mut SharedStore) -> Result<Option<Action>> {
        self.0.run(store)
    }
}

/// Wires async runnables into an [`AsyncFlow`].
pub struct AsyncFlowBuilder {
    graph: GraphBuilder<Box<dyn AsyncRunnable>>,
}

impl AsyncFlowBuilder {
    pub fn edge_policy(&mut self, policy: EdgePolicy) -> &mut Self {
        self.graph.edge_policy(policy);
        self
    }

    /// Adds an async step, async batch step, or nested async flow.
    pub fn add<R: AsyncRunnable + 'static>(&mut self, node: R) -> NodeId {
        let name = node.name().to_string();
        self.graph.add(name, Box::new(node))
    }

    /// Adds a sync step or flow. Its retry waits block the current thread.
    pub fn add_blocking<R: Runnable + 'static>(&mut self, node: R) -> NodeId {
        let name = node.name().to_string();
        self.graph.add(name, Box::new(Blocking(Box::new(node))))
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

    pub fn build(self) -> Result<AsyncFlow> {
        Ok(AsyncFlow {
            graph: self.graph.build()?,
        })
    }
}
