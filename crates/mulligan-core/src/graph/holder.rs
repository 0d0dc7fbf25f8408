//! Pairing of a forward execution graph and its inverse rollback graph.
//!
//! Every statement owns one holder. The forward graph is standard (edges
//! added explicitly); the inverse graph is sequential, so appended inverse
//! nodes form a strict chain whose insertion order is the teardown order.
//! The holder is shared as `Arc<GraphHolder>` between the statement and the
//! coordinator, so both graphs sit behind async mutexes.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::action::{Action, ActionOutput};
use crate::graph::{ExecutionGraph, GraphError, NodeId};

/// One forward (standard) graph and one inverse (sequential) graph for a
/// single unit of work.
pub struct GraphHolder {
    forward: Mutex<ExecutionGraph>,
    inverse: Mutex<ExecutionGraph>,
    limit: usize,
}

impl GraphHolder {
    /// A holder whose graphs dispatch at most `limit` units concurrently.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            forward: Mutex::new(ExecutionGraph::standard(limit)),
            inverse: Mutex::new(ExecutionGraph::sequential(limit)),
            limit,
        }
    }

    /// The concurrency ceiling both graphs are built with.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Add a reversible node to the forward graph.
    pub async fn create_node(&self, action: Arc<dyn Action>) -> NodeId {
        self.forward.lock().await.create_node(action)
    }

    /// Add an irreversible node to the forward graph.
    pub async fn create_irreversible_node(&self, action: Arc<dyn Action>) -> NodeId {
        self.forward.lock().await.create_irreversible_node(action)
    }

    /// Declare that forward node `to` depends on forward node `from`.
    pub async fn add_dependency(
        &self,
        from: NodeId,
        to: NodeId,
        weight: u32,
    ) -> Result<(), GraphError> {
        self.forward.lock().await.add_dependency(from, to, weight)
    }

    /// Name forward node `to`'s input from node `from`.
    pub async fn set_input_alias(
        &self,
        to: NodeId,
        alias: &str,
        from: NodeId,
    ) -> anyhow::Result<()> {
        self.forward.lock().await.set_input_alias(to, alias, from)
    }

    /// Cache the forward graph's topological order.
    pub async fn optimise(&self) -> Result<(), GraphError> {
        self.forward.lock().await.optimise()
    }

    /// Execute the forward graph's cached order.
    pub async fn execute(&self) -> Result<ActionOutput, GraphError> {
        self.forward.lock().await.execute().await
    }

    /// Add a reversible node to the inverse chain. Sequential policy makes
    /// it depend on the previously appended inverse node.
    pub async fn create_inverse_node(&self, action: Arc<dyn Action>) -> NodeId {
        self.inverse.lock().await.create_node(action)
    }

    /// Declare an inverse dependency. Installation is intentionally
    /// reversed (`to -> from`) so the chain records teardown order.
    pub async fn add_inverse_dependency(
        &self,
        from: NodeId,
        to: NodeId,
        weight: u32,
    ) -> Result<(), GraphError> {
        self.inverse.lock().await.add_dependency(to, from, weight)
    }

    /// Cache the inverse graph's topological order.
    pub async fn optimise_inverse(&self) -> Result<(), GraphError> {
        self.inverse.lock().await.optimise()
    }

    /// Execute the inverse graph's cached order.
    pub async fn execute_inverse(&self) -> Result<ActionOutput, GraphError> {
        self.inverse.lock().await.execute().await
    }

    /// True when at least one inverse node has been staged. Best-effort
    /// transactions refuse statements for which this is false.
    pub async fn has_inverse_nodes(&self) -> bool {
        !self.inverse.lock().await.is_empty()
    }

    pub async fn node_count(&self) -> usize {
        self.forward.lock().await.node_count()
    }

    pub async fn inverse_node_count(&self) -> usize {
        self.inverse.lock().await.node_count()
    }

    /// Stamp the transaction sequence onto both graphs and their actions.
    pub async fn set_txn_id(&self, txn_id: u64) {
        self.forward.lock().await.set_txn_id(txn_id);
        self.inverse.lock().await.set_txn_id(txn_id);
    }

    /// Discard and replace both graphs (same concurrency limit) so the plan
    /// can be rebuilt from scratch.
    pub async fn blank(&self) {
        *self.forward.lock().await = ExecutionGraph::standard(self.limit);
        *self.inverse.lock().await = ExecutionGraph::sequential(self.limit);
    }

    /// Run `f` against the forward graph, e.g. to set planner flags.
    pub async fn with_forward<R>(&self, f: impl FnOnce(&mut ExecutionGraph) -> R) -> R {
        let mut graph = self.forward.lock().await;
        f(&mut graph)
    }

    /// Run `f` against the inverse graph.
    pub async fn with_inverse<R>(&self, f: impl FnOnce(&mut ExecutionGraph) -> R) -> R {
        let mut graph = self.inverse.lock().await;
        f(&mut graph)
    }
}
