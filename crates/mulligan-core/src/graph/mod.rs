//! Weighted execution graph over operations.
//!
//! Nodes live in an id-indexed arena and edges in adjacency lists, so a
//! graph can be cheaply discarded and rebuilt. `optimise` caches a
//! topological order via Kahn's algorithm; `execute` sweeps that order,
//! gating each node behind its predecessors' completion signals and a
//! bounded dispatch pool, and propagating every node's output to its direct
//! successors.

pub mod holder;
pub mod signal;

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;

use crate::action::{Action, ActionError, ActionOutput};
use crate::operation::Operation;
use signal::CompletionSignal;

/// Index of a node in a graph's arena.
pub type NodeId = usize;

/// Advisory weight assigned to auto-chained sequential edges.
pub const DEFAULT_EDGE_WEIGHT: u32 = 1;

/// Errors raised during graph construction and execution.
#[derive(Debug, Error)]
pub enum GraphError {
    /// No topological order exists; the named nodes are entangled.
    #[error("dependency cycle detected involving nodes: {0}")]
    Cyclic(String),

    #[error("unknown node id {0}")]
    UnknownNode(NodeId),

    #[error("graph has no cached execution order, call optimise() first")]
    NotOptimised,
}

/// How dependencies are installed when nodes are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphPolicy {
    /// Edges are added explicitly by the caller.
    Standard,
    /// Every new node auto-chains after the previously appended one, so
    /// insertion order is the future execution order. Used for inverse
    /// (rollback) graphs.
    Sequential,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    node: NodeId,
    weight: u32,
}

/// One operation plus its scheduling state.
///
/// Created only through the graph's node-creation calls and destroyed with
/// the graph.
pub struct GraphNode {
    id: NodeId,
    operation: Operation,
    done: CompletionSignal,
    error: Option<ActionError>,
    output: Option<ActionOutput>,
}

impl GraphNode {
    fn new(id: NodeId, operation: Operation) -> Self {
        Self {
            id,
            operation,
            done: CompletionSignal::new(),
            error: None,
            output: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// The error recorded by the most recent sweep, if the node failed.
    pub fn error(&self) -> Option<&ActionError> {
        self.error.as_ref()
    }

    /// The output recorded by the most recent sweep.
    pub fn output(&self) -> Option<&ActionOutput> {
        self.output.as_ref()
    }
}

/// Weighted directed graph of operations with a cached topological order.
pub struct ExecutionGraph {
    policy: GraphPolicy,
    nodes: Vec<GraphNode>,
    out_edges: Vec<Vec<Edge>>,
    in_edges: Vec<Vec<Edge>>,
    topo: Option<Vec<NodeId>>,
    limit: usize,
    txn_id: u64,
    indirect: bool,
    user_relation: bool,
}

impl ExecutionGraph {
    /// A standard graph whose edges are added explicitly.
    pub fn standard(limit: usize) -> Self {
        Self::with_policy(GraphPolicy::Standard, limit)
    }

    /// A sequential graph whose nodes auto-chain in insertion order.
    pub fn sequential(limit: usize) -> Self {
        Self::with_policy(GraphPolicy::Sequential, limit)
    }

    fn with_policy(policy: GraphPolicy, limit: usize) -> Self {
        Self {
            policy,
            nodes: Vec::new(),
            out_edges: Vec::new(),
            in_edges: Vec::new(),
            topo: None,
            limit: limit.max(1),
            txn_id: 0,
            indirect: false,
            user_relation: false,
        }
    }

    pub fn policy(&self) -> GraphPolicy {
        self.policy
    }

    /// The concurrency ceiling for dispatched units.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// The cached topological order, when one has been computed.
    pub fn dispatch_order(&self) -> Option<&[NodeId]> {
        self.topo.as_deref()
    }

    /// Stamp the transaction sequence onto the graph and every action,
    /// current and future.
    pub fn set_txn_id(&mut self, txn_id: u64) {
        self.txn_id = txn_id;
        for node in &self.nodes {
            node.operation.action().set_txn_id(txn_id);
        }
    }

    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    /// Mark the graph as touching derived relations only.
    pub fn set_indirect(&mut self, indirect: bool) {
        self.indirect = indirect;
    }

    pub fn is_indirect(&self) -> bool {
        self.indirect
    }

    /// Mark the graph as built from a user statement rather than internal
    /// plumbing.
    pub fn set_user_relation(&mut self, user_relation: bool) {
        self.user_relation = user_relation;
    }

    pub fn is_user_relation(&self) -> bool {
        self.user_relation
    }

    /// Add `action` as a reversible node.
    pub fn create_node(&mut self, action: Arc<dyn Action>) -> NodeId {
        self.insert(Operation::reversible(action))
    }

    /// Add `action` as an irreversible node: no undo log is ever exposed
    /// for it.
    pub fn create_irreversible_node(&mut self, action: Arc<dyn Action>) -> NodeId {
        self.insert(Operation::irreversible(action))
    }

    fn insert(&mut self, operation: Operation) -> NodeId {
        let id = self.nodes.len();
        operation.action().set_txn_id(self.txn_id);
        self.nodes.push(GraphNode::new(id, operation));
        self.out_edges.push(Vec::new());
        self.in_edges.push(Vec::new());
        self.topo = None;
        if self.policy == GraphPolicy::Sequential && id > 0 {
            self.push_edge(id - 1, id, DEFAULT_EDGE_WEIGHT);
        }
        id
    }

    /// Declare that `to` depends on `from`. The weight is advisory only.
    pub fn add_dependency(
        &mut self,
        from: NodeId,
        to: NodeId,
        weight: u32,
    ) -> Result<(), GraphError> {
        if from >= self.nodes.len() {
            return Err(GraphError::UnknownNode(from));
        }
        if to >= self.nodes.len() {
            return Err(GraphError::UnknownNode(to));
        }
        self.push_edge(from, to, weight);
        self.topo = None;
        Ok(())
    }

    fn push_edge(&mut self, from: NodeId, to: NodeId, weight: u32) {
        self.out_edges[from].push(Edge { node: to, weight });
        self.in_edges[to].push(Edge { node: from, weight });
    }

    /// The advisory weight of the edge `from -> to`, when one exists.
    pub fn edge_weight(&self, from: NodeId, to: NodeId) -> Option<u32> {
        self.out_edges
            .get(from)?
            .iter()
            .find(|e| e.node == to)
            .map(|e| e.weight)
    }

    /// Name node `to`'s input from node `from` so the action can fetch it
    /// by alias instead of by id.
    pub fn set_input_alias(
        &self,
        to: NodeId,
        alias: &str,
        from: NodeId,
    ) -> anyhow::Result<()> {
        let node = self
            .nodes
            .get(to)
            .ok_or(GraphError::UnknownNode(to))?;
        if from >= self.nodes.len() {
            return Err(GraphError::UnknownNode(from).into());
        }
        node.operation.action().set_input_alias(alias, from)
    }

    /// Compute and cache a topological order via Kahn's algorithm.
    ///
    /// Fails [`GraphError::Cyclic`] naming the entangled nodes if no order
    /// exists; the graph must never be executed in that state.
    pub fn optimise(&mut self) -> Result<(), GraphError> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        for edges in &self.out_edges {
            for edge in edges {
                in_degree[edge.node] += 1;
            }
        }

        let mut queue: VecDeque<NodeId> = (0..n).filter(|&id| in_degree[id] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for edge in &self.out_edges[id] {
                in_degree[edge.node] -= 1;
                if in_degree[edge.node] == 0 {
                    queue.push_back(edge.node);
                }
            }
        }

        if order.len() != n {
            let entangled: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, deg)| **deg > 0)
                .map(|(id, _)| {
                    format!("{id} ({})", self.nodes[id].operation.action().name())
                })
                .collect();
            return Err(GraphError::Cyclic(entangled.join(", ")));
        }

        self.topo = Some(order);
        Ok(())
    }

    /// Execute the cached topological order.
    ///
    /// Each node waits for its direct predecessors' completion signals, is
    /// dispatched as a spawned task gated by the concurrency ceiling, and
    /// has its output delivered to every direct successor. The sweep waits
    /// for each node's result before advancing and never aborts early: all
    /// nodes dispatch even after an earlier failure.
    ///
    /// On failure the returned output carries the first recorded error plus
    /// the undo log of the last node visited in the sweep. On success it is
    /// the last visited node's output.
    pub async fn execute(&mut self) -> Result<ActionOutput, GraphError> {
        let order = match &self.topo {
            Some(order) => order.clone(),
            None => return Err(GraphError::NotOptimised),
        };

        // Drain stale completion state from any prior run.
        for node in &mut self.nodes {
            node.done.reset();
            node.error = None;
            node.output = None;
        }

        let gate = Arc::new(Semaphore::new(self.limit));
        let mut first_error: Option<ActionError> = None;

        for &id in &order {
            let predecessors: Vec<NodeId> =
                self.in_edges[id].iter().map(|e| e.node).collect();
            for pred in predecessors {
                self.nodes[pred].done.observe().await;
            }

            let operation = self.nodes[id].operation.clone();
            let gate = Arc::clone(&gate);
            let unit = tokio::spawn(async move {
                // Backpressure applies to the unit itself, not the sweep.
                let _permit = gate.acquire_owned().await.ok();
                operation.execute().await
            });
            let output = match unit.await {
                Ok(output) => output,
                Err(err) => ActionOutput::failure(ActionError::Aborted(err.to_string())),
            };

            let successors: Vec<NodeId> =
                self.out_edges[id].iter().map(|e| e.node).collect();
            for succ in successors {
                if let Err(err) = self.nodes[succ]
                    .operation
                    .action()
                    .incident_data(id, &output)
                {
                    tracing::warn!(
                        from = id,
                        to = succ,
                        error = %err,
                        "failed to deliver output to successor"
                    );
                    if first_error.is_none() {
                        first_error = Some(ActionError::Failed(format!(
                            "output delivery to node {succ} failed: {err}"
                        )));
                    }
                }
            }

            if let Some(err) = output.error() {
                tracing::warn!(
                    node = id,
                    action = self.nodes[id].operation.action().name(),
                    error = %err,
                    "node execution failed"
                );
                self.nodes[id].error = Some(err.clone());
                if first_error.is_none() {
                    first_error = Some(err.clone());
                }
            }
            self.nodes[id].output = Some(output);
            self.nodes[id].done.notify();
        }

        Ok(self.sweep_result(first_error, order.last().copied()))
    }

    fn sweep_result(
        &self,
        first_error: Option<ActionError>,
        last_visited: Option<NodeId>,
    ) -> ActionOutput {
        match (first_error, last_visited) {
            (Some(err), Some(last)) => {
                let mut output = ActionOutput::failure(err);
                if let Some(undo) = self.nodes[last].operation.undo_log() {
                    output = output.with_undo_log(undo);
                }
                output
            }
            (Some(err), None) => ActionOutput::failure(err),
            (None, Some(last)) => self.nodes[last].output.clone().unwrap_or_default(),
            (None, None) => ActionOutput::success(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct NoopAction(String);

    #[async_trait]
    impl Action for NoopAction {
        fn name(&self) -> &str {
            &self.0
        }

        async fn execute(&self) -> ActionOutput {
            ActionOutput::success()
        }

        fn incident_data(&self, _from: NodeId, _output: &ActionOutput) -> Result<()> {
            Ok(())
        }

        fn set_txn_id(&self, _txn_id: u64) {}

        fn set_input_alias(&self, _alias: &str, _from: NodeId) -> Result<()> {
            Ok(())
        }

        fn is_read_only(&self) -> bool {
            true
        }
    }

    fn noop(name: &str) -> Arc<dyn Action> {
        Arc::new(NoopAction(name.to_owned()))
    }

    #[test]
    fn optimise_orders_a_diamond() {
        // a -> b, a -> c, b -> d, c -> d
        let mut graph = ExecutionGraph::standard(4);
        let a = graph.create_node(noop("a"));
        let b = graph.create_node(noop("b"));
        let c = graph.create_node(noop("c"));
        let d = graph.create_node(noop("d"));
        graph.add_dependency(a, b, 1).expect("edge a->b");
        graph.add_dependency(a, c, 1).expect("edge a->c");
        graph.add_dependency(b, d, 1).expect("edge b->d");
        graph.add_dependency(c, d, 1).expect("edge c->d");

        graph.optimise().expect("diamond is acyclic");
        let order = graph.dispatch_order().expect("order cached");
        assert_eq!(order.first(), Some(&a));
        assert_eq!(order.last(), Some(&d));
    }

    #[test]
    fn optimise_rejects_a_cycle() {
        let mut graph = ExecutionGraph::standard(4);
        let a = graph.create_node(noop("a"));
        let b = graph.create_node(noop("b"));
        graph.add_dependency(a, b, 1).expect("edge a->b");
        graph.add_dependency(b, a, 1).expect("edge b->a");

        let err = graph.optimise().unwrap_err();
        assert!(
            matches!(err, GraphError::Cyclic(_)),
            "expected Cyclic, got: {err}"
        );
        assert!(graph.dispatch_order().is_none());
    }

    #[test]
    fn dependency_rejects_unknown_nodes() {
        let mut graph = ExecutionGraph::standard(4);
        let a = graph.create_node(noop("a"));
        let err = graph.add_dependency(a, 7, 1).unwrap_err();
        assert!(
            matches!(err, GraphError::UnknownNode(7)),
            "expected UnknownNode, got: {err}"
        );
    }

    #[test]
    fn sequential_policy_chains_insertion_order() {
        let mut graph = ExecutionGraph::sequential(4);
        let a = graph.create_node(noop("a"));
        let b = graph.create_node(noop("b"));
        let c = graph.create_node(noop("c"));

        graph.optimise().expect("chain is acyclic");
        assert_eq!(graph.dispatch_order(), Some([a, b, c].as_slice()));
        assert_eq!(graph.edge_weight(a, b), Some(DEFAULT_EDGE_WEIGHT));
        assert_eq!(graph.edge_weight(b, c), Some(DEFAULT_EDGE_WEIGHT));
    }

    #[tokio::test]
    async fn execute_without_optimise_fails() {
        let mut graph = ExecutionGraph::standard(4);
        graph.create_node(noop("a"));
        let err = graph.execute().await.unwrap_err();
        assert!(
            matches!(err, GraphError::NotOptimised),
            "expected NotOptimised, got: {err}"
        );
    }

    #[test]
    fn node_creation_invalidates_cached_order() {
        let mut graph = ExecutionGraph::standard(4);
        graph.create_node(noop("a"));
        graph.optimise().expect("single node is acyclic");
        assert!(graph.dispatch_order().is_some());

        graph.create_node(noop("b"));
        assert!(graph.dispatch_order().is_none());
    }
}
