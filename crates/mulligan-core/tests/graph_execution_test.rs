//! Tests for execution-graph scheduling: topological dispatch, output
//! propagation, failure attribution, and re-execution.

use std::sync::Arc;

use serde_json::json;

use mulligan_core::graph::holder::GraphHolder;
use mulligan_core::graph::{DEFAULT_EDGE_WEIGHT, ExecutionGraph};
use mulligan_core::operation::{Operation, OperationError};
use mulligan_core::oplog::OpLog;

use mulligan_test_utils::{RecordingAction, init_tracing, journal, journal_entries};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn position(entries: &[String], name: &str) -> usize {
    entries
        .iter()
        .position(|e| e == name)
        .unwrap_or_else(|| panic!("{name} was never executed; journal: {entries:?}"))
}

fn notes_of(log: &OpLog) -> Vec<String> {
    log.notes().to_vec()
}

// ---------------------------------------------------------------------------
// Topological dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn diamond_executes_in_topological_order() {
    init_tracing();
    let journal = journal();
    let mut graph = ExecutionGraph::standard(4);

    let a = graph.create_node(Arc::new(RecordingAction::new("a", &journal)));
    let b = graph.create_node(Arc::new(RecordingAction::new("b", &journal)));
    let c = graph.create_node(Arc::new(RecordingAction::new("c", &journal)));
    let d = graph.create_node(Arc::new(RecordingAction::new("d", &journal)));
    graph.add_dependency(a, b, 1).expect("edge a->b");
    graph.add_dependency(a, c, 1).expect("edge a->c");
    graph.add_dependency(b, d, 1).expect("edge b->d");
    graph.add_dependency(c, d, 1).expect("edge c->d");

    graph.optimise().expect("diamond is acyclic");
    let output = graph.execute().await.expect("sweep should run");
    assert!(output.is_ok(), "sweep failed: {:?}", output.error());

    let entries = journal_entries(&journal);
    assert_eq!(entries.len(), 4);
    // Every declared edge (u -> v) dispatched u before v.
    assert!(position(&entries, "a") < position(&entries, "b"));
    assert!(position(&entries, "a") < position(&entries, "c"));
    assert!(position(&entries, "b") < position(&entries, "d"));
    assert!(position(&entries, "c") < position(&entries, "d"));
}

#[tokio::test]
async fn outputs_flow_to_direct_successors() {
    init_tracing();
    let journal = journal();
    let mut graph = ExecutionGraph::standard(2);

    let producer = Arc::new(RecordingAction::new("producer", &journal));
    let consumer = Arc::new(RecordingAction::new("consumer", &journal));
    let p = graph.create_node(producer);
    let c = graph.create_node(consumer.clone());
    graph.add_dependency(p, c, 1).expect("edge p->c");
    graph
        .set_input_alias(c, "source", p)
        .expect("alias installation");

    graph.optimise().expect("chain is acyclic");
    graph.execute().await.expect("sweep should run");

    let received = consumer.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, p);
    assert_eq!(received[0].1, Some(json!({ "action": "producer" })));
    assert_eq!(consumer.alias("source"), Some(p));
}

#[tokio::test]
async fn success_returns_last_visited_output() {
    init_tracing();
    let journal = journal();
    let mut graph = ExecutionGraph::standard(2);

    let first = graph.create_node(Arc::new(RecordingAction::new("first", &journal)));
    let last = graph.create_node(Arc::new(RecordingAction::new("last", &journal)));
    graph.add_dependency(first, last, 1).expect("edge");

    graph.optimise().expect("chain is acyclic");
    let output = graph.execute().await.expect("sweep should run");
    assert_eq!(output.payload(), Some(&json!({ "action": "last" })));
}

// ---------------------------------------------------------------------------
// Failure semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failure_never_aborts_the_sweep() {
    init_tracing();
    let journal = journal();
    let mut graph = ExecutionGraph::standard(2);

    let a = graph.create_node(Arc::new(RecordingAction::new("a", &journal)));
    let b = graph.create_node(Arc::new(RecordingAction::failing("b", &journal)));
    let c = graph.create_node(Arc::new(RecordingAction::new("c", &journal)));
    graph.add_dependency(a, b, 1).expect("edge a->b");
    graph.add_dependency(b, c, 1).expect("edge b->c");

    graph.optimise().expect("chain is acyclic");
    let output = graph.execute().await.expect("sweep should run");

    // All three nodes dispatched despite b's failure.
    assert_eq!(journal_entries(&journal), vec!["a", "b", "c"]);
    let err = output.error().expect("sweep must surface the failure");
    assert!(err.to_string().contains('b'), "unexpected error: {err}");
    assert!(
        graph.node(b).expect("node b exists").error().is_some(),
        "the failing node must keep its error"
    );
}

#[tokio::test]
async fn error_output_carries_last_visited_undo_log() {
    init_tracing();
    let journal = journal();
    let mut graph = ExecutionGraph::standard(2);

    let a = graph.create_node(Arc::new(
        RecordingAction::new("a", &journal).with_undo_note("undo-a"),
    ));
    let b = graph.create_node(Arc::new(
        RecordingAction::failing("b", &journal).with_undo_note("undo-b"),
    ));
    let c = graph.create_node(Arc::new(
        RecordingAction::new("c", &journal).with_undo_note("undo-c"),
    ));
    graph.add_dependency(a, b, 1).expect("edge a->b");
    graph.add_dependency(b, c, 1).expect("edge b->c");

    graph.optimise().expect("chain is acyclic");
    let output = graph.execute().await.expect("sweep should run");

    assert!(output.error().is_some());
    // Final-state guidance: the undo log belongs to the last node visited
    // in the sweep, not to the failing node.
    let undo = output.undo_log().expect("error output carries an undo log");
    assert_eq!(notes_of(undo), vec!["undo-c"]);
}

// ---------------------------------------------------------------------------
// Re-execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reexecution_is_clean() {
    init_tracing();
    let journal = journal();
    let mut graph = ExecutionGraph::standard(2);

    let a = graph.create_node(Arc::new(RecordingAction::new("a", &journal)));
    let b = graph.create_node(Arc::new(RecordingAction::new("b", &journal)));
    graph.add_dependency(a, b, 1).expect("edge a->b");
    graph.optimise().expect("chain is acyclic");

    let first = graph.execute().await.expect("first run");
    assert!(first.is_ok());
    let second = graph.execute().await.expect("second run");
    assert!(second.is_ok(), "stale completion state leaked into run 2");

    assert_eq!(journal_entries(&journal), vec!["a", "b", "a", "b"]);
}

// ---------------------------------------------------------------------------
// Holder: inverse chain, blanking, txn stamping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inverse_chain_executes_in_insertion_order() {
    init_tracing();
    let journal = journal();
    let holder = GraphHolder::new(2);

    holder
        .create_inverse_node(Arc::new(RecordingAction::new("undo:1", &journal)))
        .await;
    holder
        .create_inverse_node(Arc::new(RecordingAction::new("undo:2", &journal)))
        .await;
    holder
        .create_inverse_node(Arc::new(RecordingAction::new("undo:3", &journal)))
        .await;

    holder.optimise_inverse().await.expect("chain is acyclic");
    let output = holder.execute_inverse().await.expect("inverse sweep");
    assert!(output.is_ok());
    assert_eq!(journal_entries(&journal), vec!["undo:1", "undo:2", "undo:3"]);
}

#[tokio::test]
async fn inverse_dependencies_install_reversed() {
    let journal = journal();
    let holder = GraphHolder::new(2);

    let x = holder
        .create_inverse_node(Arc::new(RecordingAction::new("x", &journal)))
        .await;
    let y = holder
        .create_inverse_node(Arc::new(RecordingAction::new("y", &journal)))
        .await;

    holder
        .add_inverse_dependency(x, y, 7)
        .await
        .expect("inverse edge");
    // Installation is reversed (to -> from), recording teardown order.
    let weight = holder.with_inverse(|g| g.edge_weight(y, x)).await;
    assert_eq!(weight, Some(7));
    // The auto-chained sequential edge is still x -> y.
    let chained = holder.with_inverse(|g| g.edge_weight(x, y)).await;
    assert_eq!(chained, Some(DEFAULT_EDGE_WEIGHT));
}

#[tokio::test]
async fn blank_resets_both_graphs() {
    let journal = journal();
    let holder = GraphHolder::new(2);

    holder
        .create_node(Arc::new(RecordingAction::new("fwd", &journal)))
        .await;
    holder
        .create_inverse_node(Arc::new(RecordingAction::new("inv", &journal)))
        .await;
    assert_eq!(holder.node_count().await, 1);
    assert!(holder.has_inverse_nodes().await);

    holder.blank().await;
    assert_eq!(holder.node_count().await, 0);
    assert_eq!(holder.inverse_node_count().await, 0);
    assert!(!holder.has_inverse_nodes().await);

    // The holder is usable again after blanking.
    holder
        .create_node(Arc::new(RecordingAction::new("rebuilt", &journal)))
        .await;
    holder.optimise().await.expect("rebuilt graph optimises");
    let output = holder.execute().await.expect("rebuilt graph executes");
    assert!(output.is_ok());
}

#[tokio::test]
async fn txn_id_reaches_current_and_future_actions() {
    let journal = journal();
    let holder = GraphHolder::new(2);

    let early = Arc::new(RecordingAction::new("early", &journal));
    holder.create_node(early.clone()).await;
    holder.set_txn_id(42).await;
    assert_eq!(early.txn_id(), 42);

    let late = Arc::new(RecordingAction::new("late", &journal));
    holder.create_node(late.clone()).await;
    assert_eq!(late.txn_id(), 42);
}

// ---------------------------------------------------------------------------
// Operation variants
// ---------------------------------------------------------------------------

#[test]
fn irreversible_operations_refuse_undo() {
    let journal = journal();
    let action = Arc::new(RecordingAction::new("guarded", &journal).with_undo_note("undo-x"));

    let irreversible = Operation::irreversible(action.clone());
    assert!(irreversible.undo_log().is_none());
    let err = irreversible.undo().unwrap_err();
    assert!(
        matches!(err, OperationError::UnsupportedUndo(ref name) if name == "guarded"),
        "expected UnsupportedUndo, got: {err}"
    );

    let reversible = Operation::reversible(action);
    assert!(reversible.undo().is_ok());
    let undo = reversible.undo_log().expect("reversible exposes undo");
    assert_eq!(notes_of(&undo), vec!["undo-x"]);
}
