//! The `Statement` and `StatementBuilder` traits -- the seam to the
//! out-of-scope parsing/builder layer.
//!
//! The core never inspects statement text beyond splitting a raw command;
//! classification (begin/commit/rollback/read-only) and plan construction
//! are entirely supplied by external builders. The core consumes only the
//! resulting booleans and graph holders.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::action::ActionOutput;
use crate::graph::holder::GraphHolder;
use crate::oplog::OpLog;

/// One prepared statement, classified and planned by an external builder.
#[async_trait]
pub trait Statement: Send + Sync {
    /// The raw statement text (used in logs and errors).
    fn text(&self) -> &str;

    /// Finish preparation before classification and execution.
    async fn prepare(&self) -> Result<()>;

    /// Execute the statement's forward plan.
    async fn execute(&self) -> ActionOutput;

    /// True when execution has no visible side effects.
    fn is_read_only(&self) -> bool;

    /// True for a transaction-begin marker.
    fn is_begin(&self) -> bool {
        false
    }

    /// True for a transaction-commit marker.
    fn is_commit(&self) -> bool {
        false
    }

    /// True for a transaction-rollback marker.
    fn is_rollback(&self) -> bool {
        false
    }

    /// The statement's primitive graph holder, when it has one.
    ///
    /// Best-effort transactions require the holder's inverse graph to be
    /// non-empty before accepting the statement.
    fn graph_holder(&self) -> Option<Arc<GraphHolder>> {
        None
    }

    /// Statement-level undo log, consulted when the execution output
    /// carries none.
    fn undo_log(&self) -> Option<OpLog> {
        None
    }

    /// Statement-level redo log, consulted when the execution output
    /// carries none.
    fn redo_log(&self) -> Option<OpLog> {
        None
    }
}

/// Translates one raw statement text into a prepared [`Statement`].
///
/// Implemented by the external builder layer; the orchestrator calls it for
/// every fragment of a split command.
#[async_trait]
pub trait StatementBuilder: Send + Sync {
    /// Build the statement for `text`.
    async fn build(&self, text: &str) -> Result<Arc<dyn Statement>>;
}
