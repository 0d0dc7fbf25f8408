//! The `Action` trait -- the adapter interface for units of real work.
//!
//! Each concrete action (a remote service call, a local staging write)
//! implements this trait. The trait is intentionally object-safe so plans
//! can hold heterogeneous actions as `Arc<dyn Action>` graph nodes.

use anyhow::Result;
use async_trait::async_trait;

use super::types::ActionOutput;
use crate::graph::NodeId;
use crate::oplog::OpLog;

/// Adapter interface for one unit of real work, opaque to the core.
///
/// Implementors perform the remote call or staging write and report the
/// result, including any undo/redo logs, through [`ActionOutput`]. Input
/// delivery happens through [`Action::incident_data`]: when a predecessor
/// node completes, its output is handed to every direct successor, which can
/// later look it up by the predecessor's node id or by a caller-assigned
/// alias.
///
/// # Object Safety
///
/// This trait is object-safe: graphs store `Arc<dyn Action>` and spawn
/// execution onto the runtime, so implementations must be `Send + Sync` and
/// use interior mutability for any state the setters touch.
#[async_trait]
pub trait Action: Send + Sync {
    /// Human-readable name for this action (used in logs and errors).
    fn name(&self) -> &str;

    /// Perform the work and report the result.
    ///
    /// Failures are carried inside the returned output, not as a panic or
    /// `Err`; the core never retries.
    async fn execute(&self) -> ActionOutput;

    /// Receive the output of direct predecessor `from`.
    ///
    /// Called once per incoming edge before this action executes.
    fn incident_data(&self, from: NodeId, output: &ActionOutput) -> Result<()>;

    /// Record the transaction sequence this action executes under.
    fn set_txn_id(&self, txn_id: u64);

    /// Name the input from node `from` so the action can fetch it by alias
    /// instead of by id.
    fn set_input_alias(&self, alias: &str, from: NodeId) -> Result<()>;

    /// True when the action has no visible side effects.
    fn is_read_only(&self) -> bool;

    /// The undo log for this action's completed work, when it keeps one.
    fn undo_log(&self) -> Option<OpLog> {
        None
    }

    /// The redo log for this action's completed work, when it keeps one.
    fn redo_log(&self) -> Option<OpLog> {
        None
    }
}
