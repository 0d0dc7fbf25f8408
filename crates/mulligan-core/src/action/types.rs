//! Output and error types carried between actions, graphs, and coordinators.

use serde_json::Value;
use thiserror::Error;

use crate::oplog::OpLog;

/// Error produced by a dispatched action.
///
/// Carried inside [`ActionOutput`] rather than returned as a `Result` so a
/// sweep can keep dispatching the remaining nodes and still surface the
/// failure afterwards. Never retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The action ran and reported failure.
    #[error("action execution failed: {0}")]
    Failed(String),

    /// The dispatched unit could not run to completion (e.g. its task died
    /// before producing a result).
    #[error("dispatched action aborted before completion: {0}")]
    Aborted(String),
}

/// The result of executing one action, statement, or graph sweep.
///
/// Bundles an optional error with whatever undo/redo logs the work produced
/// and an opaque result payload for the layer above.
#[derive(Debug, Clone, Default)]
pub struct ActionOutput {
    error: Option<ActionError>,
    undo: Option<OpLog>,
    redo: Option<OpLog>,
    payload: Option<Value>,
}

impl ActionOutput {
    /// A successful output with no payload or logs.
    pub fn success() -> Self {
        Self::default()
    }

    /// A failed output carrying `error`.
    pub fn failure(error: ActionError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Attach an opaque result payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach an undo log.
    pub fn with_undo_log(mut self, log: OpLog) -> Self {
        self.undo = Some(log);
        self
    }

    /// Attach a redo log.
    pub fn with_redo_log(mut self, log: OpLog) -> Self {
        self.redo = Some(log);
        self
    }

    /// The error, if the work failed.
    pub fn error(&self) -> Option<&ActionError> {
        self.error.as_ref()
    }

    /// True when the work completed without error.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The undo log, when one was produced.
    pub fn undo_log(&self) -> Option<&OpLog> {
        self.undo.as_ref()
    }

    /// The redo log, when one was produced.
    pub fn redo_log(&self) -> Option<&OpLog> {
        self.redo.as_ref()
    }

    /// The opaque result payload, when one was produced.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }
}
