//! Operations: actions tagged with a reversibility policy.
//!
//! The two variants differ only in what they expose for reversal. A
//! reversible operation surfaces its action's undo log; an irreversible one
//! never does, and refuses `undo()` outright.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::action::{Action, ActionOutput};
use crate::oplog::OpLog;

/// Errors raised by operations.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("operation {0:?} is irreversible and cannot be undone")]
    UnsupportedUndo(String),
}

/// One caller-supplied action wrapped with a reversibility policy.
///
/// The variant is fixed at construction and lives exactly as long as its
/// graph node.
#[derive(Clone)]
pub enum Operation {
    /// The action's undo log is exposed and `undo()` is permitted.
    Reversible(Arc<dyn Action>),
    /// No undo log is ever exposed and `undo()` always fails.
    Irreversible(Arc<dyn Action>),
}

impl Operation {
    /// Wrap `action` reversibly.
    pub fn reversible(action: Arc<dyn Action>) -> Self {
        Self::Reversible(action)
    }

    /// Wrap `action` irreversibly.
    pub fn irreversible(action: Arc<dyn Action>) -> Self {
        Self::Irreversible(action)
    }

    /// The wrapped action.
    pub fn action(&self) -> &Arc<dyn Action> {
        match self {
            Self::Reversible(action) | Self::Irreversible(action) => action,
        }
    }

    /// Execute the wrapped action unchanged.
    pub async fn execute(&self) -> ActionOutput {
        self.action().execute().await
    }

    /// True for the reversible variant.
    pub fn is_reversible(&self) -> bool {
        matches!(self, Self::Reversible(_))
    }

    /// Delegates to the wrapped action.
    pub fn is_read_only(&self) -> bool {
        self.action().is_read_only()
    }

    /// The action's undo log; always `None` for the irreversible variant.
    pub fn undo_log(&self) -> Option<OpLog> {
        match self {
            Self::Reversible(action) => action.undo_log(),
            Self::Irreversible(_) => None,
        }
    }

    /// The action's redo log.
    pub fn redo_log(&self) -> Option<OpLog> {
        self.action().redo_log()
    }

    /// Undo this operation's completed work.
    ///
    /// Reversal is replayed through inverse graphs today, so the reversible
    /// arm accepts and does nothing; it is the hook for actions that later
    /// grow native reversal. The irreversible arm always fails.
    pub fn undo(&self) -> Result<(), OperationError> {
        match self {
            Self::Reversible(_) => Ok(()),
            Self::Irreversible(action) => {
                Err(OperationError::UnsupportedUndo(action.name().to_owned()))
            }
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (variant, action) = match self {
            Self::Reversible(a) => ("Reversible", a.name()),
            Self::Irreversible(a) => ("Irreversible", a.name()),
        };
        f.debug_struct("Operation")
            .field("variant", &variant)
            .field("action", &action)
            .finish()
    }
}
