//! The co-domain of commit and rollback.

use chrono::{DateTime, Utc};

use crate::action::{ActionError, ActionOutput};
use crate::oplog::OpLog;

/// Everything a commit or rollback attempt produced.
///
/// `outputs` holds per-statement results in the order they were driven.
/// `voting_error` is set when a statement (or, on rollback, an inverse
/// plan) fails; `completion_error` is reserved for the completion phase of
/// a genuine two-phase protocol and is never set today. The merged undo log
/// concatenates per-statement logs in reverse enqueue order -- undoing a
/// batch must conceptually undo the last action first.
#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    pub outputs: Vec<ActionOutput>,
    pub voting_error: Option<ActionError>,
    pub completion_error: Option<ActionError>,
    pub undo_log: OpLog,
    pub redo_log: OpLog,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CommitOutcome {
    /// True when neither phase reported an error.
    pub fn is_ok(&self) -> bool {
        self.voting_error.is_none() && self.completion_error.is_none()
    }

    /// The first error across both phases, voting first.
    pub fn error(&self) -> Option<&ActionError> {
        self.voting_error
            .as_ref()
            .or(self.completion_error.as_ref())
    }
}
