//! Nestable transaction coordination.
//!
//! A coordinator accumulates deferred statements and drives them through a
//! voting-phase commit, or reverses them under one of two rollback
//! policies:
//!
//! ```text
//! lazy        -> no remote action; the accumulated undo log is
//!                guidance for a human operator
//! best_effort -> replay each statement's staged inverse graph,
//!                newest-to-oldest, stopping at the first failure
//! ```
//!
//! Coordinators nest: `begin` returns a child holding a read-only `Arc`
//! reference to its parent, and depth is derived from that chain. Siblings
//! never share mutable state.

pub mod outcome;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::action::{ActionError, ActionOutput};
use crate::config::CoreConfig;
use crate::oplog::OpLog;
use crate::statement::Statement;
pub use outcome::CommitOutcome;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// How a coordinator reverses committed-in-principle work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Defer to human-displayed undo guidance instead of automated
    /// reversal.
    Lazy,
    /// Replay staged inverse actions in reverse order.
    BestEffort,
}

impl fmt::Display for RollbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lazy => "lazy",
            Self::BestEffort => "best_effort",
        };
        f.write_str(s)
    }
}

impl FromStr for RollbackPolicy {
    type Err = RollbackPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lazy" => Ok(Self::Lazy),
            "best_effort" => Ok(Self::BestEffort),
            other => Err(RollbackPolicyParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`RollbackPolicy`] string.
#[derive(Debug, Clone)]
pub struct RollbackPolicyParseError(pub String);

impl fmt::Display for RollbackPolicyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid rollback policy: {:?}", self.0)
    }
}

impl std::error::Error for RollbackPolicyParseError {}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by transaction coordination.
#[derive(Debug, Error)]
pub enum TxnError {
    /// `begin` past the configured nesting ceiling. The caller may retry at
    /// the current depth.
    #[error("transaction nesting depth {depth} has reached the configured maximum {max}")]
    DepthExceeded { depth: usize, max: i64 },

    /// A best-effort coordinator refused a statement with no staged
    /// inverse. The caller may fall back to the lazy policy or reject.
    #[error("statement {0:?} has no reversal plan and cannot join a best-effort transaction")]
    NoReversalAvailable(String),

    /// Commit or rollback attempted at the root coordinator.
    #[error("no parent transaction to return to")]
    NoParentTransaction,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// One level of a nestable transaction.
///
/// All mutation happens from the single driving thread; the parent link is
/// a read-only `Arc` used for depth derivation and popping.
pub struct TxnCoordinator {
    id: Uuid,
    parent: Option<Arc<TxnCoordinator>>,
    policy: RollbackPolicy,
    max_depth: i64,
    opened_at: DateTime<Utc>,
    statements: Mutex<Vec<Arc<dyn Statement>>>,
    undo_logs: Mutex<Vec<OpLog>>,
    redo_logs: Mutex<Vec<OpLog>>,
    txn_seq: AtomicU64,
}

impl TxnCoordinator {
    /// The root coordinator for a session. `depth() == 0`.
    pub fn root(config: &CoreConfig) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            parent: None,
            policy: config.rollback_policy,
            max_depth: config.max_txn_depth,
            opened_at: Utc::now(),
            statements: Mutex::new(Vec::new()),
            undo_logs: Mutex::new(Vec::new()),
            redo_logs: Mutex::new(Vec::new()),
            txn_seq: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn policy(&self) -> RollbackPolicy {
        self.policy
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// The parent coordinator, absent at root.
    pub fn parent(&self) -> Option<Arc<TxnCoordinator>> {
        self.parent.clone()
    }

    /// 0 at root, else one more than the parent's depth.
    pub fn depth(&self) -> usize {
        match &self.parent {
            None => 0,
            Some(parent) => 1 + parent.depth(),
        }
    }

    /// Open a nested transaction parented to this one.
    ///
    /// Fails [`TxnError::DepthExceeded`] when a non-negative `max_depth` has
    /// been reached; a negative maximum means unbounded nesting. The handle
    /// is consumed into the child's parent link; callers keep their own
    /// clone.
    pub fn begin(self: Arc<Self>) -> Result<Arc<Self>, TxnError> {
        let depth = self.depth();
        if self.max_depth >= 0 && depth as i64 >= self.max_depth {
            return Err(TxnError::DepthExceeded {
                depth,
                max: self.max_depth,
            });
        }
        let policy = self.policy;
        let max_depth = self.max_depth;
        let parent_id = self.id;
        let child = Arc::new(Self {
            id: Uuid::new_v4(),
            parent: Some(self),
            policy,
            max_depth,
            opened_at: Utc::now(),
            statements: Mutex::new(Vec::new()),
            undo_logs: Mutex::new(Vec::new()),
            redo_logs: Mutex::new(Vec::new()),
            txn_seq: AtomicU64::new(0),
        });
        tracing::info!(
            txn = %child.id,
            parent = %parent_id,
            depth = depth + 1,
            "opened nested transaction"
        );
        Ok(child)
    }

    /// Accept a statement for deferred execution at commit.
    ///
    /// Lazy accepts unconditionally. Best-effort requires the statement's
    /// graph holder to have staged inverse nodes, guaranteeing every
    /// accepted statement is, in principle, undoable.
    pub async fn enqueue(&self, stmt: Arc<dyn Statement>) -> Result<(), TxnError> {
        if self.policy == RollbackPolicy::BestEffort {
            let reversible = match stmt.graph_holder() {
                Some(holder) => holder.has_inverse_nodes().await,
                None => false,
            };
            if !reversible {
                return Err(TxnError::NoReversalAvailable(stmt.text().to_owned()));
            }
        }
        if let Some(holder) = stmt.graph_holder() {
            let seq = self.txn_seq.fetch_add(1, Ordering::Relaxed) + 1;
            holder.set_txn_id(seq).await;
        }
        tracing::debug!(
            txn = %self.id,
            statement = stmt.text(),
            "statement enqueued for deferred execution"
        );
        self.statements.lock().await.push(stmt);
        Ok(())
    }

    /// Number of statements currently deferred.
    pub async fn statement_count(&self) -> usize {
        self.statements.lock().await.len()
    }

    /// Execute a statement outside the deferred queue, still accumulating
    /// its undo/redo logs so lazy-policy display guidance covers it.
    pub async fn execute_immediate(&self, stmt: &Arc<dyn Statement>) -> ActionOutput {
        tracing::debug!(
            txn = %self.id,
            statement = stmt.text(),
            "executing statement immediately"
        );
        let output = stmt.execute().await;
        self.accumulate_logs(stmt.as_ref(), &output).await;
        output
    }

    /// Commit the deferred statements.
    ///
    /// The voting phase executes every statement in enqueue order, stopping
    /// at the first error; the completion phase is a placeholder for a
    /// genuine two-phase protocol. Outputs and merged logs gathered so far
    /// are always returned.
    pub async fn commit(&self) -> CommitOutcome {
        let statements: Vec<Arc<dyn Statement>> = self.statements.lock().await.clone();
        tracing::info!(
            txn = %self.id,
            statements = statements.len(),
            "commit voting phase started"
        );

        let mut outcome = CommitOutcome::default();
        for stmt in &statements {
            let output = stmt.execute().await;
            self.accumulate_logs(stmt.as_ref(), &output).await;
            let error = output.error().cloned();
            outcome.outputs.push(output);
            if let Some(err) = error {
                tracing::warn!(
                    txn = %self.id,
                    statement = stmt.text(),
                    error = %err,
                    "vote failed, aborting commit"
                );
                outcome.voting_error = Some(err);
                break;
            }
        }

        if outcome.voting_error.is_none() {
            self.run_completion_phase(&mut outcome).await;
        }
        outcome.undo_log = self.merged_undo_log().await;
        outcome.redo_log = self.merged_redo_log().await;
        outcome
    }

    /// Completion phase of the two-phase commit.
    ///
    /// Voting alone decides the outcome today; this hook only stamps the
    /// completion time. A per-statement prepare/acknowledge round would
    /// live here.
    async fn run_completion_phase(&self, outcome: &mut CommitOutcome) {
        outcome.completed_at = Some(Utc::now());
    }

    /// Reverse this transaction's work according to the rollback policy.
    pub async fn rollback(&self) -> CommitOutcome {
        match self.policy {
            RollbackPolicy::Lazy => {
                tracing::info!(
                    txn = %self.id,
                    "lazy rollback: undo log retained for display only"
                );
                CommitOutcome::default()
            }
            RollbackPolicy::BestEffort => self.rollback_best_effort().await,
        }
    }

    /// Walk the statement list newest-to-oldest, optimising and executing
    /// each staged inverse graph. The first inverse failure is terminal for
    /// the attempt: there is no undo-of-undo.
    async fn rollback_best_effort(&self) -> CommitOutcome {
        let statements: Vec<Arc<dyn Statement>> = self.statements.lock().await.clone();
        tracing::info!(
            txn = %self.id,
            statements = statements.len(),
            "best-effort rollback started"
        );

        let mut outcome = CommitOutcome::default();
        for stmt in statements.iter().rev() {
            let Some(holder) = stmt.graph_holder() else {
                // The enqueue guard makes this unreachable for accepted
                // statements; skip rather than abort if it ever happens.
                tracing::warn!(
                    txn = %self.id,
                    statement = stmt.text(),
                    "statement has no inverse plan, skipping"
                );
                continue;
            };

            if let Err(err) = holder.optimise_inverse().await {
                outcome.voting_error = Some(ActionError::Failed(format!(
                    "inverse plan for {:?} is unusable: {err}",
                    stmt.text()
                )));
                break;
            }
            match holder.execute_inverse().await {
                Ok(output) => {
                    let error = output.error().cloned();
                    outcome.outputs.push(output);
                    if let Some(err) = error {
                        tracing::warn!(
                            txn = %self.id,
                            statement = stmt.text(),
                            error = %err,
                            "inverse execution failed, stopping rollback"
                        );
                        outcome.voting_error = Some(err);
                        break;
                    }
                }
                Err(err) => {
                    outcome.voting_error = Some(ActionError::Failed(err.to_string()));
                    break;
                }
            }
        }
        outcome
    }

    async fn accumulate_logs(&self, stmt: &dyn Statement, output: &ActionOutput) {
        if let Some(undo) = output.undo_log().cloned().or_else(|| stmt.undo_log()) {
            self.undo_logs.lock().await.push(undo);
        }
        if let Some(redo) = output.redo_log().cloned().or_else(|| stmt.redo_log()) {
            self.redo_logs.lock().await.push(redo);
        }
    }

    /// Per-statement undo logs merged in reverse enqueue order.
    pub async fn merged_undo_log(&self) -> OpLog {
        let logs = self.undo_logs.lock().await;
        let mut merged = OpLog::new();
        for log in logs.iter().rev() {
            merged.concat([log]);
        }
        merged
    }

    /// Per-statement redo logs merged in enqueue order.
    pub async fn merged_redo_log(&self) -> OpLog {
        let logs = self.redo_logs.lock().await;
        let mut merged = OpLog::new();
        for log in logs.iter() {
            merged.concat([log]);
        }
        merged
    }
}

impl fmt::Debug for TxnCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnCoordinator")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("depth", &self.depth())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}
