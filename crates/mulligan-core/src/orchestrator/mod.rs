//! Command orchestration: splits a raw multi-statement command, classifies
//! each statement through the external builder, and drives the transaction
//! coordinator.
//!
//! The orchestrator is a thin state machine. Its only state is the current
//! coordinator; begin pushes a child, commit/rollback pop back to the
//! parent. Mutating statements inside a nested transaction are deferred to
//! commit; everything else executes immediately.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::action::ActionOutput;
use crate::config::CoreConfig;
use crate::oplog::OpLog;
use crate::statement::StatementBuilder;
use crate::txn::{CommitOutcome, RollbackPolicy, TxnCoordinator, TxnError};

/// What happened to one statement of a dispatched command.
#[derive(Debug)]
pub enum StatementDisposition {
    /// Executed immediately (read-only, or at the root coordinator).
    Executed(ActionOutput),
    /// Enqueued for deferred execution at commit.
    Deferred,
    /// A nested transaction was opened.
    Began { depth: usize },
    /// The current transaction committed (or failed its vote).
    Committed(CommitOutcome),
    /// The current transaction rolled back.
    RolledBack(CommitOutcome),
}

/// Per-command dispatch results.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// One entry per processed statement, in command order. Shorter than
    /// the command when processing stopped at a failure.
    pub dispositions: Vec<StatementDisposition>,
    /// Undo guidance surfaced when a best-effort commit fails mid-vote.
    pub undo_guidance: Option<OpLog>,
}

/// Drives one coordinator across `;`-delimited raw commands.
pub struct Orchestrator {
    builder: Arc<dyn StatementBuilder>,
    coordinator: Arc<TxnCoordinator>,
}

impl Orchestrator {
    /// An orchestrator with a fresh root coordinator.
    pub fn new(builder: Arc<dyn StatementBuilder>, config: &CoreConfig) -> Self {
        Self {
            builder,
            coordinator: TxnCoordinator::root(config),
        }
    }

    /// The coordinator currently being driven.
    pub fn coordinator(&self) -> &Arc<TxnCoordinator> {
        &self.coordinator
    }

    /// Current transaction nesting depth.
    pub fn depth(&self) -> usize {
        self.coordinator.depth()
    }

    /// Split `raw` into statements and drive each one.
    ///
    /// Processing stops at the first statement-level failure; whatever was
    /// gathered up to that point is returned in the report.
    pub async fn dispatch(&mut self, raw: &str) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();

        for text in split_statements(raw) {
            let stmt = self
                .builder
                .build(&text)
                .await
                .with_context(|| format!("failed to build statement {text:?}"))?;
            stmt.prepare()
                .await
                .with_context(|| format!("failed to prepare statement {text:?}"))?;

            if stmt.is_begin() {
                self.coordinator = Arc::clone(&self.coordinator).begin()?;
                report.dispositions.push(StatementDisposition::Began {
                    depth: self.coordinator.depth(),
                });
            } else if stmt.is_commit() {
                if !self.handle_commit(&text, &mut report).await? {
                    return Ok(report);
                }
            } else if stmt.is_rollback() {
                if !self.handle_rollback(&text, &mut report).await? {
                    return Ok(report);
                }
            } else if stmt.is_read_only() || self.coordinator.depth() == 0 {
                let output = self.coordinator.execute_immediate(&stmt).await;
                let error = output.error().cloned();
                report
                    .dispositions
                    .push(StatementDisposition::Executed(output));
                if let Some(err) = error {
                    tracing::warn!(
                        statement = text.as_str(),
                        error = %err,
                        "statement failed, aborting command"
                    );
                    return Ok(report);
                }
            } else {
                self.coordinator.enqueue(stmt).await?;
                report.dispositions.push(StatementDisposition::Deferred);
            }
        }

        Ok(report)
    }

    /// Commit the current transaction and pop to its parent.
    ///
    /// Returns `Ok(false)` when the vote failed and the command should stop;
    /// `Err` when there is no parent to pop to.
    async fn handle_commit(&mut self, text: &str, report: &mut DispatchReport) -> Result<bool> {
        let outcome = self.coordinator.commit().await;
        if let Some(err) = outcome.error().cloned() {
            tracing::warn!(statement = text, error = %err, "commit failed");
            if self.coordinator.policy() == RollbackPolicy::BestEffort {
                report.undo_guidance = Some(outcome.undo_log.clone());
            }
            report
                .dispositions
                .push(StatementDisposition::Committed(outcome));
            return Ok(false);
        }
        let parent = self
            .coordinator
            .parent()
            .ok_or(TxnError::NoParentTransaction)?;
        self.coordinator = parent;
        report
            .dispositions
            .push(StatementDisposition::Committed(outcome));
        Ok(true)
    }

    /// Roll back the current transaction and pop to its parent.
    async fn handle_rollback(&mut self, text: &str, report: &mut DispatchReport) -> Result<bool> {
        let outcome = self.coordinator.rollback().await;
        if let Some(err) = outcome.error().cloned() {
            tracing::warn!(statement = text, error = %err, "rollback failed");
            report
                .dispositions
                .push(StatementDisposition::RolledBack(outcome));
            return Ok(false);
        }
        let parent = self
            .coordinator
            .parent()
            .ok_or(TxnError::NoParentTransaction)?;
        self.coordinator = parent;
        report
            .dispositions
            .push(StatementDisposition::RolledBack(outcome));
        Ok(true)
    }
}

/// Split a raw command on `;`, honouring single- and double-quoted spans
/// and discarding empty fragments.
pub fn split_statements(raw: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in raw.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                ';' => {
                    let fragment = current.trim();
                    if !fragment.is_empty() {
                        fragments.push(fragment.to_owned());
                    }
                    current.clear();
                }
                _ => current.push(ch),
            },
        }
    }

    let fragment = current.trim();
    if !fragment.is_empty() {
        fragments.push(fragment.to_owned());
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_semicolons() {
        assert_eq!(split_statements("a; b ;c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn skips_empty_fragments() {
        assert_eq!(split_statements("a;;  ; b;"), vec!["a", "b"]);
        assert!(split_statements("  ;  ").is_empty());
    }

    #[test]
    fn quoted_semicolons_are_preserved() {
        assert_eq!(
            split_statements("a; 'x;y'; b"),
            vec!["a", "'x;y'", "b"]
        );
        assert_eq!(
            split_statements(r#"insert "v;1"; next"#),
            vec![r#"insert "v;1""#, "next"]
        );
    }

    #[test]
    fn unterminated_quote_swallows_the_rest() {
        assert_eq!(split_statements("a; 'b; c"), vec!["a", "'b; c"]);
    }
}
