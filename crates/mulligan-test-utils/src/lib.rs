//! Shared mock collaborators for mulligan integration tests.
//!
//! The core consumes actions, statements, and builders through traits; the
//! real implementations live in out-of-scope layers. These mocks record
//! what the core does to them (execution order, delivered inputs, assigned
//! transaction ids) so tests can assert scheduling and transaction
//! behavior.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use mulligan_core::action::{Action, ActionError, ActionOutput};
use mulligan_core::graph::NodeId;
use mulligan_core::graph::holder::GraphHolder;
use mulligan_core::oplog::OpLog;
use mulligan_core::statement::{Statement, StatementBuilder};

/// Shared, ordered record of which mocks ran, and when.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// A fresh, empty journal.
pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Snapshot a journal's entries.
pub fn journal_entries(journal: &Journal) -> Vec<String> {
    journal.lock().expect("journal poisoned").clone()
}

/// Initialize a test tracing subscriber once per binary.
///
/// Controlled by `RUST_LOG`; output is captured per test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A single-note undo/redo log, the shape most tests need.
pub fn note_log(note: &str) -> OpLog {
    let mut log = OpLog::new();
    log.record(note.as_bytes(), note);
    log
}

// ===========================================================================
// RecordingAction
// ===========================================================================

/// An [`Action`] that appends its name to a journal on execute and records
/// everything the core pushes into it.
pub struct RecordingAction {
    name: String,
    journal: Journal,
    fail: bool,
    read_only: bool,
    undo: Option<OpLog>,
    redo: Option<OpLog>,
    received: Mutex<Vec<(NodeId, Option<Value>)>>,
    aliases: Mutex<HashMap<String, NodeId>>,
    txn_id: AtomicU64,
}

impl RecordingAction {
    /// A succeeding, mutating action.
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: Arc::clone(journal),
            fail: false,
            read_only: false,
            undo: None,
            redo: None,
            received: Mutex::new(Vec::new()),
            aliases: Mutex::new(HashMap::new()),
            txn_id: AtomicU64::new(0),
        }
    }

    /// An action whose execution reports failure.
    pub fn failing(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            fail: true,
            ..Self::new(name, journal)
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Attach an undo log with a single note.
    pub fn with_undo_note(mut self, note: &str) -> Self {
        self.undo = Some(note_log(note));
        self
    }

    /// Attach a redo log with a single note.
    pub fn with_redo_note(mut self, note: &str) -> Self {
        self.redo = Some(note_log(note));
        self
    }

    /// The `(from, payload)` pairs delivered via `incident_data`, in order.
    pub fn received(&self) -> Vec<(NodeId, Option<Value>)> {
        self.received.lock().expect("received poisoned").clone()
    }

    /// The alias map installed via `set_input_alias`.
    pub fn alias(&self, alias: &str) -> Option<NodeId> {
        self.aliases
            .lock()
            .expect("aliases poisoned")
            .get(alias)
            .copied()
    }

    /// The most recently assigned transaction id.
    pub fn txn_id(&self) -> u64 {
        self.txn_id.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for RecordingAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> ActionOutput {
        self.journal
            .lock()
            .expect("journal poisoned")
            .push(self.name.clone());

        if self.fail {
            return ActionOutput::failure(ActionError::Failed(format!(
                "{} refused to run",
                self.name
            )));
        }

        let mut output = ActionOutput::success().with_payload(json!({ "action": self.name }));
        if let Some(undo) = &self.undo {
            output = output.with_undo_log(undo.clone());
        }
        if let Some(redo) = &self.redo {
            output = output.with_redo_log(redo.clone());
        }
        output
    }

    fn incident_data(&self, from: NodeId, output: &ActionOutput) -> Result<()> {
        self.received
            .lock()
            .expect("received poisoned")
            .push((from, output.payload().cloned()));
        Ok(())
    }

    fn set_txn_id(&self, txn_id: u64) {
        self.txn_id.store(txn_id, Ordering::SeqCst);
    }

    fn set_input_alias(&self, alias: &str, from: NodeId) -> Result<()> {
        self.aliases
            .lock()
            .expect("aliases poisoned")
            .insert(alias.to_owned(), from);
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn undo_log(&self) -> Option<OpLog> {
        self.undo.clone()
    }

    fn redo_log(&self) -> Option<OpLog> {
        self.redo.clone()
    }
}

// ===========================================================================
// MockStatement
// ===========================================================================

enum StatementKind {
    Begin,
    Commit,
    Rollback,
    Query,
    Mutation,
}

/// A [`Statement`] assembled from parts: a transaction marker, a scripted
/// success/failure, or a plan wrapping a [`GraphHolder`].
pub struct MockStatement {
    text: String,
    kind: StatementKind,
    holder: Option<Arc<GraphHolder>>,
    fail: bool,
    journal: Option<Journal>,
    undo: Option<OpLog>,
    redo: Option<OpLog>,
}

impl MockStatement {
    fn with_kind(text: impl Into<String>, kind: StatementKind) -> Self {
        Self {
            text: text.into(),
            kind,
            holder: None,
            fail: false,
            journal: None,
            undo: None,
            redo: None,
        }
    }

    pub fn begin() -> Self {
        Self::with_kind("BEGIN", StatementKind::Begin)
    }

    pub fn commit() -> Self {
        Self::with_kind("COMMIT", StatementKind::Commit)
    }

    pub fn rollback() -> Self {
        Self::with_kind("ROLLBACK", StatementKind::Rollback)
    }

    /// A read-only statement.
    pub fn query(text: impl Into<String>) -> Self {
        Self::with_kind(text, StatementKind::Query)
    }

    /// A mutating statement.
    pub fn mutation(text: impl Into<String>) -> Self {
        Self::with_kind(text, StatementKind::Mutation)
    }

    /// Execute through `holder`'s forward graph instead of a scripted
    /// output, and expose the holder to the coordinator.
    pub fn with_holder(mut self, holder: Arc<GraphHolder>) -> Self {
        self.holder = Some(holder);
        self
    }

    /// Scripted executions report failure.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Append the statement text to `journal` on every execute.
    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(Arc::clone(journal));
        self
    }

    /// Attach a single-note undo log to scripted outputs (also served by
    /// the statement-level accessor).
    pub fn with_undo_note(mut self, note: &str) -> Self {
        self.undo = Some(note_log(note));
        self
    }

    /// Attach a single-note redo log to scripted outputs.
    pub fn with_redo_note(mut self, note: &str) -> Self {
        self.redo = Some(note_log(note));
        self
    }

    /// Finish building as a trait object.
    pub fn arc(self) -> Arc<dyn Statement> {
        Arc::new(self)
    }
}

#[async_trait]
impl Statement for MockStatement {
    fn text(&self) -> &str {
        &self.text
    }

    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self) -> ActionOutput {
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .expect("journal poisoned")
                .push(self.text.clone());
        }

        if self.fail {
            return ActionOutput::failure(ActionError::Failed(format!(
                "statement {} refused to run",
                self.text
            )));
        }

        if let Some(holder) = &self.holder {
            if let Err(err) = holder.optimise().await {
                return ActionOutput::failure(ActionError::Failed(err.to_string()));
            }
            return match holder.execute().await {
                Ok(output) => output,
                Err(err) => ActionOutput::failure(ActionError::Failed(err.to_string())),
            };
        }

        let mut output = ActionOutput::success();
        if let Some(undo) = &self.undo {
            output = output.with_undo_log(undo.clone());
        }
        if let Some(redo) = &self.redo {
            output = output.with_redo_log(redo.clone());
        }
        output
    }

    fn is_read_only(&self) -> bool {
        matches!(self.kind, StatementKind::Query)
    }

    fn is_begin(&self) -> bool {
        matches!(self.kind, StatementKind::Begin)
    }

    fn is_commit(&self) -> bool {
        matches!(self.kind, StatementKind::Commit)
    }

    fn is_rollback(&self) -> bool {
        matches!(self.kind, StatementKind::Rollback)
    }

    fn graph_holder(&self) -> Option<Arc<GraphHolder>> {
        self.holder.as_ref().map(Arc::clone)
    }

    fn undo_log(&self) -> Option<OpLog> {
        self.undo.clone()
    }

    fn redo_log(&self) -> Option<OpLog> {
        self.redo.clone()
    }
}

// ===========================================================================
// ScriptedBuilder
// ===========================================================================

/// A [`StatementBuilder`] that serves pre-registered statements by exact
/// text, with BEGIN/COMMIT/ROLLBACK markers built on demand.
#[derive(Default)]
pub struct ScriptedBuilder {
    statements: Mutex<HashMap<String, Arc<dyn Statement>>>,
}

impl ScriptedBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `stmt` whenever `text` is built.
    pub fn register(&self, text: impl Into<String>, stmt: Arc<dyn Statement>) {
        self.statements
            .lock()
            .expect("statements poisoned")
            .insert(text.into(), stmt);
    }
}

#[async_trait]
impl StatementBuilder for ScriptedBuilder {
    async fn build(&self, text: &str) -> Result<Arc<dyn Statement>> {
        if let Some(stmt) = self
            .statements
            .lock()
            .expect("statements poisoned")
            .get(text)
        {
            return Ok(Arc::clone(stmt));
        }
        match text.to_ascii_uppercase().as_str() {
            "BEGIN" => Ok(MockStatement::begin().arc()),
            "COMMIT" => Ok(MockStatement::commit().arc()),
            "ROLLBACK" => Ok(MockStatement::rollback().arc()),
            other => anyhow::bail!("no scripted statement registered for {other:?}"),
        }
    }
}
