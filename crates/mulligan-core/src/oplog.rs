//! Undo/redo log records.
//!
//! An [`OpLog`] is the append-only record an action leaves behind when it
//! completes: the raw bytes needed to replay or reverse it, plus ordered
//! human-readable fragments suitable for operator display. Logs are merged
//! across statements by concatenation; a clone owns its storage outright.

use serde::{Deserialize, Serialize};

/// Append-only record of raw replay bytes plus ordered human-readable notes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpLog {
    raw: Vec<u8>,
    notes: Vec<String>,
}

impl OpLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from pre-assembled raw bytes and notes.
    pub fn from_parts(raw: Vec<u8>, notes: Vec<String>) -> Self {
        Self { raw, notes }
    }

    /// Append one fragment: raw bytes and the note describing them.
    pub fn record(&mut self, raw: impl AsRef<[u8]>, note: impl Into<String>) {
        self.raw.extend_from_slice(raw.as_ref());
        self.notes.push(note.into());
    }

    /// Size of the log, defined as the length of its raw bytes.
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// True when the log carries neither raw bytes nor notes.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty() && self.notes.is_empty()
    }

    /// The raw replay bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The ordered human-readable fragments.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Append each other log's raw bytes and notes, in argument order,
    /// after the receiver's own content.
    pub fn concat<'a>(&mut self, others: impl IntoIterator<Item = &'a OpLog>) {
        for other in others {
            self.raw.extend_from_slice(&other.raw);
            self.notes.extend(other.notes.iter().cloned());
        }
    }
}
