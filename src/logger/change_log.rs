//! Append-only change log owned by the change engine.
//!
//! Lines are never reordered, deduplicated or edited after append. Callers
//! outside the crate only get read access plus drain and flush; appending is
//! reserved for the engine. When a JSONL sink is attached, every appended line
//! is mirrored to it as a structured record.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::core::errors::PvbError;
use crate::logger::jsonl::{JsonlWriter, LogRecord, RecordType, Severity};
use crate::monitor::events::ClassifiedEvent;
use crate::tree::{MerkleHash, hash_hex};

/// What a change-log line records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// `"<KIND> : <path>"`
    Event,
    /// `"Hash update: <old> -> <new>"`
    RootTransition,
    /// `"Rebuild failed: <error>"`
    RebuildFailed,
}

/// One change-log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// RFC 3339 UTC; informational only, ordering is append order.
    pub ts: String,
    pub kind: EntryKind,
    pub text: String,
}

/// Engine-owned, append-only log of detected changes.
#[derive(Debug, Default)]
pub struct ChangeLog {
    entries: Vec<ChangeLogEntry>,
    sink: Option<JsonlWriter>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log that also mirrors every line to a JSONL writer.
    pub fn with_sink(sink: JsonlWriter) -> Self {
        Self {
            entries: Vec::new(),
            sink: Some(sink),
        }
    }

    pub fn entries(&self) -> &[ChangeLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text of every line, in append order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.text.as_str())
    }

    pub fn count_of(&self, kind: EntryKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub const fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Remove and return everything logged so far.
    pub fn drain(&mut self) -> Vec<ChangeLogEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Flush the JSONL sink, if any.
    pub fn flush(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.flush();
        }
    }

    // ──────────────────── engine-side appends ────────────────────

    pub(crate) fn record_event(&mut self, event: &ClassifiedEvent, num_events: u64) {
        let mut record = LogRecord::new(RecordType::FsEvent, Severity::Info);
        record.kind = Some(event.kind().label().to_string());
        record.path = Some(event.path().display().to_string());
        record.num_events = Some(num_events);
        self.append(EntryKind::Event, event.to_string(), record);
    }

    pub(crate) fn record_transition(&mut self, old: &MerkleHash, new: &MerkleHash) {
        let (old_hex, new_hex) = (hash_hex(old), hash_hex(new));
        let text = format!("Hash update: {old_hex} -> {new_hex}");
        let mut record = LogRecord::new(RecordType::RootTransition, Severity::Info);
        record.old_root = Some(old_hex);
        record.new_root = Some(new_hex);
        self.append(EntryKind::RootTransition, text, record);
    }

    pub(crate) fn record_failure(&mut self, err: &PvbError) {
        let record =
            LogRecord::new(RecordType::RebuildFailed, Severity::Warning).with_error(err);
        self.append(EntryKind::RebuildFailed, format!("Rebuild failed: {err}"), record);
    }

    /// Write a record to the sink only; it does not become a log line.
    pub(crate) fn mirror(&mut self, record: &LogRecord) {
        if let Some(sink) = self.sink.as_mut() {
            sink.write_record(record);
        }
    }

    fn append(&mut self, kind: EntryKind, text: String, record: LogRecord) {
        if let Some(sink) = self.sink.as_mut() {
            sink.write_record(&record);
        }
        self.entries.push(ChangeLogEntry {
            ts: record.ts,
            kind,
            text,
        });
    }
}
