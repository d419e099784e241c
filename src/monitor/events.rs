//! Event classification and relevance filtering.
//!
//! Raw observer events are mapped onto a closed set of six kinds. The engine
//! dispatches on that set with one exhaustive match.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{PvbError, Result};
use crate::tree::IntegrityTree;

// ──────────────────── raw events ────────────────────

/// What kind of filesystem entry a raw event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEntryType {
    File,
    Directory,
    /// Anything the observer could not place (sockets, devices, ...).
    Other(String),
}

/// What happened to the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawAction {
    Create,
    Modify,
    Remove,
    Other(String),
}

/// An unclassified event as delivered by the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub entry: RawEntryType,
    pub action: RawAction,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, entry: RawEntryType, action: RawAction) -> Self {
        Self {
            path: path.into(),
            entry,
            action,
        }
    }
}

// ──────────────────── classified events ────────────────────

/// Closed set of change kinds the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    FileCreated,
    FileDeleted,
    FileChanged,
    DirCreated,
    DirDeleted,
    DirChanged,
}

impl EventKind {
    pub const ALL: [Self; 6] = [
        Self::FileCreated,
        Self::FileDeleted,
        Self::FileChanged,
        Self::DirCreated,
        Self::DirDeleted,
        Self::DirChanged,
    ];

    /// Label used in change-log lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FileCreated => "FCREATE",
            Self::FileDeleted => "FDELETE",
            Self::FileChanged => "FCHANGE",
            Self::DirCreated => "DCREATE",
            Self::DirDeleted => "DDELETE",
            Self::DirChanged => "DCHANGE",
        }
    }

    #[must_use]
    pub const fn is_directory(self) -> bool {
        matches!(self, Self::DirCreated | Self::DirDeleted | Self::DirChanged)
    }

    #[must_use]
    pub const fn is_deletion(self) -> bool {
        matches!(self, Self::FileDeleted | Self::DirDeleted)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A typed filesystem change at an absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEvent {
    kind: EventKind,
    path: PathBuf,
}

impl ClassifiedEvent {
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Formats as the change-log event line: `FCREATE : /data/a.txt`.
impl fmt::Display for ClassifiedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.kind.label(), self.path.display())
    }
}

// ──────────────────── classification ────────────────────

/// Map a raw event onto an [`EventKind`].
///
/// Unknown entry types or actions mean the observer and the classifier are
/// miswired; the error is returned as-is and never retried.
pub fn classify(raw: &RawEvent) -> Result<ClassifiedEvent> {
    let kind = match (&raw.entry, &raw.action) {
        (RawEntryType::File, RawAction::Create) => EventKind::FileCreated,
        (RawEntryType::File, RawAction::Modify) => EventKind::FileChanged,
        (RawEntryType::File, RawAction::Remove) => EventKind::FileDeleted,
        (RawEntryType::Directory, RawAction::Create) => EventKind::DirCreated,
        (RawEntryType::Directory, RawAction::Modify) => EventKind::DirChanged,
        (RawEntryType::Directory, RawAction::Remove) => EventKind::DirDeleted,
        (RawEntryType::Other(entry), _) => {
            return Err(PvbError::Classification {
                path: raw.path.clone(),
                details: format!("unknown entry type {entry:?}"),
            });
        }
        (_, RawAction::Other(action)) => {
            return Err(PvbError::Classification {
                path: raw.path.clone(),
                details: format!("unknown action {action:?}"),
            });
        }
    };
    Ok(ClassifiedEvent::new(kind, raw.path.clone()))
}

/// Whether an event should reach the rebuild gate.
///
/// Directory events always pass so they are logged and counted. File events
/// pass when the file or its parent directory is tracked, which is what lets a
/// brand-new file under a tracked directory trigger a rebuild.
///
/// Limitation: a file created inside a directory that is itself new is not
/// relevant, since neither it nor its parent is tracked yet. The tree catches
/// up on the next rebuild triggered by some other event.
pub fn is_relevant<T: IntegrityTree + ?Sized>(event: &ClassifiedEvent, tree: &T) -> bool {
    if event.kind().is_directory() {
        return true;
    }
    tree.is_tracked(event.path())
        || event
            .path()
            .parent()
            .is_some_and(|parent| tree.is_tracked(parent))
}
