//! Rebuild trigger: turns classified events into counter bumps, change-log
//! lines and (when relevant) synchronous tree rebuilds.

#![allow(missing_docs)]

use crate::core::errors::Result;
use crate::logger::change_log::{ChangeLog, ChangeLogEntry};
use crate::monitor::events::{ClassifiedEvent, EventKind, RawEvent, classify, is_relevant};
use crate::tree::{IntegrityTree, MerkleHash};

/// What handling one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventOutcome {
    /// Relevance as captured before any tracking change.
    pub relevant: bool,
    /// A rebuild ran and succeeded.
    pub rebuilt: bool,
    /// `(old, new)` root digests of a successful rebuild.
    pub transition: Option<(MerkleHash, MerkleHash)>,
}

/// Single-writer change engine over an integrity tree.
///
/// Owns the change log and the event counter; the tree is only queried and
/// commanded, never replaced.
#[derive(Debug)]
pub struct ChangeEngine<T> {
    tree: T,
    log: ChangeLog,
    num_events: u64,
}

impl<T: IntegrityTree> ChangeEngine<T> {
    pub fn new(tree: T) -> Self {
        Self::with_log(tree, ChangeLog::new())
    }

    /// Engine writing into a preconfigured log (e.g. one with a JSONL sink).
    pub const fn with_log(tree: T, log: ChangeLog) -> Self {
        Self {
            tree,
            log,
            num_events: 0,
        }
    }

    pub const fn tree(&self) -> &T {
        &self.tree
    }

    /// Every event seen since construction, relevant or not.
    pub const fn num_events(&self) -> u64 {
        self.num_events
    }

    pub fn log(&self) -> &[ChangeLogEntry] {
        self.log.entries()
    }

    pub fn drain_log(&mut self) -> Vec<ChangeLogEntry> {
        self.log.drain()
    }

    pub fn flush_log(&mut self) {
        self.log.flush();
    }

    pub(crate) fn change_log_mut(&mut self) -> &mut ChangeLog {
        &mut self.log
    }

    /// Handle one classified event.
    ///
    /// A failed rebuild is logged as such and returned; the tree keeps its
    /// previous root.
    pub fn on_event(&mut self, event: ClassifiedEvent) -> Result<EventOutcome> {
        self.num_events += 1;
        let relevant = is_relevant(&event, &self.tree);

        match event.kind() {
            EventKind::DirCreated | EventKind::DirChanged => {
                self.log.record_event(&event, self.num_events);
                Ok(EventOutcome {
                    relevant,
                    rebuilt: false,
                    transition: None,
                })
            }
            EventKind::DirDeleted => {
                self.tree.stop_tracking(event.path());
                self.log.record_event(&event, self.num_events);
                Ok(EventOutcome {
                    relevant,
                    rebuilt: false,
                    transition: None,
                })
            }
            EventKind::FileDeleted => {
                self.tree.stop_tracking(event.path());
                self.log.record_event(&event, self.num_events);
                self.rebuild_if(relevant)
            }
            EventKind::FileCreated | EventKind::FileChanged => {
                self.log.record_event(&event, self.num_events);
                self.rebuild_if(relevant)
            }
        }
    }

    /// Classify and handle a raw observer event.
    pub fn process_raw(&mut self, raw: &RawEvent) -> Result<EventOutcome> {
        let event = classify(raw).inspect_err(|err| {
            eprintln!("[PVB-ENGINE] dropping unclassifiable event: {err}");
        })?;
        self.on_event(event)
    }

    fn rebuild_if(&mut self, relevant: bool) -> Result<EventOutcome> {
        if !relevant {
            return Ok(EventOutcome {
                relevant,
                rebuilt: false,
                transition: None,
            });
        }

        let old = self.tree.root_digest();
        if let Err(err) = self.tree.rebuild() {
            self.log.record_failure(&err);
            return Err(err);
        }
        let new = self.tree.root_digest();
        self.log.record_transition(&old, &new);
        Ok(EventOutcome {
            relevant,
            rebuilt: true,
            transition: Some((old, new)),
        })
    }
}
