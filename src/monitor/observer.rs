//! Polling directory observer: the raw event source for the daemon.
//!
//! The observer keeps a fingerprint of every entry below its root, keyed by
//! path. Each [`check`](DirectoryObserver::check) walks the tree again and
//! diffs the fresh snapshot against the stored one in sorted path order. A
//! created parent is reported before its contents, a deleted one after them.

#![allow(missing_docs)]

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::errors::{PvbError, Result};
use crate::monitor::events::{RawAction, RawEntryType, RawEvent};
use crate::tree::walker::{DirectoryWalker, EntryMetadata};

/// Per-entry fingerprint: kind, length and mtime.
pub type Fingerprint = EntryMetadata;

type Snapshot = BTreeMap<PathBuf, Fingerprint>;

/// Snapshot-diffing observer rooted at one directory.
#[derive(Debug)]
pub struct DirectoryObserver {
    walker: DirectoryWalker,
    snapshot: Option<Snapshot>,
}

impl DirectoryObserver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            walker: DirectoryWalker::new(root),
            snapshot: None,
        }
    }

    pub fn root(&self) -> &Path {
        self.walker.root()
    }

    pub const fn is_initialized(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Number of entries in the current baseline.
    pub fn entry_count(&self) -> usize {
        self.snapshot.as_ref().map_or(0, BTreeMap::len)
    }

    /// Take the baseline snapshot. Nothing that exists now is ever reported as
    /// created.
    pub fn initialize(&mut self) -> Result<()> {
        let snapshot = self.take_snapshot().map_err(|err| PvbError::ObserverInit {
            path: self.root().to_path_buf(),
            details: err.to_string(),
        })?;
        self.snapshot = Some(snapshot);
        Ok(())
    }

    /// Diff the tree against the last snapshot and return the raw events.
    ///
    /// A failed walk leaves the stored snapshot untouched, so the same changes
    /// are reported by the next successful check.
    pub fn check(&mut self) -> Result<Vec<RawEvent>> {
        let Some(previous) = self.snapshot.as_ref() else {
            return Err(PvbError::Runtime {
                details: format!("observer for {} is not initialized", self.root().display()),
            });
        };
        let current = self.take_snapshot()?;
        let events = diff_snapshots(previous, &current);
        self.snapshot = Some(current);
        Ok(events)
    }

    /// Release the snapshot. Fails when there is nothing to release.
    pub fn destroy(&mut self) -> Result<()> {
        if self.snapshot.take().is_none() {
            return Err(PvbError::Teardown {
                details: format!("observer for {} was not running", self.root().display()),
            });
        }
        Ok(())
    }

    fn take_snapshot(&self) -> Result<Snapshot> {
        Ok(self
            .walker
            .walk()?
            .into_iter()
            .map(|entry| (entry.path, entry.metadata))
            .collect())
    }
}

fn entry_type(fp: &Fingerprint) -> RawEntryType {
    if fp.is_dir {
        RawEntryType::Directory
    } else {
        RawEntryType::File
    }
}

/// Merge-walk two sorted snapshots.
///
/// Deleting a directory reports everything below it first, deepest entries
/// before their parents, and the directory last. Creating a directory reports
/// it and then everything inside it. An entry that switched between file and
/// directory is reported as a removal followed by a creation.
fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> Vec<RawEvent> {
    let mut events = Vec::new();
    // Removed directories whose own event waits for their contents, innermost
    // last, each with the entry that replaced it (if any).
    let mut pending: Vec<PendingRemoval<'_>> = Vec::new();

    let mut old_iter = previous.iter().peekable();
    let mut new_iter = current.iter().peekable();

    loop {
        let step = match (old_iter.peek(), new_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((old_path, _)), Some((new_path, _))) => old_path.cmp(new_path),
        };

        match step {
            Ordering::Less => {
                let Some((path, fp)) = old_iter.next() else { break };
                close_pending(&mut pending, &mut events, Some(path));
                if fp.is_dir {
                    pending.push(PendingRemoval {
                        path,
                        replacement: None,
                    });
                } else {
                    events.push(RawEvent::new(path.clone(), RawEntryType::File, RawAction::Remove));
                }
            }
            Ordering::Greater => {
                let Some((path, fp)) = new_iter.next() else { break };
                close_pending(&mut pending, &mut events, Some(path));
                events.push(RawEvent::new(path.clone(), entry_type(fp), RawAction::Create));
            }
            Ordering::Equal => {
                let (Some((path, old_fp)), Some((_, new_fp))) = (old_iter.next(), new_iter.next())
                else {
                    break;
                };
                close_pending(&mut pending, &mut events, Some(path));
                if old_fp.is_dir && !new_fp.is_dir {
                    pending.push(PendingRemoval {
                        path,
                        replacement: Some(new_fp),
                    });
                } else if old_fp.is_dir != new_fp.is_dir {
                    events.push(RawEvent::new(path.clone(), RawEntryType::File, RawAction::Remove));
                    events.push(RawEvent::new(
                        path.clone(),
                        RawEntryType::Directory,
                        RawAction::Create,
                    ));
                } else if old_fp != new_fp {
                    events.push(RawEvent::new(
                        path.clone(),
                        entry_type(new_fp),
                        RawAction::Modify,
                    ));
                }
            }
        }
    }

    close_pending(&mut pending, &mut events, None);
    events
}

struct PendingRemoval<'a> {
    path: &'a PathBuf,
    replacement: Option<&'a Fingerprint>,
}

/// Emit the removal of every pending directory that is not an ancestor of
/// `next`, innermost first. `None` closes them all.
fn close_pending(
    pending: &mut Vec<PendingRemoval<'_>>,
    events: &mut Vec<RawEvent>,
    next: Option<&PathBuf>,
) {
    while let Some(top) = pending.last() {
        if next.is_some_and(|path| path != top.path && path.starts_with(top.path)) {
            break;
        }
        let Some(done) = pending.pop() else { break };
        events.push(RawEvent::new(
            done.path.clone(),
            RawEntryType::Directory,
            RawAction::Remove,
        ));
        if let Some(fp) = done.replacement {
            events.push(RawEvent::new(done.path.clone(), entry_type(fp), RawAction::Create));
        }
    }
}
