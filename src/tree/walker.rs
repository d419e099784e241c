//! Directory walker shared by the integrity tree and the change observer.
//!
//! Produces a deterministic, path-sorted listing of every regular file and
//! directory below a root. Symlinks are neither followed nor reported, so a
//! link loop can never stall a rebuild or a poll tick.

#![allow(missing_docs)]

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::core::errors::{PvbError, Result};

/// Metadata collected for each filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub size_bytes: u64,
    pub modified: SystemTime,
    pub is_dir: bool,
}

impl EntryMetadata {
    fn from_fs(meta: &fs::Metadata) -> Self {
        Self {
            size_bytes: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            is_dir: meta.is_dir(),
        }
    }
}

/// A single entry discovered during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub metadata: EntryMetadata,
    /// Depth below the walk root (direct children are depth 1).
    pub depth: usize,
}

/// Sequential walker rooted at one directory.
///
/// Safety invariants:
/// - Never follows symlinks
/// - Entries that vanish mid-walk are skipped, not reported as errors
/// - A missing or non-directory root is `RootUnavailable`
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    root: PathBuf,
}

impl DirectoryWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the whole tree. The root itself is not part of the result.
    pub fn walk(&self) -> Result<Vec<WalkEntry>> {
        match fs::symlink_metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(PvbError::RootUnavailable {
                    path: self.root.clone(),
                });
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(PvbError::RootUnavailable {
                    path: self.root.clone(),
                });
            }
            Err(err) => return Err(PvbError::io(&self.root, err)),
        }

        let mut entries = Vec::new();
        let mut pending: Vec<(PathBuf, usize)> = vec![(self.root.clone(), 0)];

        while let Some((dir, depth)) = pending.pop() {
            let read_dir = match fs::read_dir(&dir) {
                Ok(rd) => rd,
                // Removed between listing the parent and descending into it.
                Err(err) if err.kind() == ErrorKind::NotFound && dir != self.root => continue,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Err(PvbError::RootUnavailable {
                        path: self.root.clone(),
                    });
                }
                Err(err) => return Err(PvbError::io(&dir, err)),
            };

            for child in read_dir {
                let child = child.map_err(|e| PvbError::io(&dir, e))?;
                let path = child.path();
                let meta = match fs::symlink_metadata(&path) {
                    Ok(m) => m,
                    Err(err) if err.kind() == ErrorKind::NotFound => continue,
                    Err(err) => return Err(PvbError::io(&path, err)),
                };

                let file_type = meta.file_type();
                if !(file_type.is_dir() || file_type.is_file()) {
                    continue;
                }

                if file_type.is_dir() {
                    pending.push((path.clone(), depth + 1));
                }
                entries.push(WalkEntry {
                    path,
                    metadata: EntryMetadata::from_fs(&meta),
                    depth: depth + 1,
                });
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}
