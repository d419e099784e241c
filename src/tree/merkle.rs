//! Content Merkle tree over a directory.
//!
//! Every regular file is a leaf whose digest is the SHA-256 of its content.
//! Directories are interior nodes that hash their name together with their
//! children's node hashes in sorted path order, so the root digest summarizes
//! both the content and the shape of the tracked tree. A rebuild computes a
//! complete new node map and swaps it in only on success; a failed rebuild
//! leaves the previous root authoritative.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{PvbError, Result};
use crate::core::paths::{name_bytes, resolve_absolute_path};
use crate::tree::IntegrityTree;
use crate::tree::walker::DirectoryWalker;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// 32-byte SHA-256 hash used throughout the Merkle tree.
pub type MerkleHash = [u8; 32];

/// Root digest of a tree that has never been built.
pub const ZERO_HASH: MerkleHash = [0u8; 32];

const FILE_NODE_TAG: u8 = 0x00;
const DIR_NODE_TAG: u8 = 0x01;
const READ_BUF_BYTES: usize = 64 * 1024;

/// A node in the Merkle tree: one tracked file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleNode {
    /// Combined hash of this node (and, for directories, its subtree).
    pub node_hash: MerkleHash,
    /// SHA-256 of the file content. `None` for directories.
    pub leaf_digest: Option<MerkleHash>,
    /// Depth below the tree root (the root itself is 0).
    pub depth: usize,
    /// Ordered child paths (directories only).
    pub children: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// FileMerkleTree
// ---------------------------------------------------------------------------

/// Merkle tree over the regular files under one root directory.
#[derive(Debug, Clone)]
pub struct FileMerkleTree {
    root_dir: PathBuf,
    nodes: BTreeMap<PathBuf, MerkleNode>,
    root_hash: MerkleHash,
    built_at: Option<DateTime<Utc>>,
}

impl FileMerkleTree {
    /// Create an empty, unbuilt tree for `root_dir`. Nothing is tracked and the
    /// root digest is [`ZERO_HASH`] until the first [`IntegrityTree::rebuild`].
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            root_dir: resolve_absolute_path(root_dir.as_ref()),
            nodes: BTreeMap::new(),
            root_hash: ZERO_HASH,
            built_at: None,
        }
    }

    /// Create and fully build a tree for `root_dir`.
    pub fn build(root_dir: impl AsRef<Path>) -> Result<Self> {
        let mut tree = Self::new(root_dir);
        tree.rebuild()?;
        Ok(tree)
    }

    /// Content digest of a tracked file.
    pub fn file_digest(&self, path: &Path) -> Option<MerkleHash> {
        self.nodes.get(path).and_then(|n| n.leaf_digest)
    }

    /// Node hash of any tracked path.
    pub fn node_hash(&self, path: &Path) -> Option<MerkleHash> {
        self.nodes.get(path).map(|n| n.node_hash)
    }

    /// Number of tracked files.
    pub fn leaf_count(&self) -> usize {
        self.nodes.values().filter(|n| n.leaf_digest.is_some()).count()
    }

    /// Number of tracked paths, directories (root included) and files.
    pub fn tracked_count(&self) -> usize {
        self.nodes.len()
    }

    /// When the last successful rebuild finished.
    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    /// Walk the root and hash everything into a fresh node map.
    fn compute_nodes(&self) -> Result<(BTreeMap<PathBuf, MerkleNode>, MerkleHash)> {
        let entries = DirectoryWalker::new(&self.root_dir).walk()?;

        let mut children_map: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
        children_map.insert(self.root_dir.clone(), Vec::new());
        for entry in &entries {
            if entry.metadata.is_dir {
                children_map.entry(entry.path.clone()).or_default();
            }
            if let Some(parent) = entry.path.parent() {
                children_map
                    .entry(parent.to_path_buf())
                    .or_default()
                    .push(entry.path.clone());
            }
        }
        for children in children_map.values_mut() {
            children.sort();
        }

        let mut nodes: BTreeMap<PathBuf, MerkleNode> = BTreeMap::new();

        // Leaves first: all file digests are known before any directory hashes.
        for entry in entries.iter().filter(|e| !e.metadata.is_dir) {
            let digest = hash_file(&entry.path).map_err(|err| match err {
                PvbError::Io { path, source } => PvbError::Reconstruction {
                    details: if source.kind() == ErrorKind::NotFound {
                        "file vanished during hashing".to_string()
                    } else {
                        source.to_string()
                    },
                    path,
                },
                other => other,
            })?;
            nodes.insert(
                entry.path.clone(),
                MerkleNode {
                    node_hash: file_node_hash(&entry.path, &digest),
                    leaf_digest: Some(digest),
                    depth: entry.depth,
                    children: Vec::new(),
                },
            );
        }

        // Directories deepest first so children are hashed before parents.
        let mut dirs: Vec<(PathBuf, usize)> = entries
            .iter()
            .filter(|e| e.metadata.is_dir)
            .map(|e| (e.path.clone(), e.depth))
            .collect();
        dirs.sort_by(|a, b| b.1.cmp(&a.1));
        dirs.push((self.root_dir.clone(), 0));

        for (path, depth) in dirs {
            let children = children_map.remove(&path).unwrap_or_default();
            // The root hashes with an empty name so relocating the tree keeps its digest.
            let name: &[u8] = if depth == 0 { &[] } else { name_bytes(&path) };
            let node_hash = dir_node_hash(name, &children, &nodes);
            nodes.insert(
                path,
                MerkleNode {
                    node_hash,
                    leaf_digest: None,
                    depth,
                    children,
                },
            );
        }

        let root_hash = nodes
            .get(&self.root_dir)
            .map_or(ZERO_HASH, |n| n.node_hash);
        Ok((nodes, root_hash))
    }
}

impl IntegrityTree for FileMerkleTree {
    fn root_directory(&self) -> &Path {
        &self.root_dir
    }

    fn is_tracked(&self, path: &Path) -> bool {
        self.nodes.contains_key(path)
    }

    fn root_digest(&self) -> MerkleHash {
        self.root_hash
    }

    fn rebuild(&mut self) -> Result<()> {
        let (nodes, root_hash) = self.compute_nodes()?;
        self.nodes = nodes;
        self.root_hash = root_hash;
        self.built_at = Some(Utc::now());
        Ok(())
    }

    /// Detach `path` and everything below it. The root digest is left as is
    /// until the next rebuild recomputes it.
    fn stop_tracking(&mut self, path: &Path) {
        let doomed: Vec<PathBuf> = self
            .nodes
            .range(path.to_path_buf()..)
            .take_while(|(p, _)| p.starts_with(path))
            .map(|(p, _)| p.clone())
            .collect();
        for p in &doomed {
            self.nodes.remove(p);
        }

        if let Some(parent) = path.parent()
            && let Some(parent_node) = self.nodes.get_mut(parent)
        {
            parent_node.children.retain(|c| c != path);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// SHA-256 of a file's content, streamed.
pub fn hash_file(path: &Path) -> Result<MerkleHash> {
    let mut file = File::open(path).map_err(|e| PvbError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_BYTES];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(PvbError::io(path, e)),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

fn file_node_hash(path: &Path, digest: &MerkleHash) -> MerkleHash {
    let mut hasher = Sha256::new();
    hasher.update([FILE_NODE_TAG]);
    hasher.update(name_bytes(path));
    hasher.update(digest);
    hasher.finalize().into()
}

fn dir_node_hash(
    name: &[u8],
    children: &[PathBuf],
    nodes: &BTreeMap<PathBuf, MerkleNode>,
) -> MerkleHash {
    let mut hasher = Sha256::new();
    hasher.update([DIR_NODE_TAG]);
    hasher.update(name);
    for child in children {
        let child_hash = nodes.get(child).map_or(ZERO_HASH, |n| n.node_hash);
        hasher.update(child_hash);
    }
    hasher.finalize().into()
}

/// Format a `MerkleHash` as lowercase hex (for logging/display).
pub fn hash_hex(hash: &MerkleHash) -> String {
    hex::encode(hash)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let tmp = TempDir::new().expect("temp dir");
        fs::create_dir_all(tmp.path().join("docs/nested")).unwrap();
        fs::write(tmp.path().join("docs/a.txt"), "alpha").unwrap();
        fs::write(tmp.path().join("docs/nested/b.txt"), "beta").unwrap();
        fs::write(tmp.path().join("top.txt"), "top").unwrap();
        tmp
    }

    #[test]
    fn unbuilt_tree_has_zero_root_and_tracks_nothing() {
        let tmp = fixture();
        let tree = FileMerkleTree::new(tmp.path());
        assert_eq!(tree.root_digest(), ZERO_HASH);
        assert!(!tree.is_tracked(tree.root_directory()));
        assert!(tree.built_at().is_none());
    }

    #[test]
    fn build_tracks_files_and_directories() {
        let tmp = fixture();
        let tree = FileMerkleTree::build(tmp.path()).unwrap();
        let root = tree.root_directory().to_path_buf();

        assert_eq!(tree.leaf_count(), 3);
        // root + docs + nested + 3 files
        assert_eq!(tree.tracked_count(), 6);
        assert!(tree.is_tracked(&root));
        assert!(tree.is_tracked(&root.join("docs/nested")));
        assert!(tree.is_tracked(&root.join("docs/a.txt")));
        assert_ne!(tree.root_digest(), ZERO_HASH);
        assert!(tree.built_at().is_some());
    }

    #[test]
    fn file_digest_is_content_sha256() {
        let tmp = fixture();
        let tree = FileMerkleTree::build(tmp.path()).unwrap();
        let a = tree.root_directory().join("docs/a.txt");
        let expected: MerkleHash = Sha256::digest(b"alpha").into();
        assert_eq!(tree.file_digest(&a), Some(expected));
        assert_eq!(hash_file(&a).unwrap(), expected);
        assert!(tree.file_digest(&tree.root_directory().join("docs")).is_none());
    }

    #[test]
    fn root_stable_for_same_content() {
        let tmp = fixture();
        let mut tree = FileMerkleTree::build(tmp.path()).unwrap();
        let before = tree.root_digest();
        fs::write(tree.root_directory().join("top.txt"), "top").unwrap();
        tree.rebuild().unwrap();
        assert_eq!(before, tree.root_digest());
    }

    #[test]
    fn root_changes_when_content_changes() {
        let tmp = fixture();
        let mut tree = FileMerkleTree::build(tmp.path()).unwrap();
        let before = tree.root_digest();
        fs::write(tree.root_directory().join("docs/nested/b.txt"), "BETA").unwrap();
        tree.rebuild().unwrap();
        assert_ne!(before, tree.root_digest());
    }

    #[test]
    fn root_changes_when_file_added() {
        let tmp = fixture();
        let mut tree = FileMerkleTree::build(tmp.path()).unwrap();
        let before = tree.root_digest();
        fs::write(tree.root_directory().join("docs/new.txt"), "").unwrap();
        tree.rebuild().unwrap();
        assert_ne!(before, tree.root_digest());
        assert_eq!(tree.leaf_count(), 4);
    }

    #[test]
    fn root_independent_of_location() {
        let a = fixture();
        let b = fixture();
        let ta = FileMerkleTree::build(a.path()).unwrap();
        let tb = FileMerkleTree::build(b.path()).unwrap();
        assert_eq!(ta.root_digest(), tb.root_digest());
    }

    #[test]
    fn renaming_a_file_changes_root() {
        let tmp = fixture();
        let mut tree = FileMerkleTree::build(tmp.path()).unwrap();
        let before = tree.root_digest();
        let root = tree.root_directory().to_path_buf();
        fs::rename(root.join("top.txt"), root.join("renamed.txt")).unwrap();
        tree.rebuild().unwrap();
        assert_ne!(before, tree.root_digest());
    }

    #[test]
    fn stop_tracking_detaches_subtree_without_touching_root() {
        let tmp = fixture();
        let mut tree = FileMerkleTree::build(tmp.path()).unwrap();
        let root = tree.root_directory().to_path_buf();
        let before = tree.root_digest();

        tree.stop_tracking(&root.join("docs"));

        assert!(!tree.is_tracked(&root.join("docs")));
        assert!(!tree.is_tracked(&root.join("docs/a.txt")));
        assert!(!tree.is_tracked(&root.join("docs/nested/b.txt")));
        assert!(tree.is_tracked(&root.join("top.txt")));
        assert_eq!(tree.root_digest(), before);
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn stop_tracking_does_not_touch_sibling_prefixes() {
        let tmp = fixture();
        fs::create_dir(tmp.path().join("docs2")).unwrap();
        fs::write(tmp.path().join("docs2/c.txt"), "c").unwrap();
        let mut tree = FileMerkleTree::build(tmp.path()).unwrap();
        let root = tree.root_directory().to_path_buf();

        tree.stop_tracking(&root.join("docs"));

        assert!(tree.is_tracked(&root.join("docs2")));
        assert!(tree.is_tracked(&root.join("docs2/c.txt")));
    }

    #[test]
    fn rebuild_with_missing_root_keeps_prior_state() {
        let tmp = fixture();
        let root = tmp.path().join("watched");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("x.txt"), "x").unwrap();

        let mut tree = FileMerkleTree::build(&root).unwrap();
        let before = tree.root_digest();
        fs::remove_dir_all(&root).unwrap();

        let err = tree.rebuild().unwrap_err();
        assert!(matches!(err, PvbError::RootUnavailable { .. }));
        assert_eq!(tree.root_digest(), before);
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn empty_directory_has_nonzero_root() {
        let tmp = TempDir::new().unwrap();
        let tree = FileMerkleTree::build(tmp.path()).unwrap();
        assert_ne!(tree.root_digest(), ZERO_HASH);
        assert_eq!(tree.leaf_count(), 0);
    }

    #[test]
    fn hash_hex_formatting() {
        let hash: MerkleHash = [0xab; 32];
        let hex = hash_hex(&hash);
        assert_eq!(hex.len(), 64);
        assert!(hex.starts_with("abab"));
    }
}
