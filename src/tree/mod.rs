//! Integrity tree: the contract the change engine drives, plus the shipped
//! SHA-256 content Merkle tree and the directory walker it is built from.

pub mod merkle;
pub mod walker;

use std::path::Path;

use crate::core::errors::Result;

pub use merkle::{FileMerkleTree, MerkleHash, ZERO_HASH, hash_file, hash_hex};

/// Hash tree over a monitored directory.
///
/// The engine only queries and commands the tree; it never replaces it.
/// Implementations must keep the previous root authoritative when
/// [`rebuild`](IntegrityTree::rebuild) fails.
pub trait IntegrityTree: Send + Sync {
    /// Directory the tree is rooted at.
    fn root_directory(&self) -> &Path;

    /// Whether `path` is currently a leaf or an ancestor in the tree.
    fn is_tracked(&self, path: &Path) -> bool;

    /// Current root digest.
    fn root_digest(&self) -> MerkleHash;

    /// Reconstruct the whole tree from disk.
    fn rebuild(&mut self) -> Result<()>;

    /// Detach `path` and its descendants from the tracked set.
    fn stop_tracking(&mut self, path: &Path);
}
