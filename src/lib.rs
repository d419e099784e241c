#![forbid(unsafe_code)]

//! provebit (pvb) keeps a Merkle integrity tree of a directory in sync with
//! filesystem changes, and reads and writes document proofs that bind a file's
//! content hash to an anchored tree root.
//!
//! Main pieces:
//! 1. **Integrity tree**: domain-separated SHA-256 over every file and directory
//! 2. **Change monitor**: polling observer, event classification, rebuild trigger
//! 3. **Proof artifacts**: the nine-field YAML document and its verification
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use provebit::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use provebit::core::config::Config;
//! use provebit::tree::{FileMerkleTree, IntegrityTree};
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod logger;
pub mod monitor;
pub mod proof;
pub mod tree;
