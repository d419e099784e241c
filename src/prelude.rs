//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use provebit::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, DaemonConfig};
pub use crate::core::errors::{PvbError, Result};

// Tree
pub use crate::tree::{FileMerkleTree, IntegrityTree, MerkleHash, ZERO_HASH, hash_file, hash_hex};

// Monitor
pub use crate::monitor::engine::{ChangeEngine, EventOutcome};
pub use crate::monitor::events::{ClassifiedEvent, EventKind, RawAction, RawEntryType, RawEvent};
pub use crate::monitor::observer::DirectoryObserver;

// Daemon
pub use crate::daemon::loop_main::{DaemonHandle, DaemonState, MerkleDaemon};

// Logging
pub use crate::logger::change_log::{ChangeLog, ChangeLogEntry, EntryKind};

// Proof
pub use crate::proof::{
    DecodeOptions, ProofArtifact, VerificationReport, VersionPolicy, verify_against_tree,
    verify_file,
};
