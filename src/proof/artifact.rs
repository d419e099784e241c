//! Proof artifact: binds a file's content hash, at a point in time, to a tree
//! root and to the external transaction that anchors that root.

#![allow(missing_docs)]

use chrono::{DateTime, Utc};

/// Value of the `Type` field for artifacts this crate writes.
pub const DOCUMENT_PROOF_TYPE: &str = "Document Proof";

/// Format version for artifacts this crate writes.
pub const FORMAT_VERSION: &str = "0.1";

/// One document proof.
///
/// Fresh artifacts carry [`DOCUMENT_PROOF_TYPE`] and [`FORMAT_VERSION`]; a
/// decoded artifact keeps the strings it was read with. Byte fields are opaque
/// to this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofArtifact {
    pub(crate) document_proof_type: String,
    pub(crate) version: String,
    pub(crate) ideal_time: DateTime<Utc>,
    pub(crate) proven_time: DateTime<Utc>,
    pub(crate) transaction_path: Vec<u8>,
    pub(crate) transaction_id: Vec<u8>,
    pub(crate) merkle_root: Vec<u8>,
    pub(crate) block_id: Vec<u8>,
    pub(crate) file_hash: Vec<u8>,
}

impl ProofArtifact {
    /// Artifact for `file_hash` under `merkle_root`, stamped now, with empty
    /// anchoring fields to be filled in by the setters.
    pub fn new(merkle_root: impl Into<Vec<u8>>, file_hash: impl Into<Vec<u8>>) -> Self {
        let now = Utc::now();
        Self {
            document_proof_type: DOCUMENT_PROOF_TYPE.to_string(),
            version: FORMAT_VERSION.to_string(),
            ideal_time: now,
            proven_time: now,
            transaction_path: Vec::new(),
            transaction_id: Vec::new(),
            merkle_root: merkle_root.into(),
            block_id: Vec::new(),
            file_hash: file_hash.into(),
        }
    }

    pub fn document_proof_type(&self) -> &str {
        &self.document_proof_type
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub const fn ideal_time(&self) -> DateTime<Utc> {
        self.ideal_time
    }

    pub const fn proven_time(&self) -> DateTime<Utc> {
        self.proven_time
    }

    pub fn transaction_path(&self) -> &[u8] {
        &self.transaction_path
    }

    pub fn transaction_id(&self) -> &[u8] {
        &self.transaction_id
    }

    pub fn merkle_root(&self) -> &[u8] {
        &self.merkle_root
    }

    pub fn block_id(&self) -> &[u8] {
        &self.block_id
    }

    pub fn file_hash(&self) -> &[u8] {
        &self.file_hash
    }

    /// Whether the proof was confirmed no earlier than it was requested.
    /// Not enforced here; verification reports it.
    pub fn is_time_ordered(&self) -> bool {
        self.proven_time >= self.ideal_time
    }

    // ──────────────────── setters ────────────────────

    pub fn set_ideal_time(&mut self, ts: DateTime<Utc>) -> &mut Self {
        self.ideal_time = ts;
        self
    }

    pub fn set_proven_time(&mut self, ts: DateTime<Utc>) -> &mut Self {
        self.proven_time = ts;
        self
    }

    pub fn set_transaction_path(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.transaction_path = bytes.into();
        self
    }

    pub fn set_transaction_id(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.transaction_id = bytes.into();
        self
    }

    pub fn set_merkle_root(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.merkle_root = bytes.into();
        self
    }

    pub fn set_block_id(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.block_id = bytes.into();
        self
    }

    pub fn set_file_hash(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.file_hash = bytes.into();
        self
    }
}
