//! Re-validate a proof artifact against the file it attests and, optionally,
//! against a freshly built integrity tree.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::errors::Result;
use crate::proof::artifact::ProofArtifact;
use crate::tree::{IntegrityTree, hash_file, hash_hex};

/// Outcome of checking one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub file: PathBuf,
    /// Hex of the file's current content digest.
    pub computed_file_hash: String,
    pub file_hash_matches: bool,
    /// `None` when no tree was consulted.
    pub merkle_root_matches: Option<bool>,
    /// `proven_time >= ideal_time`.
    pub time_ordered: bool,
}

impl VerificationReport {
    /// Content (and root, when checked) agree with the artifact.
    ///
    /// Time ordering is reported but does not fail verification.
    pub fn is_valid(&self) -> bool {
        self.file_hash_matches && self.merkle_root_matches.unwrap_or(true)
    }
}

/// Hash `file` with the tree's leaf hash and compare it to the artifact.
pub fn verify_file(proof: &ProofArtifact, file: &Path) -> Result<VerificationReport> {
    let digest = hash_file(file)?;
    Ok(VerificationReport {
        file: file.to_path_buf(),
        computed_file_hash: hash_hex(&digest),
        file_hash_matches: proof.file_hash() == digest.as_slice(),
        merkle_root_matches: None,
        time_ordered: proof.is_time_ordered(),
    })
}

/// [`verify_file`], plus a check that the artifact's root is `tree`'s root.
pub fn verify_against_tree<T: IntegrityTree + ?Sized>(
    proof: &ProofArtifact,
    file: &Path,
    tree: &T,
) -> Result<VerificationReport> {
    let mut report = verify_file(proof, file)?;
    report.merkle_root_matches = Some(proof.merkle_root() == tree.root_digest().as_slice());
    Ok(report)
}
