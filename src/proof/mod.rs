//! Proof artifacts: the in-memory model, its persisted YAML form, and
//! verification against a file and a tree root.

pub mod artifact;
pub mod codec;
pub mod verify;

pub use artifact::{DOCUMENT_PROOF_TYPE, FORMAT_VERSION, ProofArtifact};
pub use codec::{DecodeOptions, PersistedProof, VersionPolicy};
pub use verify::{VerificationReport, verify_against_tree, verify_file};
