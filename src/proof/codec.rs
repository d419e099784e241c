//! Proof artifact codec: a flat, string-only key/value form and its YAML text.
//!
//! Byte fields are lowercase hex without separators. Timestamps are UTC in the
//! form `YYYY-MM-DD HH:MM:SS.f`, with the fraction trimmed of trailing zeros
//! but never empty. Decoding is strict: every key must be present, every value
//! must be a string, and the artifact is only built once every field decoded.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{PvbError, Result};
use crate::proof::artifact::{FORMAT_VERSION, ProofArtifact};

/// Persisted form: key name to string value.
pub type PersistedProof = BTreeMap<String, String>;

pub const KEY_TYPE: &str = "Type";
pub const KEY_VERSION: &str = "Version";
pub const KEY_IDEAL_TIME: &str = "Ideal Time";
pub const KEY_PROVEN_TIME: &str = "Proven Time";
pub const KEY_TRANSACTION_PATH: &str = "Transaction Path";
pub const KEY_TRANSACTION_ID: &str = "Transaction ID";
pub const KEY_MERKLE_ROOT: &str = "Merkle Root";
pub const KEY_BLOCK_ID: &str = "Block ID";
pub const KEY_FILE_HASH: &str = "File Hash";

/// Every key of the persisted form, in field order.
pub const KEYS: [&str; 9] = [
    KEY_TYPE,
    KEY_VERSION,
    KEY_IDEAL_TIME,
    KEY_PROVEN_TIME,
    KEY_TRANSACTION_PATH,
    KEY_TRANSACTION_ID,
    KEY_MERKLE_ROOT,
    KEY_BLOCK_ID,
    KEY_FILE_HASH,
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ──────────────────── version policy ────────────────────

/// What decoding does with a `Version` other than [`FORMAT_VERSION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionPolicy {
    /// Decode silently.
    Accept,
    /// Decode, with a stderr notice.
    #[default]
    Warn,
    /// Fail with `ProofVersion`.
    Reject,
}

impl fmt::Display for VersionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accept => "accept",
            Self::Warn => "warn",
            Self::Reject => "reject",
        })
    }
}

impl FromStr for VersionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "unknown version policy {other:?} (expected accept, warn or reject)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub version_policy: VersionPolicy,
}

// ──────────────────── encode ────────────────────

pub fn encode(proof: &ProofArtifact) -> PersistedProof {
    let mut map = PersistedProof::new();
    map.insert(KEY_TYPE.to_string(), proof.document_proof_type.clone());
    map.insert(KEY_VERSION.to_string(), proof.version.clone());
    map.insert(KEY_IDEAL_TIME.to_string(), encode_timestamp(&proof.ideal_time));
    map.insert(KEY_PROVEN_TIME.to_string(), encode_timestamp(&proof.proven_time));
    map.insert(KEY_TRANSACTION_PATH.to_string(), hex::encode(&proof.transaction_path));
    map.insert(KEY_TRANSACTION_ID.to_string(), hex::encode(&proof.transaction_id));
    map.insert(KEY_MERKLE_ROOT.to_string(), hex::encode(&proof.merkle_root));
    map.insert(KEY_BLOCK_ID.to_string(), hex::encode(&proof.block_id));
    map.insert(KEY_FILE_HASH.to_string(), hex::encode(&proof.file_hash));
    map
}

/// Canonical timestamp text: `2016-03-01 12:00:00.5`.
pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    let nanos = format!("{:09}", ts.timestamp_subsec_nanos());
    let fraction = match nanos.trim_end_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    format!("{}.{fraction}", ts.format("%Y-%m-%d %H:%M:%S"))
}

// ──────────────────── decode ────────────────────

/// Decode with the default [`DecodeOptions`].
pub fn decode(map: &PersistedProof) -> Result<ProofArtifact> {
    decode_with(map, &DecodeOptions::default())
}

pub fn decode_with(map: &PersistedProof, options: &DecodeOptions) -> Result<ProofArtifact> {
    if let Some(unknown) = map.keys().find(|k| !KEYS.contains(&k.as_str())) {
        return Err(PvbError::ProofFormat {
            details: format!("unexpected key {unknown:?}"),
        });
    }
    let field = |key: &'static str| {
        map.get(key)
            .map(String::as_str)
            .ok_or(PvbError::ProofMissingField { field: key })
    };
    for key in KEYS {
        field(key)?;
    }

    let version = field(KEY_VERSION)?;
    check_version(version, options.version_policy)?;

    Ok(ProofArtifact {
        document_proof_type: field(KEY_TYPE)?.to_string(),
        version: version.to_string(),
        ideal_time: decode_timestamp(KEY_IDEAL_TIME, field(KEY_IDEAL_TIME)?)?,
        proven_time: decode_timestamp(KEY_PROVEN_TIME, field(KEY_PROVEN_TIME)?)?,
        transaction_path: decode_hex(KEY_TRANSACTION_PATH, field(KEY_TRANSACTION_PATH)?)?,
        transaction_id: decode_hex(KEY_TRANSACTION_ID, field(KEY_TRANSACTION_ID)?)?,
        merkle_root: decode_hex(KEY_MERKLE_ROOT, field(KEY_MERKLE_ROOT)?)?,
        block_id: decode_hex(KEY_BLOCK_ID, field(KEY_BLOCK_ID)?)?,
        file_hash: decode_hex(KEY_FILE_HASH, field(KEY_FILE_HASH)?)?,
    })
}

/// Decode an already-parsed YAML document. The top level must be a mapping of
/// strings to strings.
pub fn decode_value(value: &serde_yaml::Value, options: &DecodeOptions) -> Result<ProofArtifact> {
    let serde_yaml::Value::Mapping(mapping) = value else {
        return Err(PvbError::ProofFormat {
            details: "top level is not a key/value mapping".to_string(),
        });
    };

    let mut map = PersistedProof::new();
    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            return Err(PvbError::ProofFormat {
                details: format!("non-string key {key:?}"),
            });
        };
        let Some(text) = value.as_str() else {
            return Err(PvbError::ProofFormat {
                details: format!("value of {key:?} is not a string"),
            });
        };
        map.insert(key.to_string(), text.to_string());
    }
    decode_with(&map, options)
}

pub fn decode_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| PvbError::ProofDecoding {
            field,
            details: format!("bad timestamp {raw:?}: {e}"),
        })
}

pub fn decode_hex(field: &'static str, raw: &str) -> Result<Vec<u8>> {
    if raw.bytes().any(|b| b.is_ascii_uppercase()) {
        return Err(PvbError::ProofDecoding {
            field,
            details: "hex must be lowercase".to_string(),
        });
    }
    hex::decode(raw).map_err(|e| PvbError::ProofDecoding {
        field,
        details: e.to_string(),
    })
}

fn check_version(found: &str, policy: VersionPolicy) -> Result<()> {
    if found == FORMAT_VERSION {
        return Ok(());
    }
    match policy {
        VersionPolicy::Accept => Ok(()),
        VersionPolicy::Warn => {
            eprintln!(
                "[PVB-PROOF] proof version {found:?} differs from {FORMAT_VERSION:?}, decoding anyway"
            );
            Ok(())
        }
        VersionPolicy::Reject => Err(PvbError::ProofVersion {
            found: found.to_string(),
            expected: FORMAT_VERSION,
        }),
    }
}

// ──────────────────── text and files ────────────────────

pub fn to_yaml_string(proof: &ProofArtifact) -> Result<String> {
    Ok(serde_yaml::to_string(&encode(proof))?)
}

pub fn from_yaml_str(text: &str, options: &DecodeOptions) -> Result<ProofArtifact> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| PvbError::ProofFormat {
            details: e.to_string(),
        })?;
    decode_value(&value, options)
}

/// Write the YAML form atomically: temp file, then rename over `path`.
pub fn write_to_file(proof: &ProofArtifact, path: &Path) -> Result<()> {
    let text = to_yaml_string(proof)?;
    let temp_path = path.with_extension("tmp");

    if let Some(parent) = temp_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| PvbError::io(parent, e))?;
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| PvbError::io(&temp_path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(text.as_bytes())
        .map_err(|e| PvbError::io(&temp_path, e))?;
    writer.flush().map_err(|e| PvbError::io(&temp_path, e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| PvbError::io(&temp_path, e))?;
    drop(writer);

    fs::rename(&temp_path, path).map_err(|e| PvbError::io(path, e))?;
    Ok(())
}

pub fn read_from_file(path: &Path, options: &DecodeOptions) -> Result<ProofArtifact> {
    let text = fs::read_to_string(path).map_err(|e| PvbError::io(path, e))?;
    from_yaml_str(&text, options)
}
