//! PVB-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, PvbError>;

/// Top-level error type for provebit.
#[derive(Debug, Error)]
pub enum PvbError {
    #[error("[PVB-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[PVB-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[PVB-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[PVB-2001] unrecognized filesystem event for {path}: {details}")]
    Classification { path: PathBuf, details: String },

    #[error("[PVB-2002] tree reconstruction failed at {path}: {details}")]
    Reconstruction { path: PathBuf, details: String },

    #[error("[PVB-2003] watched root unavailable: {path}")]
    RootUnavailable { path: PathBuf },

    #[error("[PVB-2101] observer initialization failed for {path}: {details}")]
    ObserverInit { path: PathBuf, details: String },

    #[error("[PVB-2102] observer teardown failed: {details}")]
    Teardown { details: String },

    #[error("[PVB-2201] cannot decode proof field '{field}': {details}")]
    ProofDecoding { field: &'static str, details: String },

    #[error("[PVB-2202] malformed proof document: {details}")]
    ProofFormat { details: String },

    #[error("[PVB-2203] proof document is missing field '{field}'")]
    ProofMissingField { field: &'static str },

    #[error("[PVB-2204] unsupported proof version {found:?} (expected {expected:?})")]
    ProofVersion {
        found: String,
        expected: &'static str,
    },

    #[error("[PVB-2301] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[PVB-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[PVB-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl PvbError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "PVB-1001",
            Self::MissingConfig { .. } => "PVB-1002",
            Self::ConfigParse { .. } => "PVB-1003",
            Self::Classification { .. } => "PVB-2001",
            Self::Reconstruction { .. } => "PVB-2002",
            Self::RootUnavailable { .. } => "PVB-2003",
            Self::ObserverInit { .. } => "PVB-2101",
            Self::Teardown { .. } => "PVB-2102",
            Self::ProofDecoding { .. } => "PVB-2201",
            Self::ProofFormat { .. } => "PVB-2202",
            Self::ProofMissingField { .. } => "PVB-2203",
            Self::ProofVersion { .. } => "PVB-2204",
            Self::Serialization { .. } => "PVB-2301",
            Self::Io { .. } => "PVB-3002",
            Self::Runtime { .. } => "PVB-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Reconstruction { .. } | Self::Runtime { .. }
        )
    }

    /// Whether the polling daemon must stop when this error surfaces from a tick.
    ///
    /// Everything else is local to the event that caused it.
    #[must_use]
    pub const fn is_fatal_to_daemon(&self) -> bool {
        matches!(
            self,
            Self::RootUnavailable { .. } | Self::ObserverInit { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for PvbError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for PvbError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Serialization {
            context: "serde_yaml",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for PvbError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
