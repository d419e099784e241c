//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{PvbError, Result};
use crate::proof::codec::VersionPolicy;

/// Full provebit configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub proof: ProofConfig,
    pub paths: PathsConfig,
}

/// Polling daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory whose integrity tree the daemon maintains.
    pub watch_dir: PathBuf,
    /// Fixed sleep between observer ticks. Must be > 0.
    pub poll_interval_ms: u64,
    /// Mirror every change-log line to the JSONL file in `paths.change_log`.
    pub persist_change_log: bool,
}

/// Proof artifact codec settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ProofConfig {
    pub version_policy: VersionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub change_log: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            watch_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            poll_interval_ms: 1_000,
            persist_change_log: false,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[PVB-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("provebit").join("config.toml");
        let data = home_dir.join(".local").join("share").join("provebit");
        Self {
            config_file: cfg,
            change_log: data.join("changes.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| PvbError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(PvbError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("PVB_DAEMON_WATCH_DIR") {
            self.daemon.watch_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("PVB_DAEMON_POLL_INTERVAL_MS") {
            self.daemon.poll_interval_ms = parse_env_u64("PVB_DAEMON_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("PVB_DAEMON_PERSIST_CHANGE_LOG") {
            self.daemon.persist_change_log =
                parse_env_bool("PVB_DAEMON_PERSIST_CHANGE_LOG", &raw)?;
        }
        if let Some(raw) = lookup("PVB_PROOF_VERSION_POLICY") {
            self.proof.version_policy = raw.parse().map_err(|details| PvbError::ConfigParse {
                context: "env",
                details: format!("PVB_PROOF_VERSION_POLICY={raw:?}: {details}"),
            })?;
        }
        if let Some(raw) = lookup("PVB_CHANGE_LOG_PATH") {
            self.paths.change_log = PathBuf::from(raw);
        }
        Ok(())
    }

    /// Strip trailing slashes so path comparisons against walk output line up.
    fn normalize_paths(&mut self) {
        let s = self.daemon.watch_dir.to_string_lossy();
        if s.len() > 1
            && let Some(stripped) = s.strip_suffix('/')
        {
            self.daemon.watch_dir = PathBuf::from(stripped);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.daemon.poll_interval_ms == 0 {
            return Err(PvbError::InvalidConfig {
                details: "daemon.poll_interval_ms must be > 0".to_string(),
            });
        }
        if self.daemon.watch_dir.as_os_str().is_empty() {
            return Err(PvbError::InvalidConfig {
                details: "daemon.watch_dir must not be empty".to_string(),
            });
        }
        if self.daemon.persist_change_log && self.paths.change_log.as_os_str().is_empty() {
            return Err(PvbError::InvalidConfig {
                details: "paths.change_log is required when daemon.persist_change_log=true"
                    .to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| PvbError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PvbError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: expected a boolean"),
        }),
    }
}
