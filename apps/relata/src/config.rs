//! # Configuration
//!
//! Optional TOML configuration file (`relata.toml` in the working directory,
//! or `--config <path>`). Every key is optional; command line flags take
//! precedence over the file.
//!
//! ```toml
//! workspace = "studies.db"
//! backend = "redb"          # "file" | "redb"
//! log_format = "json"       # "text" | "json"
//! uid_source = "sequential" # "uuid" | "sequential"
//! ```

use clap::ValueEnum;
use relata_core::RelataError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "relata.toml";

/// Workspace path used when neither flag nor config names one.
pub const DEFAULT_WORKSPACE: &str = "relata.db";

/// Prefix of relation UIDs produced by the sequential UID source.
pub const SEQUENTIAL_UID_PREFIX: &str = "rel";

/// Maximum accepted config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Where the workspace is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Postcard snapshot file.
    File,
    /// redb database.
    #[default]
    Redb,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// How new relation UIDs are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UidMode {
    /// Random v4 UUIDs.
    #[default]
    Uuid,
    /// `rel-1`, `rel-2`, ... continuing after the highest stored one.
    Sequential,
}

/// Contents of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub log_format: Option<LogFormat>,
    pub uid_source: Option<UidMode>,
}

impl Config {
    /// Parse config text.
    pub fn from_toml(text: &str) -> Result<Self, RelataError> {
        toml::from_str(text)
            .map_err(|e| RelataError::InvalidArgument(format!("Invalid config: {}", e)))
    }

    /// Load `explicit`, or the default file if present, or the defaults.
    ///
    /// An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, RelataError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let metadata = std::fs::metadata(&path).map_err(|e| {
            RelataError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(RelataError::InvalidArgument(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(&path).map_err(|e| {
            RelataError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Log format: `RELATA_LOG_FORMAT` wins over the file.
    #[must_use]
    pub fn resolve_log_format(&self, env: Option<&str>) -> LogFormat {
        match env {
            Some(value) => LogFormat::from_str(value, true).unwrap_or_default(),
            None => self.log_format.unwrap_or_default(),
        }
    }
}
