use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ZinfoError, ZinfoResult};

/// Default uncompressed distance between checkpoints: 4 MiB
pub const DEFAULT_SPAN_SIZE: u64 = 4 * 1024 * 1024;

/// Top-level configuration (loaded from zinfo.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZinfoConfig {
    pub index: IndexConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Minimum uncompressed bytes between checkpoints
    pub span_size: u64,
    /// Verify the gzip CRC-32/ISIZE trailer while building
    pub verify_trailer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint; empty means use the local filesystem at `root`
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket holding layer blobs
    pub bucket: String,
    /// Root prefix (S3) or directory (local filesystem)
    pub root: String,
    /// Enforce HTTPS for S3 connections (error on HTTP endpoints)
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            span_size: DEFAULT_SPAN_SIZE,
            verify_trailer: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "us-east-1".into(),
            bucket: "layers".into(),
            root: "/".into(),
            enforce_tls: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ZinfoConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> ZinfoResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| ZinfoError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> ZinfoResult<Self> {
        toml::from_str(content).map_err(|e| ZinfoError::Config(e.to_string()))
    }
}

/// Default config location: `$XDG_CONFIG_HOME/zinfo/config.toml`
pub fn default_config_path() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from("/etc"));
    base.join("zinfo").join("config.toml")
}
