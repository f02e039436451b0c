//! Configuration system for Shard.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SHARD_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/shard/config.toml
//!   3. ~/.config/shard/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::codec::{validate_chunk_size, ChunkCodec};
use crate::error::TransferError;
use crate::transform::{TransformKind, DEFAULT_COMPRESSION_LEVEL};
use crate::wire::{CHUNK_OVERHEAD, DEFAULT_CHUNK_SIZE, MAX_FRAME_LEN};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    pub network: NetworkConfig,
    pub transfer: TransferConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the daemon listens on.
    pub bind_addr: String,
    /// TCP port the daemon listens on. Also the default port for
    /// `shard-ctl send`, which connects to 127.0.0.1 unless `--host` is given.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Encoded bytes per chunk.
    pub chunk_size: usize,
    pub transform: TransformKind,
    /// zstd level. Ignored by other transforms.
    pub compression_level: i32,
    /// Randomize send order.
    pub shuffle: bool,
    /// Per-read deadline on inbound connections. 0 = wait forever.
    pub read_timeout_secs: u64,
    /// Largest outer frame length the receiver will allocate for.
    pub max_frame_len: usize,
    /// How long the daemon lets in-flight transfers finish on shutdown.
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where the daemon writes reassembled payloads.
    pub output_dir: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            transform: TransformKind::Zstd,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            shuffle: false,
            read_timeout_secs: 0,
            max_frame_len: MAX_FRAME_LEN,
            shutdown_grace_secs: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: data_dir().join("received"),
        }
    }
}

impl TransferConfig {
    /// Codec for the configured transform.
    pub fn codec(&self) -> ChunkCodec {
        ChunkCodec::new(self.transform.build(self.compression_level))
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("shard")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("shard")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error(transparent)]
    Invalid(#[from] TransferError),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ShardConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path, falling back to defaults if it is absent.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            ShardConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SHARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&ShardConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Fail fast on settings that would make every transfer fail.
    pub fn validate(&self) -> Result<(), TransferError> {
        let transfer = &self.transfer;
        validate_chunk_size(transfer.chunk_size)?;
        let full_frame = transfer.chunk_size + CHUNK_OVERHEAD;
        if full_frame > transfer.max_frame_len {
            return Err(TransferError::InvalidConfig(format!(
                "max_frame_len {} cannot hold a full {}-byte chunk ({full_frame} bytes framed)",
                transfer.max_frame_len, transfer.chunk_size
            )));
        }
        Ok(())
    }

    /// `host:port` for the configured endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.network.bind_addr, self.network.port)
    }

    /// Apply SHARD_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("SHARD_NETWORK__BIND_ADDR") {
            self.network.bind_addr = v;
        }
        if let Some(p) = var("SHARD_NETWORK__PORT").and_then(|v| v.parse().ok()) {
            self.network.port = p;
        }
        if let Some(n) = var("SHARD_TRANSFER__CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.transfer.chunk_size = n;
        }
        if let Some(v) = var("SHARD_TRANSFER__SHUFFLE") {
            self.transfer.shuffle = v == "true" || v == "1";
        }
        if let Some(v) = var("SHARD_STORAGE__OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(v);
        }
    }
}
