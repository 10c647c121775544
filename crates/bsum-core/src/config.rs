use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BsumError, BsumResult};

/// Default block size: 1 MiB
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Default digest algorithm (128-bit MD5)
pub const DEFAULT_ALGORITHM: &str = "md5";

/// Top-level configuration (loaded from bsum.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BsumConfig {
    pub pipeline: PipelineConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bytes per block; the final short block is zero-padded to this size
    pub block_size: usize,
    /// Worker slot count (0 = logical processor count)
    pub workers: usize,
    /// Digest algorithm name, e.g. "md5", "sha256", "blake3"
    pub algorithm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            workers: 0,
            algorithm: DEFAULT_ALGORITHM.into(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl PipelineConfig {
    /// Resolve the configured worker count; `0` means one slot per logical
    /// processor. Never returns less than 1.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn validate(&self) -> BsumResult<()> {
        if self.block_size == 0 {
            return Err(BsumError::Config("block_size must be positive".into()));
        }
        if self.algorithm.trim().is_empty() {
            return Err(BsumError::Config("algorithm name is empty".into()));
        }
        Ok(())
    }
}

impl BsumConfig {
    pub fn from_toml_str(s: &str) -> BsumResult<Self> {
        let config: BsumConfig =
            toml::from_str(s).map_err(|e| BsumError::Config(format!("parsing config: {e}")))?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> BsumResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BsumError::Config(format!("reading {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }
}
