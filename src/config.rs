//! Creator configuration
//!
//! The configuration is fixed when a [`Creator`](crate::Creator) is built, so
//! there is no way to change compression or indexing after writing starts.

use crate::error::{Result, ZimError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default uncompressed size at which a cluster is closed (2 MiB)
pub const DEFAULT_CLUSTER_SIZE: usize = 2 * 1024 * 1024;

/// Default number of compression worker threads
pub const DEFAULT_WORKERS: usize = 4;

/// Upper bound for worker threads
pub const MAX_WORKERS: usize = 64;

/// Cluster compression algorithms that can be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[serde(alias = "xz")]
    Lzma,
    Zstd,
}

impl Compression {
    pub fn name(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lzma => "lzma",
            Compression::Zstd => "zstd",
        }
    }
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Zstd
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compression {
    type Err = ZimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "zstd" => Ok(Compression::Zstd),
            "lzma" | "xz" => Ok(Compression::Lzma),
            other => Err(ZimError::InvalidConfig(format!(
                "Unknown compression algorithm: {}",
                other
            ))),
        }
    }
}

/// Full-text and title indexing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub enabled: bool,
    /// ISO 639-1 or 639-3 code driving stemming
    pub language: String,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            language: "eng".to_string(),
        }
    }
}

/// Immutable writer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreatorConfig {
    pub compression: Compression,
    pub cluster_size: usize,
    pub workers: usize,
    pub main_path: Option<String>,
    pub verbose: bool,
    pub indexing: IndexingConfig,
}

impl Default for CreatorConfig {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            cluster_size: DEFAULT_CLUSTER_SIZE,
            workers: DEFAULT_WORKERS,
            main_path: None,
            verbose: false,
            indexing: IndexingConfig::default(),
        }
    }
}

impl CreatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Uncompressed size at which clusters are closed; 0 puts each blob in its own cluster
    pub fn with_cluster_size(mut self, cluster_size: usize) -> Self {
        self.cluster_size = cluster_size;
        self
    }

    pub fn with_indexing(mut self, enabled: bool, language: &str) -> Self {
        self.indexing = IndexingConfig {
            enabled,
            language: language.to_string(),
        };
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_main_path(mut self, path: &str) -> Self {
        self.main_path = Some(path.to_string());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Check the configuration once, before any file is opened
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ZimError::InvalidConfig(format!(
                "workers must be between 1 and {}, got {}",
                MAX_WORKERS, self.workers
            )));
        }
        if self.indexing.enabled && self.indexing.language.trim().is_empty() {
            return Err(ZimError::InvalidConfig(
                "indexing language must not be empty".to_string(),
            ));
        }
        if let Some(main) = &self.main_path {
            if main.is_empty() {
                return Err(ZimError::InvalidConfig(
                    "main path must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: CreatorConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }
}
