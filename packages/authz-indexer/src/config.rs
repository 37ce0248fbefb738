//! Indexer configuration (YAML)
//!
//! ```yaml
//! version: 1
//! partition_size: 1000
//! bulk:
//!   regular_flush_size: 1000
//!   large_flush_size: 5000
//! recovery:
//!   min_age_ms: 300000
//!   batch_size: 1000
//!   loop_limit: 10000
//!   initial_delay_ms: 300000
//!   interval_ms: 300000
//!   circuit_breaker_ratio: 0.7
//! index_dir: /var/lib/authz/index
//! ```
//!
//! Every field is optional, missing ones take the defaults above.

use authz_storage::MAX_AUTHORIZATION_QUERY_UUIDS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bulk::Size;
use crate::error::{IndexerError, Result};

/// Only supported schema version
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IndexerConfig {
    pub version: u32,

    /// Platform batch size for relational reads. The authorization query
    /// binds the entity list four times, so the loader uses half of it.
    pub partition_size: usize,

    pub bulk: BulkConfig,

    pub recovery: RecoveryConfig,

    /// Root directory of the search indexes; RAM indexes when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_dir: Option<PathBuf>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            partition_size: 1000,
            bulk: BulkConfig::default(),
            recovery: RecoveryConfig::default(),
            index_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BulkConfig {
    pub regular_flush_size: usize,
    pub large_flush_size: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            regular_flush_size: 1000,
            large_flush_size: 5000,
        }
    }
}

impl BulkConfig {
    pub fn flush_size(&self, size: Size) -> usize {
        match size {
            Size::Regular => self.regular_flush_size,
            Size::Large => self.large_flush_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RecoveryConfig {
    /// Items younger than this are left to the synchronous path
    pub min_age_ms: u64,
    pub batch_size: usize,
    /// Maximum number of items processed by one recovery pass
    pub loop_limit: usize,
    pub initial_delay_ms: u64,
    pub interval_ms: u64,
    /// A batch whose success ratio is at or below this value stops the pass
    pub circuit_breaker_ratio: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            min_age_ms: 5 * 60 * 1000,
            batch_size: 1000,
            loop_limit: 10_000,
            initial_delay_ms: 5 * 60 * 1000,
            interval_ms: 5 * 60 * 1000,
            circuit_breaker_ratio: 0.7,
        }
    }
}

impl RecoveryConfig {
    pub fn min_age(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.min_age_ms as i64)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(IndexerError::Config(format!(
                "Unsupported configuration version {}. Supported versions: {}",
                self.version, CONFIG_VERSION
            )));
        }
        if self.partition_size < 2 {
            return Err(IndexerError::config(
                "partition_size must be at least 2 (the loader uses half of it)",
            ));
        }
        if self.partition_size / 2 > MAX_AUTHORIZATION_QUERY_UUIDS {
            return Err(IndexerError::Config(format!(
                "partition_size {} exceeds {}: half of it is bound per authorization query",
                self.partition_size,
                MAX_AUTHORIZATION_QUERY_UUIDS * 2 + 1
            )));
        }
        let sizes = [
            ("bulk.regular_flush_size", self.bulk.regular_flush_size),
            ("bulk.large_flush_size", self.bulk.large_flush_size),
            ("recovery.batch_size", self.recovery.batch_size),
            ("recovery.loop_limit", self.recovery.loop_limit),
        ];
        for (field, value) in sizes {
            if value == 0 {
                return Err(IndexerError::Config(format!("{} must be positive", field)));
            }
        }
        let ratio = self.recovery.circuit_breaker_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(IndexerError::Config(format!(
                "recovery.circuit_breaker_ratio {} not in 0..=1",
                ratio
            )));
        }
        Ok(())
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: IndexerConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
