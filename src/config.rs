//! Runtime configuration
//!
//! Loaded from YAML. Every field has a default, so an empty document (or no
//! file at all) yields a working configuration.

use crate::identity::PollPolicy;
use crate::storage::Quotas;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub identity: IdentityConfig,
    pub locator: LocatorConfig,
    pub storage: StorageConfig,
    pub migration: MigrationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Fixed delay between reconciliation attempts
    pub poll_interval_ms: u64,
    /// Attempt cap; exhaustion leaves the turn provisional
    pub max_poll_attempts: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            poll_interval_ms: policy.interval_ms,
            max_poll_attempts: policy.max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Quiet period after the last mutation before the container is recomputed
    pub debounce_ms: u64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub sync_quota_bytes: usize,
    pub local_quota_bytes: usize,
    pub db_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let quotas = Quotas::default();
        Self {
            sync_quota_bytes: quotas.sync.unwrap_or(102_400),
            local_quota_bytes: quotas.local.unwrap_or(10_485_760),
            db_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub key_renames: Vec<KeyRename>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        let rename = |from: &str, to: &str| KeyRename {
            from: from.to_string(),
            to: to.to_string(),
        };
        Self {
            key_renames: vec![
                rename("chatTimestamps", "conversationTimes"),
                rename("starredMessages", "stars"),
            ],
        }
    }
}

impl Config {
    /// Load and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("identity.poll_interval_ms must be > 0".into()));
        }
        if self.identity.max_poll_attempts == 0 {
            return Err(ConfigError::Invalid("identity.max_poll_attempts must be >= 1".into()));
        }
        if self.storage.sync_quota_bytes > self.storage.local_quota_bytes {
            return Err(ConfigError::Invalid(
                "storage.sync_quota_bytes must not exceed storage.local_quota_bytes".into(),
            ));
        }
        for rename in &self.migration.key_renames {
            if rename.from.is_empty() || rename.to.is_empty() {
                return Err(ConfigError::Invalid("migration.key_renames entries need from and to".into()));
            }
        }
        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval_ms: self.identity.poll_interval_ms,
            max_attempts: self.identity.max_poll_attempts,
        }
    }

    pub fn quotas(&self) -> Quotas {
        Quotas {
            local: Some(self.storage.local_quota_bytes),
            sync: Some(self.storage.sync_quota_bytes),
        }
    }
}
