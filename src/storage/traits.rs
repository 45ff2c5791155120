//! Storage port definitions
//!
//! The annotation store and the migrations talk to persistence only through
//! `KvStore`: an async key-value interface with two scopes and a change feed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Quota exceeded in {scope} storage: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded {
        scope: StorageScope,
        needed: usize,
        quota: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Which storage area a key lives in.
///
/// `Sync` mirrors a remotely-synced area with a much smaller quota than
/// `Local`. Current data lives in `Local`; `Sync` only holds data written by
/// older generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageScope {
    Local,
    Sync,
}

impl StorageScope {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageScope::Local => "local",
            StorageScope::Sync => "sync",
        }
    }
}

impl std::fmt::Display for StorageScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notification: these keys in this scope were written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub scope: StorageScope,
    pub keys: Vec<String>,
}

/// Per-scope capacity limits in bytes (key length + serialized value).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quotas {
    pub local: Option<usize>,
    pub sync: Option<usize>,
}

impl Quotas {
    pub fn unlimited() -> Self {
        Self {
            local: None,
            sync: None,
        }
    }

    pub fn for_scope(&self, scope: StorageScope) -> Option<usize> {
        match scope {
            StorageScope::Local => self.local,
            StorageScope::Sync => self.sync,
        }
    }

    /// Reject a write that would take `scope` to `needed` bytes.
    pub fn check(&self, scope: StorageScope, needed: usize) -> StorageResult<()> {
        match self.for_scope(scope) {
            Some(quota) if needed > quota => Err(StorageError::QuotaExceeded {
                scope,
                needed,
                quota,
            }),
            _ => Ok(()),
        }
    }
}

impl Default for Quotas {
    fn default() -> Self {
        Self {
            local: Some(10 * 1024 * 1024),
            sync: Some(100 * 1024),
        }
    }
}

/// Bytes a single entry counts against its scope's quota.
pub(crate) fn entry_size(key: &str, value_json: &str) -> usize {
    key.len() + value_json.len()
}

/// Trait for key-value storage backends
///
/// Every call is a suspension point; callers must not assume two calls run
/// back to back. There is no locking across calls: read-modify-write
/// sequences from two callers can interleave and the last write wins.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read one key
    async fn get(&self, scope: StorageScope, key: &str) -> StorageResult<Option<Value>>;

    /// Write one key (insert or replace)
    async fn set(&self, scope: StorageScope, key: &str, value: Value) -> StorageResult<()>;

    /// Delete one key; deleting a missing key is not an error
    async fn remove(&self, scope: StorageScope, key: &str) -> StorageResult<()>;

    /// Every entry whose key starts with `prefix`, sorted by key
    async fn get_all_with_prefix(&self, scope: StorageScope, prefix: &str) -> StorageResult<Vec<(String, Value)>>;

    /// Subscribe to change notifications
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Extension trait for opening stores from paths
pub trait OpenKvStore: KvStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>, quotas: Quotas) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory(quotas: Quotas) -> StorageResult<Self>;
}
