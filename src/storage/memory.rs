//! In-memory storage backend

use super::traits::{entry_size, KvStore, Quotas, StorageChange, StorageError, StorageResult, StorageScope};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

const CHANGE_CAPACITY: usize = 256;

/// DashMap-backed store with per-scope quotas.
///
/// `set_unavailable(true)` makes every call fail, which is how tests exercise
/// the "storage failed, degrade quietly" paths.
pub struct MemoryKv {
    entries: DashMap<(StorageScope, String), Value>,
    quotas: Quotas,
    unavailable: AtomicBool,
    changes: broadcast::Sender<StorageChange>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::with_quotas(Quotas::default())
    }

    pub fn with_quotas(quotas: Quotas) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            entries: DashMap::new(),
            quotas,
            unavailable: AtomicBool::new(false),
            changes,
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All keys in `scope`, sorted.
    pub fn keys(&self, scope: StorageScope) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == scope)
            .map(|e| e.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("storage context invalidated".to_string()))
        } else {
            Ok(())
        }
    }

    fn scope_usage_without(&self, scope: StorageScope, skip: &str) -> StorageResult<usize> {
        let mut total = 0;
        for entry in self.entries.iter() {
            let (s, k) = entry.key();
            if *s == scope && k != skip {
                total += entry_size(k, &serde_json::to_string(entry.value())?);
            }
        }
        Ok(total)
    }

    fn notify(&self, scope: StorageScope, key: &str) {
        // No receivers is fine
        let _ = self.changes.send(StorageChange {
            scope,
            keys: vec![key.to_string()],
        });
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, scope: StorageScope, key: &str) -> StorageResult<Option<Value>> {
        self.check_available()?;
        Ok(self
            .entries
            .get(&(scope, key.to_string()))
            .map(|v| v.value().clone()))
    }

    async fn set(&self, scope: StorageScope, key: &str, value: Value) -> StorageResult<()> {
        self.check_available()?;
        let json = serde_json::to_string(&value)?;
        let needed = self.scope_usage_without(scope, key)? + entry_size(key, &json);
        self.quotas.check(scope, needed)?;
        self.entries.insert((scope, key.to_string()), value);
        self.notify(scope, key);
        Ok(())
    }

    async fn remove(&self, scope: StorageScope, key: &str) -> StorageResult<()> {
        self.check_available()?;
        if self.entries.remove(&(scope, key.to_string())).is_some() {
            self.notify(scope, key);
        }
        Ok(())
    }

    async fn get_all_with_prefix(&self, scope: StorageScope, prefix: &str) -> StorageResult<Vec<(String, Value)>> {
        self.check_available()?;
        let mut out: Vec<(String, Value)> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == scope && e.key().1.starts_with(prefix))
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_remove() {
        let kv = MemoryKv::new();
        kv.set(StorageScope::Local, "stars", json!([])).await.unwrap();
        assert_eq!(kv.get(StorageScope::Local, "stars").await.unwrap(), Some(json!([])));
        assert_eq!(kv.get(StorageScope::Sync, "stars").await.unwrap(), None);
        kv.remove(StorageScope::Local, "stars").await.unwrap();
        kv.remove(StorageScope::Local, "stars").await.unwrap();
        assert_eq!(kv.get(StorageScope::Local, "stars").await.unwrap(), None);
    }

    #[tokio::test]
    async fn prefix_scan_is_sorted_and_scoped() {
        let kv = MemoryKv::new();
        kv.set(StorageScope::Local, "star:b", json!(2)).await.unwrap();
        kv.set(StorageScope::Local, "star:a", json!(1)).await.unwrap();
        kv.set(StorageScope::Local, "pin:a", json!(3)).await.unwrap();
        kv.set(StorageScope::Sync, "star:c", json!(4)).await.unwrap();
        let found = kv.get_all_with_prefix(StorageScope::Local, "star:").await.unwrap();
        assert_eq!(
            found,
            vec![("star:a".to_string(), json!(1)), ("star:b".to_string(), json!(2))]
        );
    }

    #[tokio::test]
    async fn sync_quota_is_enforced() {
        let kv = MemoryKv::with_quotas(Quotas {
            local: None,
            sync: Some(32),
        });
        let big = json!("x".repeat(64));
        assert!(matches!(
            kv.set(StorageScope::Sync, "k", big.clone()).await,
            Err(StorageError::QuotaExceeded { .. })
        ));
        kv.set(StorageScope::Local, "k", big).await.unwrap();
    }

    #[tokio::test]
    async fn replacing_a_key_does_not_double_count() {
        let kv = MemoryKv::with_quotas(Quotas {
            local: Some(20),
            sync: None,
        });
        kv.set(StorageScope::Local, "k", json!("0123456789")).await.unwrap();
        kv.set(StorageScope::Local, "k", json!("9876543210")).await.unwrap();
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let kv = MemoryKv::new();
        kv.set_unavailable(true);
        assert!(kv.get(StorageScope::Local, "k").await.is_err());
        assert!(kv.set(StorageScope::Local, "k", json!(1)).await.is_err());
    }

    #[tokio::test]
    async fn writes_are_broadcast() {
        let kv = MemoryKv::new();
        let mut rx = kv.subscribe();
        kv.set(StorageScope::Sync, "stars", json!([])).await.unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change.scope, StorageScope::Sync);
        assert_eq!(change.keys, vec!["stars".to_string()]);
    }
}
