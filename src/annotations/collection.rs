//! Array-valued record collections
//!
//! Each family lives under one storage key as a JSON array. Every operation
//! reads the whole array, changes it in memory, and writes it back. There is
//! no locking: two writers racing on the same family can lose one write.
//!
//! Public operations never return storage errors. Failures are logged and
//! reported as empty results or `false`; the `try_*` variants propagate.

use super::events::AnnotationEvent;
use super::record::{AnnotationRecord, Family, Keyed};
use super::url::{composite_id, normalize_url};
use crate::identity::TurnKey;
use crate::storage::{KvStore, StorageResult, StorageScope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct RecordCollection<T> {
    kv: Arc<dyn KvStore>,
    family: Family,
    events: broadcast::Sender<AnnotationEvent>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for RecordCollection<T> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
            family: self.family,
            events: self.events.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> RecordCollection<T>
where
    T: Keyed + Serialize + DeserializeOwned + Clone + Send + Sync,
{
    pub(crate) fn new(kv: Arc<dyn KvStore>, family: Family, events: broadcast::Sender<AnnotationEvent>) -> Self {
        Self {
            kv,
            family,
            events,
            _marker: PhantomData,
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Load the whole collection. Malformed entries are skipped but stay in
    /// storage.
    pub async fn try_load(&self) -> StorageResult<Vec<T>> {
        let (records, malformed) = self.load_split().await?;
        if !malformed.is_empty() {
            tracing::warn!(family = %self.family, count = malformed.len(), "skipping malformed records");
        }
        Ok(records)
    }

    /// Replace the whole collection, keeping any stored entries that could
    /// not be read as records.
    pub async fn try_save(&self, records: &[T]) -> StorageResult<()> {
        let (_, malformed) = self.load_split().await?;
        let mut items = Vec::with_capacity(records.len() + malformed.len());
        for record in records {
            items.push(serde_json::to_value(record)?);
        }
        items.extend(malformed);
        self.kv
            .set(StorageScope::Local, self.family.storage_key(), Value::Array(items))
            .await
    }

    /// Parsed records plus the raw entries that failed to parse.
    async fn load_split(&self) -> StorageResult<(Vec<T>, Vec<Value>)> {
        let Some(value) = self.kv.get(StorageScope::Local, self.family.storage_key()).await? else {
            return Ok((Vec::new(), Vec::new()));
        };
        let Value::Array(items) = value else {
            tracing::warn!(family = %self.family, "collection is not an array; treating as empty");
            return Ok((Vec::new(), Vec::new()));
        };
        let mut records = Vec::with_capacity(items.len());
        let mut malformed = Vec::new();
        for item in items {
            match serde_json::from_value::<T>(item.clone()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::debug!(family = %self.family, error = %e, "malformed record");
                    malformed.push(item);
                }
            }
        }
        Ok((records, malformed))
    }

    pub(crate) fn announce(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        let _ = self.events.send(AnnotationEvent {
            family: self.family,
            keys,
        });
    }

    fn log_failure(&self, op: &str, error: &crate::storage::StorageError) {
        tracing::warn!(family = %self.family, op, error = %error, "annotation storage failed");
    }

    pub async fn get_all(&self) -> Vec<T> {
        match self.try_load().await {
            Ok(records) => records,
            Err(e) => {
                self.log_failure("get_all", &e);
                Vec::new()
            }
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.get_all().await.into_iter().find(|r| r.key() == key)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Insert, or replace the record with the same key. Returns whether the
    /// write was persisted.
    pub async fn upsert(&self, record: T) -> bool {
        match self.try_upsert(record).await {
            Ok(key) => {
                self.announce(vec![key]);
                true
            }
            Err(e) => {
                self.log_failure("upsert", &e);
                false
            }
        }
    }

    async fn try_upsert(&self, record: T) -> StorageResult<String> {
        let mut records = self.try_load().await?;
        let key = record.key().to_string();
        match records.iter_mut().find(|r| r.key() == key) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.try_save(&records).await?;
        Ok(key)
    }

    /// Remove by key. Removing an absent key is a no-op returning `false`.
    pub async fn remove(&self, key: &str) -> bool {
        let result = self.try_remove(key).await;
        self.finish("remove", result, key)
    }

    pub(crate) async fn try_remove(&self, key: &str) -> StorageResult<bool> {
        let mut records = self.try_load().await?;
        let before = records.len();
        records.retain(|r| r.key() != key);
        if records.len() == before {
            return Ok(false);
        }
        self.try_save(&records).await?;
        Ok(true)
    }

    /// Apply `change` to the record with `key`. Absent key is a no-op.
    pub async fn update<F>(&self, key: &str, change: F) -> bool
    where
        F: FnOnce(&mut T) + Send,
    {
        let result = self.try_update(key, change).await;
        self.finish("update", result, key)
    }

    pub(crate) async fn try_update<F>(&self, key: &str, change: F) -> StorageResult<bool>
    where
        F: FnOnce(&mut T) + Send,
    {
        let mut records = self.try_load().await?;
        let Some(record) = records.iter_mut().find(|r| r.key() == key) else {
            return Ok(false);
        };
        change(record);
        self.try_save(&records).await?;
        Ok(true)
    }

    /// Run `transform` over every record; it returns true for records it
    /// changed. Writes once if anything changed and returns the count.
    pub async fn batch_update<F>(&self, transform: F) -> usize
    where
        F: FnMut(&mut T) -> bool + Send,
    {
        match self.try_batch_update(transform).await {
            Ok(keys) => {
                let count = keys.len();
                self.announce(keys);
                count
            }
            Err(e) => {
                self.log_failure("batch_update", &e);
                0
            }
        }
    }

    pub(crate) async fn try_batch_update<F>(&self, mut transform: F) -> StorageResult<Vec<String>>
    where
        F: FnMut(&mut T) -> bool + Send,
    {
        let mut records = self.try_load().await?;
        let mut changed = Vec::new();
        for record in records.iter_mut() {
            if transform(record) {
                changed.push(record.key().to_string());
            }
        }
        if !changed.is_empty() {
            self.try_save(&records).await?;
        }
        Ok(changed)
    }

    fn finish(&self, op: &str, result: StorageResult<bool>, key: &str) -> bool {
        match result {
            Ok(true) => {
                self.announce(vec![key.to_string()]);
                true
            }
            Ok(false) => false,
            Err(e) => {
                self.log_failure(op, &e);
                false
            }
        }
    }
}

impl RecordCollection<AnnotationRecord> {
    /// Records whose conversation URL normalizes to the same value as `url`.
    pub async fn get_by_url(&self, url: &str) -> Vec<AnnotationRecord> {
        let normalized = normalize_url(url);
        self.get_all()
            .await
            .into_iter()
            .filter(|r| r.url_without_protocol == normalized)
            .collect()
    }

    pub async fn records_in_folder(&self, folder_id: Option<&str>) -> Vec<AnnotationRecord> {
        self.get_all()
            .await
            .into_iter()
            .filter(|r| r.folder_id.as_deref() == folder_id)
            .collect()
    }

    /// Move the record for `(url, from)` to `(url, to)`.
    ///
    /// No-op when nothing is stored under `from`, so re-running after a
    /// completed move changes nothing. If `to` already has a record it is
    /// kept and the `from` record is dropped.
    pub(crate) async fn try_rekey_turn(&self, normalized_url: &str, from: &TurnKey, to: &TurnKey) -> StorageResult<bool> {
        let from_id = composite_id(normalized_url, from.as_str());
        let to_id = composite_id(normalized_url, to.as_str());
        let mut records = self.try_load().await?;
        let Some(pos) = records.iter().position(|r| r.key == from_id) else {
            return Ok(false);
        };
        let source = records.remove(pos);
        if !records.iter().any(|r| r.key == to_id) {
            records.insert(pos, source.rekeyed(to));
        }
        self.try_save(&records).await?;
        self.announce(vec![from_id, to_id]);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;
    use serde_json::json;

    fn stars() -> (RecordCollection<AnnotationRecord>, Arc<MemoryKv>) {
        let kv = Arc::new(MemoryKv::new());
        let (tx, _) = broadcast::channel(16);
        (RecordCollection::new(kv.clone(), Family::Stars, tx), kv)
    }

    fn record(key: &str, text: &str) -> AnnotationRecord {
        serde_json::from_value(json!({"key": key, "text": text})).unwrap()
    }

    #[tokio::test]
    async fn upsert_replaces_by_key() {
        let (c, _) = stars();
        assert!(c.upsert(record("url:5", "a")).await);
        assert!(c.upsert(record("url:5", "b")).await);
        assert!(c.upsert(record("url:6", "c")).await);
        let all = c.get_all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(c.get("url:5").await.unwrap().display_text, "b");
    }

    #[tokio::test]
    async fn remove_and_update_absent_keys_are_noops() {
        let (c, _) = stars();
        assert!(!c.remove("missing").await);
        assert!(!c.update("missing", |r| r.display_text = "x".into()).await);
        assert!(c.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn update_changes_one_record() {
        let (c, _) = stars();
        c.upsert(record("a:1", "old")).await;
        assert!(c.update("a:1", |r| r.display_text = "new".into()).await);
        assert_eq!(c.get("a:1").await.unwrap().display_text, "new");
    }

    #[tokio::test]
    async fn batch_update_counts_changes() {
        let (c, _) = stars();
        c.upsert(record("a:1", "x")).await;
        c.upsert(record("a:2", "y")).await;
        let changed = c
            .batch_update(|r| {
                if r.display_text == "x" {
                    r.display_text = "z".into();
                    true
                } else {
                    false
                }
            })
            .await;
        assert_eq!(changed, 1);
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped() {
        let (c, kv) = stars();
        kv.set(StorageScope::Local, "stars", json!([{"key": "a:1"}, 42, {"nokey": true}]))
            .await
            .unwrap();
        assert_eq!(c.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn writes_keep_malformed_entries_in_storage() {
        let (c, kv) = stars();
        kv.set(StorageScope::Local, "stars", json!([{"key": "a:1"}, 42, {"nokey": true}]))
            .await
            .unwrap();
        assert!(c.upsert(record("a:2", "new")).await);
        assert!(c.remove("a:1").await);

        let stored = kv.get(StorageScope::Local, "stars").await.unwrap().unwrap();
        let stored = stored.as_array().unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.contains(&json!(42)));
        assert!(stored.contains(&json!({"nokey": true})));
        assert_eq!(c.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn storage_failure_degrades_to_neutral_results() {
        let (c, kv) = stars();
        c.upsert(record("a:1", "x")).await;
        kv.set_unavailable(true);
        assert!(c.get_all().await.is_empty());
        assert!(!c.upsert(record("a:2", "y")).await);
        assert!(!c.remove("a:1").await);
        kv.set_unavailable(false);
        assert_eq!(c.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn successful_writes_are_announced() {
        let kv = Arc::new(MemoryKv::new());
        let (tx, mut rx) = broadcast::channel(16);
        let c: RecordCollection<AnnotationRecord> = RecordCollection::new(kv, Family::Pins, tx);
        c.upsert(record("a:1", "x")).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.family, Family::Pins);
        assert_eq!(event.keys, vec!["a:1".to_string()]);
    }

    #[tokio::test]
    async fn get_by_url_ignores_protocol_and_query() {
        let (c, _) = stars();
        let k = TurnKey::new("claude-0");
        c.upsert(AnnotationRecord::new("https://claude.ai/chat/1", &k, "a", 1)).await;
        c.upsert(AnnotationRecord::new("https://claude.ai/chat/2", &k, "b", 1)).await;
        let found = c.get_by_url("http://claude.ai/chat/1?ref=x").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].display_text, "a");
    }

    #[tokio::test]
    async fn rekey_moves_then_becomes_noop() {
        let (c, _) = stars();
        let from = TurnKey::new("chatgpt-0");
        let to = TurnKey::new("chatgpt-abc");
        c.upsert(AnnotationRecord::new("https://chatgpt.com/c/1", &from, "q", 1)).await;

        assert!(c.try_rekey_turn("chatgpt.com/c/1", &from, &to).await.unwrap());
        let after_once = c.get_all().await;
        assert!(!c.try_rekey_turn("chatgpt.com/c/1", &from, &to).await.unwrap());
        assert_eq!(c.get_all().await, after_once);
        assert_eq!(after_once[0].key, "chatgpt.com/c/1:chatgpt-abc");
    }

    #[tokio::test]
    async fn rekey_keeps_existing_target() {
        let (c, _) = stars();
        let from = TurnKey::new("chatgpt-0");
        let to = TurnKey::new("chatgpt-abc");
        c.upsert(AnnotationRecord::new("https://chatgpt.com/c/1", &from, "old", 1)).await;
        c.upsert(AnnotationRecord::new("https://chatgpt.com/c/1", &to, "kept", 2)).await;
        c.try_rekey_turn("chatgpt.com/c/1", &from, &to).await.unwrap();
        let all = c.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].display_text, "kept");
    }
}
