//! Per-conversation time data
//!
//! Stored as one map-valued record under `conversationTimes`, addressed by
//! normalized conversation URL.

use super::events::AnnotationEvent;
use super::record::Family;
use super::url::normalize_url;
use crate::identity::TurnKey;
use crate::storage::{KvStore, StorageResult, StorageScope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTimeRecord {
    /// Write-once
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub last_visit: i64,
    /// Turn key → first-seen time. Entries are never overwritten.
    #[serde(default)]
    pub nodes: BTreeMap<String, i64>,
}

impl ConversationTimeRecord {
    /// Fold another copy of the same conversation into this one.
    ///
    /// Keeps the earliest known `createTime` and the latest `lastVisit`;
    /// turn entries already present here are left alone.
    pub fn absorb(&mut self, other: ConversationTimeRecord) {
        self.create_time = match (self.create_time, other.create_time) {
            (0, theirs) => theirs,
            (ours, 0) => ours,
            (ours, theirs) => ours.min(theirs),
        };
        self.last_visit = self.last_visit.max(other.last_visit);
        for (key, time) in other.nodes {
            self.nodes.entry(key).or_insert(time);
        }
    }
}

type TimeMap = BTreeMap<String, ConversationTimeRecord>;

#[derive(Clone)]
pub struct TimestampStore {
    kv: Arc<dyn KvStore>,
    events: broadcast::Sender<AnnotationEvent>,
}

impl TimestampStore {
    pub(crate) fn new(kv: Arc<dyn KvStore>, events: broadcast::Sender<AnnotationEvent>) -> Self {
        Self { kv, events }
    }

    async fn try_load(&self) -> StorageResult<TimeMap> {
        let Some(value) = self.kv.get(StorageScope::Local, Family::Timestamps.storage_key()).await? else {
            return Ok(TimeMap::new());
        };
        let Value::Object(entries) = value else {
            tracing::warn!(family = %Family::Timestamps, "time data is not a map; treating as empty");
            return Ok(TimeMap::new());
        };
        let mut map = TimeMap::new();
        for (url, entry) in entries {
            match serde_json::from_value(entry) {
                Ok(record) => {
                    map.insert(url, record);
                }
                Err(e) => tracing::warn!(url = %url, error = %e, "skipping malformed time record"),
            }
        }
        Ok(map)
    }

    async fn try_save(&self, map: &TimeMap) -> StorageResult<()> {
        let value = serde_json::to_value(map)?;
        self.kv
            .set(StorageScope::Local, Family::Timestamps.storage_key(), value)
            .await
    }

    /// Load, let `change` edit the map, and write back if it reports a change.
    async fn modify<F>(&self, op: &str, url: &str, change: F) -> bool
    where
        F: FnOnce(&mut TimeMap) -> bool + Send,
    {
        let result = async {
            let mut map = self.try_load().await?;
            if !change(&mut map) {
                return Ok(false);
            }
            self.try_save(&map).await?;
            Ok::<bool, crate::storage::StorageError>(true)
        }
        .await;

        match result {
            Ok(true) => {
                let _ = self.events.send(AnnotationEvent {
                    family: Family::Timestamps,
                    keys: vec![url.to_string()],
                });
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(family = %Family::Timestamps, op, url, error = %e, "annotation storage failed");
                false
            }
        }
    }

    /// Create the conversation record if absent. `createTime` is never
    /// changed once set.
    pub async fn record_conversation(&self, url: &str, now_ms: i64) -> bool {
        let key = normalize_url(url);
        self.modify("record_conversation", &key, |map| {
            if map.contains_key(&key) {
                return false;
            }
            map.insert(
                key.clone(),
                ConversationTimeRecord {
                    create_time: now_ms,
                    last_visit: now_ms,
                    nodes: BTreeMap::new(),
                },
            );
            true
        })
        .await
    }

    /// Update `lastVisit` on an existing record. Never creates one.
    pub async fn touch_visit(&self, url: &str, now_ms: i64) -> bool {
        let key = normalize_url(url);
        self.modify("touch_visit", &key, |map| match map.get_mut(&key) {
            Some(record) => {
                record.last_visit = now_ms;
                true
            }
            None => false,
        })
        .await
    }

    /// Record when a turn was first seen. Returns false if the turn already
    /// has a time.
    pub async fn record_turn(&self, url: &str, turn_key: &TurnKey, now_ms: i64) -> bool {
        let key = normalize_url(url);
        self.modify("record_turn", &key, |map| {
            let record = map.entry(key.clone()).or_insert_with(|| ConversationTimeRecord {
                create_time: now_ms,
                last_visit: now_ms,
                nodes: BTreeMap::new(),
            });
            if record.nodes.contains_key(turn_key.as_str()) {
                return false;
            }
            record.nodes.insert(turn_key.to_string(), now_ms);
            true
        })
        .await
    }

    pub async fn get(&self, url: &str) -> Option<ConversationTimeRecord> {
        match self.try_load().await {
            Ok(mut map) => map.remove(&normalize_url(url)),
            Err(e) => {
                tracing::warn!(family = %Family::Timestamps, op = "get", error = %e, "annotation storage failed");
                None
            }
        }
    }

    pub async fn get_all(&self) -> BTreeMap<String, ConversationTimeRecord> {
        match self.try_load().await {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(family = %Family::Timestamps, op = "get_all", error = %e, "annotation storage failed");
                BTreeMap::new()
            }
        }
    }

    pub async fn remove_conversation(&self, url: &str) -> bool {
        let key = normalize_url(url);
        self.modify("remove_conversation", &key, |map| map.remove(&key).is_some())
            .await
    }

    /// Move the time recorded for `from` to `to`. An existing `to` entry is
    /// kept. No-op once `from` is gone.
    pub(crate) async fn try_rekey_turn(&self, normalized_url: &str, from: &TurnKey, to: &TurnKey) -> StorageResult<bool> {
        let mut map = self.try_load().await?;
        let Some(record) = map.get_mut(normalized_url) else {
            return Ok(false);
        };
        let Some(time) = record.nodes.remove(from.as_str()) else {
            return Ok(false);
        };
        record.nodes.entry(to.to_string()).or_insert(time);
        self.try_save(&map).await?;
        let _ = self.events.send(AnnotationEvent {
            family: Family::Timestamps,
            keys: vec![normalized_url.to_string()],
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;

    fn store() -> (TimestampStore, Arc<MemoryKv>) {
        let kv = Arc::new(MemoryKv::new());
        let (tx, _) = broadcast::channel(16);
        (TimestampStore::new(kv.clone(), tx), kv)
    }

    const URL: &str = "https://chatgpt.com/c/abc";

    #[tokio::test]
    async fn create_time_is_write_once() {
        let (s, _) = store();
        assert!(s.record_conversation(URL, 100).await);
        assert!(!s.record_conversation(URL, 200).await);
        let record = s.get(URL).await.unwrap();
        assert_eq!(record.create_time, 100);
    }

    #[tokio::test]
    async fn touch_visit_never_creates() {
        let (s, _) = store();
        assert!(!s.touch_visit(URL, 50).await);
        assert!(s.get(URL).await.is_none());

        s.record_conversation(URL, 100).await;
        assert!(s.touch_visit("http://chatgpt.com/c/abc?x=1", 300).await);
        let record = s.get(URL).await.unwrap();
        assert_eq!(record.create_time, 100);
        assert_eq!(record.last_visit, 300);
    }

    #[tokio::test]
    async fn turn_times_are_write_once() {
        let (s, _) = store();
        let key = TurnKey::new("chatgpt-0");
        assert!(s.record_turn(URL, &key, 10).await);
        assert!(!s.record_turn(URL, &key, 20).await);
        let record = s.get(URL).await.unwrap();
        assert_eq!(record.nodes.get("chatgpt-0"), Some(&10));
        assert_eq!(record.create_time, 10);
    }

    #[tokio::test]
    async fn rekey_moves_node_once() {
        let (s, _) = store();
        let from = TurnKey::new("chatgpt-0");
        let to = TurnKey::new("chatgpt-abc");
        s.record_turn(URL, &from, 10).await;

        assert!(s.try_rekey_turn("chatgpt.com/c/abc", &from, &to).await.unwrap());
        assert!(!s.try_rekey_turn("chatgpt.com/c/abc", &from, &to).await.unwrap());
        let nodes = s.get(URL).await.unwrap().nodes;
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes.get("chatgpt-abc"), Some(&10));
    }

    #[tokio::test]
    async fn serialized_shape_uses_camel_case_map() {
        let (s, kv) = store();
        s.record_turn(URL, &TurnKey::new("chatgpt-0"), 10).await;
        let raw = kv.get(StorageScope::Local, "conversationTimes").await.unwrap().unwrap();
        assert_eq!(raw["chatgpt.com/c/abc"]["createTime"], 10);
        assert_eq!(raw["chatgpt.com/c/abc"]["nodes"]["chatgpt-0"], 10);
    }

    #[tokio::test]
    async fn remove_and_failure() {
        let (s, kv) = store();
        s.record_conversation(URL, 1).await;
        kv.set_unavailable(true);
        assert!(!s.remove_conversation(URL).await);
        assert!(s.get(URL).await.is_none());
        kv.set_unavailable(false);
        assert!(s.remove_conversation(URL).await);
        assert!(s.get(URL).await.is_none());
    }
}
