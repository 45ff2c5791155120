//! Identity-keyed annotation store
//!
//! Stars and pins are array-valued collections keyed by
//! `normalizedUrl:turnKey`; folders organize stars two levels deep; time data
//! is a map keyed by normalized conversation URL. All state lives behind a
//! [`KvStore`] so the store can be tested without a host.

mod collection;
mod events;
mod folders;
mod record;
mod timestamps;
pub mod url;

pub use collection::RecordCollection;
pub use events::AnnotationEvent;
pub use folders::{FolderDeletion, FolderError, FolderNode, FolderStore, MAX_FOLDER_DEPTH};
pub use record::{AnnotationPatch, AnnotationRecord, Family, Keyed};
pub use timestamps::{ConversationTimeRecord, TimestampStore};

use crate::identity::TurnKey;
use crate::storage::KvStore;
use std::sync::Arc;
use self::url::normalize_url;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Which families held a record under the old key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RekeyReport {
    pub stars: bool,
    pub pins: bool,
    pub timestamps: bool,
}

impl RekeyReport {
    pub fn any(&self) -> bool {
        self.stars || self.pins || self.timestamps
    }
}

/// Entry point for every annotation family.
#[derive(Clone)]
pub struct AnnotationStore {
    stars: RecordCollection<AnnotationRecord>,
    pins: RecordCollection<AnnotationRecord>,
    folders: FolderStore,
    timestamps: TimestampStore,
    events: broadcast::Sender<AnnotationEvent>,
}

impl AnnotationStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            stars: RecordCollection::new(kv.clone(), Family::Stars, events.clone()),
            pins: RecordCollection::new(kv.clone(), Family::Pins, events.clone()),
            folders: FolderStore::new(RecordCollection::new(kv.clone(), Family::Folders, events.clone())),
            timestamps: TimestampStore::new(kv, events.clone()),
            events,
        }
    }

    pub fn stars(&self) -> &RecordCollection<AnnotationRecord> {
        &self.stars
    }

    pub fn pins(&self) -> &RecordCollection<AnnotationRecord> {
        &self.pins
    }

    pub fn folders(&self) -> &FolderStore {
        &self.folders
    }

    pub fn timestamps(&self) -> &TimestampStore {
        &self.timestamps
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnnotationEvent> {
        self.events.subscribe()
    }

    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>, now_ms: i64) -> Result<FolderNode, FolderError> {
        let folder = self.folders.create(name, parent_id, now_ms).await?;
        self.announce(Family::Folders, vec![folder.id.clone()]);
        Ok(folder)
    }

    pub async fn rename_folder(&self, id: &str, name: &str) -> Result<FolderNode, FolderError> {
        let folder = self.folders.rename(id, name).await?;
        self.announce(Family::Folders, vec![folder.id.clone()]);
        Ok(folder)
    }

    /// Delete a folder with its sub-folders, moving their stars up.
    pub async fn delete_folder(&self, id: &str) -> Result<FolderDeletion, FolderError> {
        let deletion = self.folders.delete(id, &self.stars).await?;
        self.announce(Family::Folders, deletion.folders_removed.clone());
        Ok(deletion)
    }

    /// Put a star into `folder_id`, or take it out of any folder with `None`.
    pub async fn move_star_to_folder(&self, key: &str, folder_id: Option<&str>) -> Result<bool, FolderError> {
        if let Some(folder_id) = folder_id {
            if self.folders.get(folder_id).await.is_none() {
                return Err(FolderError::NotFound(folder_id.to_string()));
            }
        }
        let patch = AnnotationPatch::new().folder(folder_id.map(str::to_string));
        Ok(self.stars.update(key, |record| patch.apply(record)).await)
    }

    /// Re-key every record of one conversation from a provisional turn key
    /// to its stable key.
    ///
    /// Running it again after it completed changes nothing: the provisional
    /// key is gone from every family.
    pub async fn migrate_turn_key(&self, url: &str, from: &TurnKey, to: &TurnKey) -> RekeyReport {
        let normalized = normalize_url(url);
        let stars = self.rekey_family(&self.stars, &normalized, from, to).await;
        let pins = self.rekey_family(&self.pins, &normalized, from, to).await;
        let timestamps = match self.timestamps.try_rekey_turn(&normalized, from, to).await {
            Ok(moved) => moved,
            Err(e) => {
                tracing::warn!(family = %Family::Timestamps, url = %normalized, error = %e, "re-key failed");
                false
            }
        };

        let report = RekeyReport { stars, pins, timestamps };
        if report.any() {
            tracing::info!(url = %normalized, from = %from, to = %to, ?report, "turn key migrated");
        }
        report
    }

    async fn rekey_family(
        &self,
        collection: &RecordCollection<AnnotationRecord>,
        normalized: &str,
        from: &TurnKey,
        to: &TurnKey,
    ) -> bool {
        match collection.try_rekey_turn(normalized, from, to).await {
            Ok(moved) => moved,
            Err(e) => {
                tracing::warn!(family = %collection.family(), url = normalized, error = %e, "re-key failed");
                false
            }
        }
    }

    fn announce(&self, family: Family, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        let _ = self.events.send(AnnotationEvent { family, keys });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;

    fn store() -> AnnotationStore {
        AnnotationStore::new(Arc::new(MemoryKv::new()))
    }

    const URL: &str = "https://chatgpt.com/c/abc";

    #[tokio::test]
    async fn migrate_turn_key_moves_every_family() {
        let s = store();
        let from = TurnKey::new("chatgpt-0");
        let to = TurnKey::new("chatgpt-abc123");
        s.stars().upsert(AnnotationRecord::new(URL, &from, "q", 1)).await;
        s.pins().upsert(AnnotationRecord::new(URL, &from, "q", 1)).await;
        s.timestamps().record_turn(URL, &from, 5).await;

        let report = s.migrate_turn_key(URL, &from, &to).await;
        assert_eq!(report, RekeyReport { stars: true, pins: true, timestamps: true });
        assert_eq!(s.stars().get_all().await[0].turn_key, "chatgpt-abc123");
        assert_eq!(s.pins().get_all().await[0].key, "chatgpt.com/c/abc:chatgpt-abc123");
        assert!(s.timestamps().get(URL).await.unwrap().nodes.contains_key("chatgpt-abc123"));
    }

    #[tokio::test]
    async fn migrate_turn_key_twice_equals_once() {
        let s = store();
        let from = TurnKey::new("chatgpt-0");
        let to = TurnKey::new("chatgpt-abc123");
        s.stars().upsert(AnnotationRecord::new(URL, &from, "q", 1)).await;
        s.timestamps().record_turn(URL, &from, 5).await;

        s.migrate_turn_key(URL, &from, &to).await;
        let stars = s.stars().get_all().await;
        let times = s.timestamps().get_all().await;

        let second = s.migrate_turn_key(URL, &from, &to).await;
        assert!(!second.any());
        assert_eq!(s.stars().get_all().await, stars);
        assert_eq!(s.timestamps().get_all().await, times);
    }

    #[tokio::test]
    async fn move_star_requires_existing_folder() {
        let s = store();
        let key = TurnKey::new("chatgpt-0");
        let record = AnnotationRecord::new(URL, &key, "q", 1);
        let id = record.key.clone();
        s.stars().upsert(record).await;

        assert!(matches!(
            s.move_star_to_folder(&id, Some("nope")).await,
            Err(FolderError::NotFound(_))
        ));
        let folder = s.create_folder("Later", None, 1).await.unwrap();
        assert!(s.move_star_to_folder(&id, Some(&folder.id)).await.unwrap());
        assert_eq!(s.stars().records_in_folder(Some(&folder.id)).await.len(), 1);
        assert!(s.move_star_to_folder(&id, None).await.unwrap());
        assert_eq!(s.stars().records_in_folder(None).await.len(), 1);
    }

    #[tokio::test]
    async fn folder_changes_are_announced() {
        let s = store();
        let mut rx = s.subscribe();
        let folder = s.create_folder("Work", None, 1).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.family, Family::Folders);
        assert_eq!(event.keys, vec![folder.id]);
    }
}
