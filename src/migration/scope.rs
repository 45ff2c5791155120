use super::merge::merge_stored;
use super::{Migration, MigrationReport};
use crate::storage::{KvStore, StorageResult, StorageScope};
use async_trait::async_trait;

/// Moves everything out of the synced scope into the local scope.
///
/// Local data already present wins on conflict.
pub struct ScopeMigration;

#[async_trait]
impl Migration for ScopeMigration {
    fn name(&self) -> &str {
        "sync-to-local"
    }

    async fn run(&self, kv: &dyn KvStore) -> StorageResult<MigrationReport> {
        let mut report = MigrationReport::new(self.name());
        let synced = kv.get_all_with_prefix(StorageScope::Sync, "").await?;
        for (key, value) in synced {
            let merged = match kv.get(StorageScope::Local, &key).await? {
                Some(local) => merge_stored(&key, local, value),
                None => value,
            };
            kv.set(StorageScope::Local, &key, merged).await?;
            kv.remove(StorageScope::Sync, &key).await?;
            report.keys_migrated += 1;
            report.keys_removed += 1;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;
    use serde_json::json;

    #[tokio::test]
    async fn moves_synced_keys_and_prefers_local() {
        let kv = MemoryKv::new();
        kv.set(StorageScope::Sync, "stars", json!([{"key": "a:1", "displayText": "sync"}, {"key": "a:2"}]))
            .await
            .unwrap();
        kv.set(StorageScope::Local, "stars", json!([{"key": "a:1", "displayText": "local"}]))
            .await
            .unwrap();

        let report = ScopeMigration.run(&kv).await.unwrap();
        assert_eq!(report.keys_migrated, 1);
        assert!(kv.keys(StorageScope::Sync).is_empty());
        let stars = kv.get(StorageScope::Local, "stars").await.unwrap().unwrap();
        assert_eq!(stars.as_array().unwrap().len(), 2);
        assert_eq!(stars[0]["displayText"], "local");
    }

    #[tokio::test]
    async fn nothing_synced_is_a_noop() {
        let kv = MemoryKv::new();
        let report = ScopeMigration.run(&kv).await.unwrap();
        assert!(report.is_noop());
    }
}
