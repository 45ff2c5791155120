use super::merge::merge_stored;
use super::{Migration, MigrationReport};
use crate::config::KeyRename;
use crate::storage::{KvStore, StorageResult, StorageScope};
use async_trait::async_trait;

/// Applies configured storage key renames in the local scope.
pub struct KeyRenameMigration {
    renames: Vec<KeyRename>,
}

impl KeyRenameMigration {
    pub fn new(renames: Vec<KeyRename>) -> Self {
        Self { renames }
    }
}

#[async_trait]
impl Migration for KeyRenameMigration {
    fn name(&self) -> &str {
        "key-rename"
    }

    async fn run(&self, kv: &dyn KvStore) -> StorageResult<MigrationReport> {
        let mut report = MigrationReport::new(self.name());
        for rename in &self.renames {
            if rename.from == rename.to {
                continue;
            }
            let Some(old) = kv.get(StorageScope::Local, &rename.from).await? else {
                continue;
            };
            let merged = match kv.get(StorageScope::Local, &rename.to).await? {
                Some(current) => merge_stored(&rename.to, current, old),
                None => old,
            };
            kv.set(StorageScope::Local, &rename.to, merged).await?;
            kv.remove(StorageScope::Local, &rename.from).await?;
            tracing::debug!(from = %rename.from, to = %rename.to, "storage key renamed");
            report.keys_migrated += 1;
            report.keys_removed += 1;
        }
        Ok(report)
    }
}
