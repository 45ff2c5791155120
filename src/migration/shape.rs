use super::{Migration, MigrationReport};
use crate::annotations::{AnnotationRecord, Family};
use crate::storage::{KvStore, StorageResult, StorageScope};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Consolidates one-key-per-record data (`star:<id>`, `pin:<id>`) into the
/// family's array.
///
/// Records already in the array win over legacy ones with the same key.
pub struct RecordShapeMigration;

#[async_trait]
impl Migration for RecordShapeMigration {
    fn name(&self) -> &str {
        "record-shape"
    }

    async fn run(&self, kv: &dyn KvStore) -> StorageResult<MigrationReport> {
        let mut report = MigrationReport::new(self.name());
        for family in Family::all() {
            let Some(prefix) = family.legacy_prefix() else {
                continue;
            };
            let legacy = kv.get_all_with_prefix(StorageScope::Local, prefix).await?;
            if legacy.is_empty() {
                continue;
            }

            let mut entries = match kv.get(StorageScope::Local, family.storage_key()).await? {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            let mut present: HashSet<String> = entries
                .iter()
                .filter_map(|e| e.get("key").or_else(|| e.get("id")))
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();

            for (storage_key, value) in &legacy {
                let id = &storage_key[prefix.len()..];
                let Some(record) = legacy_record(id, value.clone()) else {
                    tracing::warn!(family = %family, key = %storage_key, "dropping unreadable legacy record");
                    continue;
                };
                if present.insert(record.key.clone()) {
                    entries.push(serde_json::to_value(&record)?);
                    report.keys_migrated += 1;
                }
            }

            kv.set(StorageScope::Local, family.storage_key(), Value::Array(entries))
                .await?;
            for (storage_key, _) in &legacy {
                kv.remove(StorageScope::Local, storage_key).await?;
                report.keys_removed += 1;
            }
        }
        Ok(report)
    }
}

/// Build a current-shape record from a legacy value stored under `id`.
///
/// The storage key is authoritative for the record key. Non-object values
/// (bare flags from the oldest generation) carry no fields of their own.
fn legacy_record(id: &str, value: Value) -> Option<AnnotationRecord> {
    if id.is_empty() {
        return None;
    }
    let mut fields = match value {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    fields.remove("id");
    fields.insert("key".to_string(), Value::String(id.to_string()));
    let mut record: AnnotationRecord = serde_json::from_value(Value::Object(fields)).ok()?;
    record.backfill();
    Some(record)
}
