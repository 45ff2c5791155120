//! SQLite storage backend

use super::traits::{entry_size, KvStore, OpenKvStore, Quotas, StorageChange, StorageError, StorageResult, StorageScope};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

const CHANGE_CAPACITY: usize = 256;

/// SQLite-backed key-value store
///
/// One `kv` table keyed by `(scope, key)` holding JSON text. Thread-safe via
/// an internal mutex on the connection; every call is a single statement, so
/// read-modify-write sequences across calls are not atomic.
pub struct SqliteKv {
    conn: Mutex<Connection>,
    quotas: Quotas,
    changes: broadcast::Sender<StorageChange>,
}

impl SqliteKv {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                scope TEXT NOT NULL,
                key TEXT NOT NULL,
                value_json TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (scope, key)
            );

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn from_connection(conn: Connection, quotas: Quotas) -> StorageResult<Self> {
        Self::init_schema(&conn)?;
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            quotas,
            changes,
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("connection lock poisoned".to_string()))
    }

    fn notify(&self, scope: StorageScope, key: &str) {
        let _ = self.changes.send(StorageChange {
            scope,
            keys: vec![key.to_string()],
        });
    }

    /// Bytes used by `scope`, not counting `skip`.
    fn scope_usage_without(conn: &Connection, scope: StorageScope, skip: &str) -> StorageResult<usize> {
        let used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value_json AS BLOB))), 0)
             FROM kv WHERE scope = ?1 AND key != ?2",
            params![scope.as_str(), skip],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(used).unwrap_or(0))
    }
}

impl OpenKvStore for SqliteKv {
    fn open(path: impl AsRef<Path>, quotas: Quotas) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?, quotas)
    }

    fn open_in_memory(quotas: Quotas) -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, quotas)
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, scope: StorageScope, key: &str) -> StorageResult<Option<Value>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT value_json FROM kv WHERE scope = ?1 AND key = ?2",
                params![scope.as_str(), key],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, scope: StorageScope, key: &str, value: Value) -> StorageResult<()> {
        let json = serde_json::to_string(&value)?;
        {
            let conn = self.conn()?;
            let needed = Self::scope_usage_without(&conn, scope, key)? + entry_size(key, &json);
            self.quotas.check(scope, needed)?;
            conn.execute(
                r#"
                INSERT INTO kv (scope, key, value_json, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(scope, key) DO UPDATE SET
                    value_json = excluded.value_json,
                    updated_at = excluded.updated_at
                "#,
                params![scope.as_str(), key, json, chrono::Utc::now().to_rfc3339()],
            )?;
        }
        self.notify(scope, key);
        Ok(())
    }

    async fn remove(&self, scope: StorageScope, key: &str) -> StorageResult<()> {
        let removed = {
            let conn = self.conn()?;
            conn.execute(
                "DELETE FROM kv WHERE scope = ?1 AND key = ?2",
                params![scope.as_str(), key],
            )?
        };
        if removed > 0 {
            self.notify(scope, key);
        }
        Ok(())
    }

    async fn get_all_with_prefix(&self, scope: StorageScope, prefix: &str) -> StorageResult<Vec<(String, Value)>> {
        let rows: Vec<(String, String)> = {
            let conn = self.conn()?;
            // substr comparison avoids LIKE escaping of '%' and '_' in keys
            let mut stmt = conn.prepare(
                "SELECT key, value_json FROM kv
                 WHERE scope = ?1 AND substr(key, 1, length(?2)) = ?2
                 ORDER BY key",
            )?;
            let iter = stmt.query_map(params![scope.as_str(), prefix], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let rows = iter.collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter()
            .map(|(key, json)| Ok((key, serde_json::from_str(&json)?)))
            .collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_store() -> SqliteKv {
        SqliteKv::open_in_memory(Quotas::default()).unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = create_test_store();
        store
            .set(StorageScope::Local, "stars", json!([{"key": "a:1"}]))
            .await
            .unwrap();
        let value = store.get(StorageScope::Local, "stars").await.unwrap();
        assert_eq!(value, Some(json!([{"key": "a:1"}])));
        assert_eq!(store.get(StorageScope::Sync, "stars").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_replaces_value() {
        let store = create_test_store();
        store.set(StorageScope::Local, "k", json!(1)).await.unwrap();
        store.set(StorageScope::Local, "k", json!(2)).await.unwrap();
        assert_eq!(store.get(StorageScope::Local, "k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_remove_missing_key_is_ok() {
        let store = create_test_store();
        store.remove(StorageScope::Local, "nothing").await.unwrap();
    }

    #[tokio::test]
    async fn test_prefix_scan_treats_wildcards_literally() {
        let store = create_test_store();
        store.set(StorageScope::Local, "star:a_1", json!(1)).await.unwrap();
        store.set(StorageScope::Local, "star:ab1", json!(2)).await.unwrap();
        store.set(StorageScope::Local, "pin:a", json!(3)).await.unwrap();
        let found = store
            .get_all_with_prefix(StorageScope::Local, "star:a_")
            .await
            .unwrap();
        assert_eq!(found, vec![("star:a_1".to_string(), json!(1))]);
    }

    #[tokio::test]
    async fn test_sync_quota_enforced() {
        let store = SqliteKv::open_in_memory(Quotas {
            local: None,
            sync: Some(16),
        })
        .unwrap();
        let result = store
            .set(StorageScope::Sync, "stars", json!("0123456789abcdef"))
            .await;
        assert!(matches!(result, Err(StorageError::QuotaExceeded { .. })));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("turnmark.db");
        {
            let store = SqliteKv::open(&path, Quotas::default()).unwrap();
            store.set(StorageScope::Local, "pins", json!([])).await.unwrap();
        }
        let store = SqliteKv::open(&path, Quotas::default()).unwrap();
        assert_eq!(store.get(StorageScope::Local, "pins").await.unwrap(), Some(json!([])));
    }

    #[tokio::test]
    async fn test_schema_init_is_idempotent_and_stamps_writes() {
        let conn = Connection::open_in_memory().unwrap();
        SqliteKv::init_schema(&conn).unwrap();
        SqliteKv::init_schema(&conn).unwrap();
        let store = SqliteKv::from_connection(conn, Quotas::default()).unwrap();
        store.set(StorageScope::Local, "stars", json!([])).await.unwrap();

        let stamp: String = store
            .conn()
            .unwrap()
            .query_row("SELECT updated_at FROM kv WHERE key = 'stars'", [], |row| row.get(0))
            .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }
}
