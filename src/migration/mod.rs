//! Schema migration coordinator
//!
//! Brings persisted data from any earlier generation to the current one.
//! Every migration checks for old-shape keys first and returns immediately
//! when there are none, so [`MigrationCoordinator::run`] is safe to call on
//! every load.
//!
//! Order matters: the scope move runs first, then key renames, then the
//! record-shape consolidation, since each assumes the previous one has
//! already put data in the local scope under canonical names.

mod merge;
mod rename;
mod scope;
mod shape;

pub use merge::{merge_preferring_existing, merge_stored};
pub use rename::KeyRenameMigration;
pub use scope::ScopeMigration;
pub use shape::RecordShapeMigration;

use crate::config::MigrationConfig;
use crate::storage::{KvStore, StorageResult};
use async_trait::async_trait;
use std::sync::Arc;

/// What one migration changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub name: String,
    pub keys_migrated: usize,
    pub keys_removed: usize,
}

impl MigrationReport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.keys_migrated == 0 && self.keys_removed == 0
    }
}

/// One generation-to-generation step.
#[async_trait]
pub trait Migration: Send + Sync {
    fn name(&self) -> &str;

    /// Transform old-shape data if any exists. Must be a no-op on a store
    /// that is already current.
    async fn run(&self, kv: &dyn KvStore) -> StorageResult<MigrationReport>;
}

pub struct MigrationCoordinator {
    kv: Arc<dyn KvStore>,
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationCoordinator {
    /// The standard sequence: scope, then renames, then record shape.
    pub fn new(kv: Arc<dyn KvStore>, config: &MigrationConfig) -> Self {
        Self {
            kv,
            migrations: vec![
                Box::new(ScopeMigration),
                Box::new(KeyRenameMigration::new(config.key_renames.clone())),
                Box::new(RecordShapeMigration),
            ],
        }
    }

    /// A coordinator running exactly `migrations`, in order.
    pub fn with_migrations(kv: Arc<dyn KvStore>, migrations: Vec<Box<dyn Migration>>) -> Self {
        Self { kv, migrations }
    }

    pub fn names(&self) -> Vec<&str> {
        self.migrations.iter().map(|m| m.name()).collect()
    }

    /// Run every migration in order.
    ///
    /// A failed migration is logged and skipped; the ones after it still
    /// run. Reports are returned for the migrations that completed.
    pub async fn run(&self) -> Vec<MigrationReport> {
        let mut reports = Vec::with_capacity(self.migrations.len());
        for migration in &self.migrations {
            match migration.run(self.kv.as_ref()).await {
                Ok(report) => {
                    if report.is_noop() {
                        tracing::debug!(migration = migration.name(), "nothing to migrate");
                    } else {
                        tracing::info!(
                            migration = migration.name(),
                            keys_migrated = report.keys_migrated,
                            keys_removed = report.keys_removed,
                            "migration applied"
                        );
                    }
                    reports.push(report);
                }
                Err(e) => {
                    tracing::warn!(migration = migration.name(), error = %e, "migration failed; continuing");
                }
            }
        }
        reports
    }
}
