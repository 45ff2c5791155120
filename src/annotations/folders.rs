//! Folder hierarchy for organizing stars
//!
//! Two levels only: root folders and their direct children. Sibling names
//! are unique (case-insensitive). Invariant violations are rejected before
//! anything is written.

use super::collection::RecordCollection;
use super::record::{AnnotationRecord, Keyed};
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Deepest allowed folder level (root folders are level 1).
pub const MAX_FOLDER_DEPTH: usize = 2;

#[derive(Debug, Error)]
pub enum FolderError {
    #[error("folder name must not be empty")]
    EmptyName,

    #[error("a folder named '{0}' already exists here")]
    DuplicateName(String),

    #[error("folders can only be nested {MAX_FOLDER_DEPTH} levels deep")]
    DepthExceeded,

    #[error("parent folder not found: {0}")]
    ParentNotFound(String),

    #[error("folder not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub created_at: i64,
}

impl Keyed for FolderNode {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Outcome of deleting a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderDeletion {
    pub folders_removed: Vec<String>,
    /// Stars moved to the deleted folder's parent (or out of any folder)
    pub records_reassigned: usize,
}

#[derive(Clone)]
pub struct FolderStore {
    folders: RecordCollection<FolderNode>,
}

impl FolderStore {
    pub(crate) fn new(folders: RecordCollection<FolderNode>) -> Self {
        Self { folders }
    }

    pub async fn list(&self) -> Vec<FolderNode> {
        self.folders.get_all().await
    }

    pub async fn get(&self, id: &str) -> Option<FolderNode> {
        self.folders.get(id).await
    }

    /// Direct children of `parent_id` (`None` lists root folders).
    pub async fn children(&self, parent_id: Option<&str>) -> Vec<FolderNode> {
        self.list()
            .await
            .into_iter()
            .filter(|f| f.parent_id.as_deref() == parent_id)
            .collect()
    }

    pub async fn create(&self, name: &str, parent_id: Option<&str>, now_ms: i64) -> Result<FolderNode, FolderError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FolderError::EmptyName);
        }

        let mut folders = self.folders.try_load().await?;
        if let Some(parent_id) = parent_id {
            let parent = folders
                .iter()
                .find(|f| f.id == parent_id)
                .ok_or_else(|| FolderError::ParentNotFound(parent_id.to_string()))?;
            if depth_of(&folders, parent) >= MAX_FOLDER_DEPTH {
                return Err(FolderError::DepthExceeded);
            }
        }
        if has_sibling_named(&folders, parent_id, name, None) {
            return Err(FolderError::DuplicateName(name.to_string()));
        }

        let folder = FolderNode {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            parent_id: parent_id.map(str::to_string),
            created_at: now_ms,
        };
        folders.push(folder.clone());
        self.folders.try_save(&folders).await?;
        tracing::debug!(folder_id = %folder.id, name, "folder created");
        Ok(folder)
    }

    pub async fn rename(&self, id: &str, name: &str) -> Result<FolderNode, FolderError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FolderError::EmptyName);
        }
        let mut folders = self.folders.try_load().await?;
        let parent_id = folders
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.parent_id.clone())
            .ok_or_else(|| FolderError::NotFound(id.to_string()))?;
        if has_sibling_named(&folders, parent_id.as_deref(), name, Some(id)) {
            return Err(FolderError::DuplicateName(name.to_string()));
        }

        let mut renamed = None;
        for folder in folders.iter_mut().filter(|f| f.id == id) {
            folder.name = name.to_string();
            renamed = Some(folder.clone());
        }
        self.folders.try_save(&folders).await?;
        renamed.ok_or_else(|| FolderError::NotFound(id.to_string()))
    }

    /// Delete a folder and its sub-folders.
    ///
    /// Stars in any removed folder are reassigned to the deleted folder's
    /// parent first, so no record is left pointing at a missing folder.
    pub async fn delete(&self, id: &str, stars: &RecordCollection<AnnotationRecord>) -> Result<FolderDeletion, FolderError> {
        let folders = self.folders.try_load().await?;
        let target = folders
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| FolderError::NotFound(id.to_string()))?;

        let removed: HashSet<String> = folders
            .iter()
            .filter(|f| f.id == id || f.parent_id.as_deref() == Some(id))
            .map(|f| f.id.clone())
            .collect();

        let destination = target.parent_id.clone();
        let reassigned = stars
            .try_batch_update(|record| match &record.folder_id {
                Some(folder) if removed.contains(folder) => {
                    record.folder_id = destination.clone();
                    true
                }
                _ => false,
            })
            .await?;

        let remaining: Vec<FolderNode> = folders
            .into_iter()
            .filter(|f| !removed.contains(&f.id))
            .collect();
        self.folders.try_save(&remaining).await?;

        let mut folders_removed: Vec<String> = removed.into_iter().collect();
        folders_removed.sort();
        tracing::info!(folder_id = id, removed = folders_removed.len(), reassigned = reassigned.len(), "folder deleted");
        Ok(FolderDeletion {
            folders_removed,
            records_reassigned: reassigned.len(),
        })
    }
}

/// Level of `folder`: 1 for a root folder, 2 for its child.
fn depth_of(folders: &[FolderNode], folder: &FolderNode) -> usize {
    let mut depth = 1;
    let mut parent = folder.parent_id.as_deref();
    let mut seen = HashSet::new();
    while let Some(pid) = parent {
        if !seen.insert(pid) {
            break;
        }
        depth += 1;
        parent = folders
            .iter()
            .find(|f| f.id == pid)
            .and_then(|f| f.parent_id.as_deref());
    }
    depth
}

fn has_sibling_named(folders: &[FolderNode], parent_id: Option<&str>, name: &str, except: Option<&str>) -> bool {
    folders.iter().any(|f| {
        f.parent_id.as_deref() == parent_id
            && Some(f.id.as_str()) != except
            && f.name.trim().eq_ignore_ascii_case(name)
    })
}
