//! Annotation record types

use super::url::{composite_id, normalize_url, split_composite_id};
use crate::identity::TurnKey;
use serde::{Deserialize, Serialize};

/// A record stored in one of the array-valued collections.
pub trait Keyed {
    /// The unique key within its collection
    fn key(&self) -> &str;
}

/// The persisted record families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Stars,
    Pins,
    Folders,
    Timestamps,
}

impl Family {
    /// Storage key of the family's consolidated record.
    pub fn storage_key(self) -> &'static str {
        match self {
            Family::Stars => "stars",
            Family::Pins => "pins",
            Family::Folders => "folders",
            Family::Timestamps => "conversationTimes",
        }
    }

    /// Key prefix used by the one-key-per-record generation, if the family
    /// existed then.
    pub fn legacy_prefix(self) -> Option<&'static str> {
        match self {
            Family::Stars => Some("star:"),
            Family::Pins => Some("pin:"),
            Family::Folders | Family::Timestamps => None,
        }
    }

    pub fn all() -> [Family; 4] {
        [Family::Stars, Family::Pins, Family::Folders, Family::Timestamps]
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.storage_key())
    }
}

/// A star or pin on one turn.
///
/// Aliases accept the field names older generations wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    /// `normalizedUrl:turnKey`
    #[serde(alias = "id")]
    pub key: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub url_without_protocol: String,
    #[serde(default, alias = "turnId")]
    pub turn_key: String,
    #[serde(default, alias = "text", alias = "question")]
    pub display_text: String,
    /// Milliseconds since the Unix epoch
    #[serde(default, alias = "timestamp")]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

impl AnnotationRecord {
    pub fn new(url: &str, turn_key: &TurnKey, display_text: impl Into<String>, created_at: i64) -> Self {
        let normalized = normalize_url(url);
        Self {
            key: composite_id(&normalized, turn_key.as_str()),
            url: url.trim().to_string(),
            url_without_protocol: normalized,
            turn_key: turn_key.to_string(),
            display_text: display_text.into(),
            created_at,
            folder_id: None,
        }
    }

    pub fn with_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    /// Fill fields older generations left out, deriving them from the key.
    pub(crate) fn backfill(&mut self) {
        if let Some((url, turn)) = split_composite_id(&self.key) {
            if self.url_without_protocol.is_empty() {
                self.url_without_protocol = url.to_string();
            }
            if self.turn_key.is_empty() {
                self.turn_key = turn.to_string();
            }
        }
        if self.url.is_empty() {
            self.url = self.url_without_protocol.clone();
        }
    }

    /// The same record under a different turn key.
    pub fn rekeyed(&self, turn_key: &TurnKey) -> Self {
        let mut record = self.clone();
        record.key = composite_id(&self.url_without_protocol, turn_key.as_str());
        record.turn_key = turn_key.to_string();
        record
    }
}

impl Keyed for AnnotationRecord {
    fn key(&self) -> &str {
        &self.key
    }
}

/// Partial update for an annotation record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationPatch {
    pub display_text: Option<String>,
    /// `Some(None)` clears the folder
    pub folder_id: Option<Option<String>>,
}

impl AnnotationPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_text(mut self, text: impl Into<String>) -> Self {
        self.display_text = Some(text.into());
        self
    }

    pub fn folder(mut self, folder_id: Option<String>) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    pub fn apply(&self, record: &mut AnnotationRecord) {
        if let Some(text) = &self.display_text {
            record.display_text = text.clone();
        }
        if let Some(folder) = &self.folder_id {
            record.folder_id = folder.clone();
        }
    }
}
