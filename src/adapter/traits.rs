//! SiteAdapter trait — the contract platform adapters implement
//!
//! An adapter owns every piece of platform-specific document knowledge:
//! which elements are user turns, how to read their text, and how to turn a
//! position into a key. Everything downstream is platform-agnostic.

use crate::dom::{summarize_text, DomTree, ElementId, Selector, TEXT_LIMIT};
use crate::identity::TurnKey;

/// Optional behaviors a platform may declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The host assigns a permanent identifier to each turn, possibly after
    /// a short delay. Turns start provisional until it appears.
    pub stable_ids: bool,
    /// Turns are laid out newest-first in document order.
    pub reverse_scroll: bool,
    /// The adapter can tell whether a response is still streaming.
    pub generation_detection: bool,
}

/// What a stored key points at once the platform prefix is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnRef {
    /// A position within the current match list
    Index(usize),
    /// A host-assigned identifier
    Raw(String),
}

/// The contract platform adapters implement.
///
/// All methods are pure reads of the snapshot they are given. A selector
/// miss produces an empty result, never a panic.
pub trait SiteAdapter: Send + Sync {
    /// Unique identifier, also used as the turn-key prefix
    fn id(&self) -> &str;

    /// True if this adapter handles `url`.
    fn matches(&self, url: &str) -> bool;

    /// Selector for user turns on this route, or `None` when the route has
    /// no conversation (landing pages, settings).
    fn user_message_selector(&self, url: &str) -> Option<Selector>;

    /// Display text for a turn. Falls back to a placeholder for non-text turns.
    fn extract_text(&self, tree: &DomTree, element: ElementId) -> String {
        summarize_text(tree, element, TEXT_LIMIT)
    }

    /// Key for the turn at `index`.
    fn generate_turn_id(&self, tree: &DomTree, element: ElementId, index: usize) -> TurnKey;

    /// Bring a persisted key into this platform's key format.
    ///
    /// Legacy data stored bare positions (`"3"`); those become `prefix-3`.
    /// Keys already in platform format pass through unchanged.
    fn turn_id_from_stored(&self, stored: &str) -> TurnKey {
        let stored = stored.trim();
        match stored.parse::<usize>() {
            Ok(index) => TurnKey::from_index(self.id(), index),
            Err(_) => TurnKey::new(stored),
        }
    }

    /// Inverse of key generation: the position or host id behind `key`.
    fn extract_index_from_turn_id(&self, key: &str) -> Option<TurnRef> {
        let key = key.trim();
        if let Ok(index) = key.parse::<usize>() {
            return Some(TurnRef::Index(index));
        }
        let suffix = TurnKey::new(key).suffix(self.id())?.to_string();
        Some(match suffix.parse::<usize>() {
            Ok(index) => TurnRef::Index(index),
            Err(_) => TurnRef::Raw(suffix),
        })
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// True while the assistant is still producing a response.
    fn is_ai_generating(&self, _tree: &DomTree) -> bool {
        false
    }

    fn is_reverse_scroll(&self) -> bool {
        self.capabilities().reverse_scroll
    }
}
