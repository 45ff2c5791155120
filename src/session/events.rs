//! Session events fired as discovery and identity state changes

use crate::dom::ElementId;
use crate::identity::TurnKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A container was located, or a different one replaced it
    ContainerChanged {
        url: String,
        container: ElementId,
        /// Only the document node is shared; see `ConversationScope::coarse`
        coarse: bool,
    },
    /// The set of matched turns changed
    TurnsChanged {
        url: String,
        /// Every current key, oldest turn first
        keys: Vec<TurnKey>,
        /// Positions first seen in this change
        added: Vec<usize>,
    },
    /// A provisional key was promoted and its records re-keyed
    TurnKeyMigrated {
        url: String,
        index: usize,
        from: TurnKey,
        to: TurnKey,
    },
    /// The previously located container is gone
    ContainerLost { url: String },
}

impl SessionEvent {
    pub fn url(&self) -> &str {
        match self {
            SessionEvent::ContainerChanged { url, .. }
            | SessionEvent::TurnsChanged { url, .. }
            | SessionEvent::TurnKeyMigrated { url, .. }
            | SessionEvent::ContainerLost { url } => url,
        }
    }
}
