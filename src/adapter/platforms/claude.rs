//! Claude adapter

use super::{builtin, host_is, path_of};
use crate::adapter::traits::SiteAdapter;
use crate::dom::{DomTree, ElementId, Selector};
use crate::identity::TurnKey;

const HOSTS: &[&str] = &["claude.ai"];
const USER_TURNS: &str = "[data-testid=\"user-message\"]";

pub struct ClaudeAdapter {
    user_turns: Option<Selector>,
}

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self {
            user_turns: builtin(USER_TURNS),
        }
    }
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteAdapter for ClaudeAdapter {
    fn id(&self) -> &str {
        "claude"
    }

    fn matches(&self, url: &str) -> bool {
        host_is(url, HOSTS)
    }

    fn user_message_selector(&self, url: &str) -> Option<Selector> {
        if path_of(url).starts_with("/chat/") {
            self.user_turns.clone()
        } else {
            None
        }
    }

    fn generate_turn_id(&self, _tree: &DomTree, _element: ElementId, index: usize) -> TurnKey {
        TurnKey::from_index(self.id(), index)
    }
}
