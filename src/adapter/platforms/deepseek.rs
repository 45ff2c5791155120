//! DeepSeek adapter

use super::{builtin, host_is, path_of};
use crate::adapter::traits::SiteAdapter;
use crate::dom::{DomTree, ElementId, Selector};
use crate::identity::TurnKey;

const HOSTS: &[&str] = &["chat.deepseek.com"];
const USER_TURNS: &str = ".ds-message[data-role=\"user\"]";

pub struct DeepSeekAdapter {
    user_turns: Option<Selector>,
}

impl DeepSeekAdapter {
    pub fn new() -> Self {
        Self {
            user_turns: builtin(USER_TURNS),
        }
    }
}

impl Default for DeepSeekAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteAdapter for DeepSeekAdapter {
    fn id(&self) -> &str {
        "deepseek"
    }

    fn matches(&self, url: &str) -> bool {
        host_is(url, HOSTS)
    }

    fn user_message_selector(&self, url: &str) -> Option<Selector> {
        // /a/chat/s/<id> on current builds, /chat/s/<id> on older ones
        if path_of(url).contains("/chat/s/") {
            self.user_turns.clone()
        } else {
            None
        }
    }

    fn generate_turn_id(&self, _tree: &DomTree, _element: ElementId, index: usize) -> TurnKey {
        TurnKey::from_index(self.id(), index)
    }
}
