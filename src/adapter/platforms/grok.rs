//! Grok adapter
//!
//! Grok renders the thread newest-first in document order and flips it
//! visually, so turn order has to be reversed before indexing.

use super::{builtin, host_is, path_of};
use crate::adapter::traits::{Capabilities, SiteAdapter};
use crate::dom::{DomTree, ElementId, Selector};
use crate::identity::TurnKey;

const HOSTS: &[&str] = &["grok.com"];
const USER_TURNS: &str = ".items-end > .message-bubble";

pub struct GrokAdapter {
    user_turns: Option<Selector>,
}

impl GrokAdapter {
    pub fn new() -> Self {
        Self {
            user_turns: builtin(USER_TURNS),
        }
    }
}

impl Default for GrokAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteAdapter for GrokAdapter {
    fn id(&self) -> &str {
        "grok"
    }

    fn matches(&self, url: &str) -> bool {
        host_is(url, HOSTS)
    }

    fn user_message_selector(&self, url: &str) -> Option<Selector> {
        if path_of(url).starts_with("/c/") {
            self.user_turns.clone()
        } else {
            None
        }
    }

    fn generate_turn_id(&self, _tree: &DomTree, _element: ElementId, index: usize) -> TurnKey {
        TurnKey::from_index(self.id(), index)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reverse_scroll: true,
            ..Capabilities::default()
        }
    }
}
