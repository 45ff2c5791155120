//! Gemini adapter

use super::{builtin, host_is, path_of};
use crate::adapter::traits::{Capabilities, SiteAdapter};
use crate::dom::{summarize_text, DomTree, ElementId, Selector, TEXT_LIMIT};
use crate::identity::TurnKey;

const HOSTS: &[&str] = &["gemini.google.com"];
const USER_TURNS: &str = "user-query";
const QUERY_TEXT: &str = ".query-text";
const STOP_BUTTON: &str = "button[aria-label=\"Stop response\"]";

pub struct GeminiAdapter {
    user_turns: Option<Selector>,
    query_text: Option<Selector>,
    stop_button: Option<Selector>,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self {
            user_turns: builtin(USER_TURNS),
            query_text: builtin(QUERY_TEXT),
            stop_button: builtin(STOP_BUTTON),
        }
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteAdapter for GeminiAdapter {
    fn id(&self) -> &str {
        "gemini"
    }

    fn matches(&self, url: &str) -> bool {
        host_is(url, HOSTS)
    }

    fn user_message_selector(&self, url: &str) -> Option<Selector> {
        let path = path_of(url);
        let in_conversation = path
            .strip_prefix("/app/")
            .or_else(|| path.strip_prefix("/gem/"))
            .map(|rest| !rest.is_empty())
            .unwrap_or(false);
        if in_conversation {
            self.user_turns.clone()
        } else {
            None
        }
    }

    fn extract_text(&self, tree: &DomTree, element: ElementId) -> String {
        let body = self
            .query_text
            .as_ref()
            .and_then(|s| tree.select_first_within(element, s))
            .unwrap_or(element);
        summarize_text(tree, body, TEXT_LIMIT)
    }

    fn generate_turn_id(&self, _tree: &DomTree, _element: ElementId, index: usize) -> TurnKey {
        TurnKey::from_index(self.id(), index)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            generation_detection: true,
            ..Capabilities::default()
        }
    }

    fn is_ai_generating(&self, tree: &DomTree) -> bool {
        self.stop_button
            .as_ref()
            .map(|s| !tree.select(s).is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Element;

    #[test]
    fn conversation_routes_only() {
        let a = GeminiAdapter::new();
        assert!(a.user_message_selector("https://gemini.google.com/app/8d1f").is_some());
        assert!(a.user_message_selector("https://gemini.google.com/gem/coder/77").is_some());
        assert!(a.user_message_selector("https://gemini.google.com/app/").is_none());
        assert!(a.user_message_selector("https://gemini.google.com/").is_none());
    }

    #[test]
    fn keys_are_positional() {
        let a = GeminiAdapter::new();
        let mut tree = DomTree::new();
        let q = tree.append(tree.root(), Element::new("user-query"));
        assert_eq!(a.generate_turn_id(&tree, q, 3).as_str(), "gemini-3");
        assert!(!a.capabilities().stable_ids);
    }
}
