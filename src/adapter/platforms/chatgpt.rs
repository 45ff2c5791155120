//! ChatGPT adapter
//!
//! User turns carry `data-message-author-role="user"`. The host stamps a
//! `data-message-id` on each turn, but only after the message round-trips to
//! the server, so freshly sent turns start out provisional.

use super::{builtin, host_is, path_of};
use crate::adapter::traits::{Capabilities, SiteAdapter};
use crate::dom::{summarize_text, DomTree, ElementId, Selector, TEXT_LIMIT};
use crate::identity::TurnKey;

const HOSTS: &[&str] = &["chatgpt.com", "chat.openai.com"];
const USER_TURNS: &str = "[data-message-author-role=\"user\"]";
const MESSAGE_BODY: &str = ".whitespace-pre-wrap";
const STOP_BUTTON: &str = "[data-testid=\"stop-button\"]";
const MESSAGE_ID_ATTR: &str = "data-message-id";

pub struct ChatGptAdapter {
    user_turns: Option<Selector>,
    message_body: Option<Selector>,
    stop_button: Option<Selector>,
}

impl ChatGptAdapter {
    pub fn new() -> Self {
        Self {
            user_turns: builtin(USER_TURNS),
            message_body: builtin(MESSAGE_BODY),
            stop_button: builtin(STOP_BUTTON),
        }
    }
}

impl Default for ChatGptAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteAdapter for ChatGptAdapter {
    fn id(&self) -> &str {
        "chatgpt"
    }

    fn matches(&self, url: &str) -> bool {
        host_is(url, HOSTS)
    }

    fn user_message_selector(&self, url: &str) -> Option<Selector> {
        // Conversations live at /c/<id> and /g/<gpt>/c/<id>
        if path_of(url).contains("/c/") {
            self.user_turns.clone()
        } else {
            None
        }
    }

    fn extract_text(&self, tree: &DomTree, element: ElementId) -> String {
        let body = self
            .message_body
            .as_ref()
            .and_then(|s| tree.select_first_within(element, s))
            .unwrap_or(element);
        summarize_text(tree, body, TEXT_LIMIT)
    }

    fn generate_turn_id(&self, tree: &DomTree, element: ElementId, index: usize) -> TurnKey {
        match tree.attr(element, MESSAGE_ID_ATTR).map(str::trim) {
            Some(id) if !id.is_empty() => TurnKey::from_host_id(self.id(), id),
            _ => TurnKey::from_index(self.id(), index),
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            stable_ids: true,
            reverse_scroll: false,
            generation_detection: true,
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
    use crate::adapter::TurnRef;
    use crate::dom::Element;

    fn user_turn(tree: &mut DomTree, parent: ElementId, id: Option<&str>) -> ElementId {
        let mut e = Element::new("div").with_attr("data-message-author-role", "user");
        if let Some(id) = id {
            e = e.with_attr(MESSAGE_ID_ATTR, id);
        }
        tree.append(parent, e)
    }

    #[test]
    fn selector_only_on_conversation_routes() {
        let a = ChatGptAdapter::new();
        assert!(a.user_message_selector("https://chatgpt.com/c/123").is_some());
        assert!(a.user_message_selector("https://chatgpt.com/g/g-abc/c/123").is_some());
        assert!(a.user_message_selector("https://chatgpt.com/").is_none());
    }

    #[test]
    fn host_id_wins_over_index() {
        let a = ChatGptAdapter::new();
        let mut tree = DomTree::new();
        let root = tree.root();
        let with_id = user_turn(&mut tree, root, Some("abc123"));
        let without = user_turn(&mut tree, root, None);
        assert_eq!(a.generate_turn_id(&tree, with_id, 0).as_str(), "chatgpt-abc123");
        assert_eq!(a.generate_turn_id(&tree, without, 1).as_str(), "chatgpt-1");
    }

    #[test]
    fn extracts_text_from_message_body() {
        let a = ChatGptAdapter::new();
        let mut tree = DomTree::new();
        let root = tree.root();
        let turn = user_turn(&mut tree, root, None);
        tree.append(turn, Element::new("span").with_text("You said:"));
        tree.append(turn, Element::new("div").with_class("whitespace-pre-wrap").with_text("hi there"));
        assert_eq!(a.extract_text(&tree, turn), "hi there");
    }

    #[test]
    fn index_extraction_distinguishes_host_ids() {
        let a = ChatGptAdapter::new();
        assert_eq!(a.extract_index_from_turn_id("chatgpt-7"), Some(TurnRef::Index(7)));
        assert_eq!(
            a.extract_index_from_turn_id("chatgpt-abc123"),
            Some(TurnRef::Raw("abc123".into()))
        );
        assert_eq!(a.extract_index_from_turn_id("5"), Some(TurnRef::Index(5)));
        assert_eq!(a.extract_index_from_turn_id("gemini-1"), None);
    }

    #[test]
    fn stop_button_means_generating() {
        let a = ChatGptAdapter::new();
        let mut tree = DomTree::new();
        assert!(!a.is_ai_generating(&tree));
        let root = tree.root();
        tree.append(root, Element::new("button").with_attr("data-testid", "stop-button"));
        assert!(a.is_ai_generating(&tree));
    }
}
