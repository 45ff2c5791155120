//! Synthetic host documents

use rand::rngs::StdRng;
use rand::Rng;
use turnmark::dom::{DomTree, Element, ElementId};

/// A ChatGPT-shaped conversation page.
pub struct ChatGptPage {
    pub tree: DomTree,
    pub thread: ElementId,
    pub turns: Vec<ElementId>,
}

/// Build a ChatGPT page with one user turn per entry of `host_ids`.
///
/// `None` means the host has not stamped `data-message-id` yet. Assistant
/// replies and sidebar chrome are included so the locator has something to
/// ignore.
pub fn chatgpt_page(host_ids: &[Option<&str>]) -> ChatGptPage {
    let mut tree = DomTree::new();
    let body = tree.append(tree.root(), Element::new("body"));
    let nav = tree.append(body, Element::new("nav"));
    tree.append(nav, Element::new("a").with_text("Previous chat"));
    let main = tree.append(body, Element::new("main"));
    let thread = tree.append(main, Element::new("div").with_class("thread"));

    let mut turns = Vec::new();
    for (i, id) in host_ids.iter().enumerate() {
        let mut turn = Element::new("div").with_attr("data-message-author-role", "user");
        if let Some(id) = id {
            turn = turn.with_attr("data-message-id", *id);
        }
        let turn = tree.append(thread, turn);
        tree.append(
            turn,
            Element::new("div")
                .with_class("whitespace-pre-wrap")
                .with_text(format!("user question {}", i)),
        );
        tree.append(
            thread,
            Element::new("div")
                .with_attr("data-message-author-role", "assistant")
                .with_text("assistant answer"),
        );
        turns.push(turn);
    }

    ChatGptPage { tree, thread, turns }
}

/// A random tree of `size` plain `div`s with `marked` of them carrying the
/// class `msg`. Returns the tree and the marked elements.
pub fn random_tree(rng: &mut StdRng, size: usize, marked: usize) -> (DomTree, Vec<ElementId>) {
    let mut tree = DomTree::new();
    let mut nodes = vec![tree.root()];
    for _ in 0..size {
        let parent = nodes[rng.gen_range(0..nodes.len())];
        nodes.push(tree.append(parent, Element::new("div")));
    }

    let mut messages = Vec::new();
    for _ in 0..marked {
        let parent = nodes[rng.gen_range(0..nodes.len())];
        messages.push(tree.append(parent, Element::new("p").with_class("msg")));
    }
    (tree, messages)
}
