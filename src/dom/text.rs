//! Display-text extraction for turns

use super::tree::{DomTree, ElementId};

/// Maximum characters kept for a turn's display text.
pub const TEXT_LIMIT: usize = 200;

const IMAGE_TAGS: &[&str] = &["img", "picture", "canvas", "svg"];
const ATTACHMENT_TAGS: &[&str] = &["object", "embed", "video", "audio"];

/// Collapse whitespace, trim, and truncate the text under `id`.
///
/// Never fails: turns with no text get a placeholder describing what they
/// contain instead.
pub fn summarize_text(tree: &DomTree, id: ElementId, limit: usize) -> String {
    let collapsed = tree
        .text_content(id)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if collapsed.is_empty() {
        return placeholder(tree, id).to_string();
    }

    if collapsed.chars().count() <= limit {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(limit).collect();
    truncated.push('…');
    truncated
}

fn placeholder(tree: &DomTree, id: ElementId) -> &'static str {
    let mut subtree = tree.descendants(id);
    subtree.push(id);
    let has_tag = |tags: &[&str]| {
        subtree.iter().any(|d| {
            tree.element(*d)
                .map(|e| tags.contains(&e.tag.as_str()))
                .unwrap_or(false)
        })
    };
    let has_download = subtree.iter().any(|d| tree.attr(*d, "download").is_some());

    if has_tag(IMAGE_TAGS) {
        "[Image]"
    } else if has_download || has_tag(ATTACHMENT_TAGS) {
        "[Attachment]"
    } else {
        "[Empty message]"
    }
}
