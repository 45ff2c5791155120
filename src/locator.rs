//! Conversation container locator
//!
//! The container is the last node of the longest common prefix of every
//! matched element's root path. All later scans and observers are scoped to
//! it, which keeps sidebar and navigation chrome out of the turn list.

use crate::dom::{DomTree, ElementId, Selector};

/// The located conversation subtree and the turns found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationScope {
    pub container: ElementId,
    /// Matched turn elements in document order
    pub matches: Vec<ElementId>,
    /// The matches only share the document node. The selector is too broad
    /// for this page and the container is as wide as it gets.
    pub coarse: bool,
}

impl ConversationScope {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Locate the conversation container for `selector`.
///
/// Returns `None` when nothing matches; the feature stays inactive.
pub fn locate_container(tree: &DomTree, selector: &Selector) -> Option<ConversationScope> {
    let matches = tree.select(selector);
    let (container, coarse) = lowest_common_ancestor(tree, &matches)?;
    if coarse {
        tracing::warn!(
            selector = selector.as_str(),
            matches = matches.len(),
            "turn paths diverge at the document root; using the whole document as container"
        );
    } else {
        tracing::debug!(
            selector = selector.as_str(),
            matches = matches.len(),
            container = %container,
            "conversation container located"
        );
    }
    Some(ConversationScope {
        container,
        matches,
        coarse,
    })
}

/// Deepest node that is a proper ancestor of every element in `elements`.
///
/// Detached elements are ignored. One element yields its parent. The bool
/// is true when the only shared ancestor is the document node.
pub fn lowest_common_ancestor(tree: &DomTree, elements: &[ElementId]) -> Option<(ElementId, bool)> {
    let paths: Vec<Vec<ElementId>> = elements
        .iter()
        .filter_map(|e| tree.path_from_root(*e))
        .collect();
    let first = paths.first()?;

    let mut common = first.len();
    for path in &paths[1..] {
        common = common.min(
            first
                .iter()
                .zip(path.iter())
                .take_while(|(a, b)| a == b)
                .count(),
        );
    }

    // A container must strictly contain every match: if the shared prefix
    // ends on a matched element (one turn nested in another, or a single
    // match), step up to its parent.
    let mut depth = common;
    while depth > 1 && elements.contains(&first[depth - 1]) {
        depth -= 1;
    }
    if depth == 0 {
        return None;
    }

    let container = first[depth - 1];
    let coarse = tree.is_document(container) && paths.len() > 1;
    Some((container, coarse))
}

/// True if the scope must be recomputed for the current snapshot.
///
/// Recompute only when the match count changes or a known match or the
/// container itself left the document; other mutations keep the scope.
pub fn needs_recompute(previous: Option<&ConversationScope>, tree: &DomTree, selector: &Selector) -> bool {
    let Some(scope) = previous else {
        return true;
    };
    if !tree.is_attached(scope.container) {
        return true;
    }
    if scope.matches.iter().any(|m| !tree.is_attached(*m)) {
        return true;
    }
    tree.select(selector).len() != scope.matches.len()
}
