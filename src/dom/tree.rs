//! Arena-backed element tree

use super::selector::Selector;
use std::collections::BTreeMap;

/// Handle to an element inside one `DomTree`.
///
/// Handles are plain indices; they stay valid after `detach` (the element
/// still exists, it is just no longer reachable from the root).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

impl ElementId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tag, attributes, and own text of a single element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    /// Text directly owned by this element (not its descendants)
    pub text: String,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_id(self, id: impl Into<String>) -> Self {
        self.with_attr("id", id)
    }

    /// Add a class, keeping any classes already present.
    pub fn with_class(mut self, class: impl AsRef<str>) -> Self {
        let class = class.as_ref();
        let merged = match self.attrs.get("class") {
            Some(existing) if !existing.is_empty() => format!("{} {}", existing, class),
            _ => class.to_string(),
        };
        self.attrs.insert("class".to_string(), merged);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_ascii_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    element: Element,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

/// A snapshot of a host document.
///
/// Index 0 is always the document node (tag `#document`); it never matches a
/// selector and cannot be detached.
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<NodeData>,
}

impl DomTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                element: Element::new("#document"),
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> ElementId {
        ElementId(0)
    }

    pub fn is_document(&self, id: ElementId) -> bool {
        id.0 == 0
    }

    /// Total number of elements ever created, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Append `element` as the last child of `parent`.
    ///
    /// An unknown parent leaves the new element detached.
    pub fn append(&mut self, parent: ElementId, element: Element) -> ElementId {
        let id = ElementId(self.nodes.len());
        let parent = self.nodes.get(parent.0).map(|_| parent);
        self.nodes.push(NodeData {
            element,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        id
    }

    /// Remove `id` (and therefore its subtree) from the document.
    pub fn detach(&mut self, id: ElementId) {
        if self.is_document(id) {
            return;
        }
        let Some(parent) = self.nodes.get(id.0).and_then(|n| n.parent) else {
            return;
        };
        self.nodes[parent.0].children.retain(|c| *c != id);
        self.nodes[id.0].parent = None;
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.nodes.get(id.0).map(|n| &n.element)
    }

    pub fn attr(&self, id: ElementId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attr(name))
    }

    pub fn set_attr(&mut self, id: ElementId, name: impl Into<String>, value: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.element.attrs.insert(name.into(), value.into());
        }
    }

    pub fn remove_attr(&mut self, id: ElementId, name: &str) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.element.attrs.remove(name);
        }
    }

    pub fn set_text(&mut self, id: ElementId, text: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.element.text = text.into();
        }
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// True if `id` is reachable from the document node.
    pub fn is_attached(&self, id: ElementId) -> bool {
        self.path_from_root(id).is_some()
    }

    /// Ancestor path `[document, ..., id]`, or `None` when detached.
    pub fn path_from_root(&self, id: ElementId) -> Option<Vec<ElementId>> {
        self.nodes.get(id.0)?;
        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            path.push(parent);
            current = parent;
        }
        if !self.is_document(current) {
            return None;
        }
        path.reverse();
        Some(path)
    }

    /// True if `ancestor` is `node` or one of its ancestors.
    pub fn contains(&self, ancestor: ElementId, node: ElementId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Descendants of `scope` in document (pre-)order, excluding `scope`.
    pub fn descendants(&self, scope: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = self.children(scope).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// All attached elements matching `selector`, in document order.
    pub fn select(&self, selector: &Selector) -> Vec<ElementId> {
        self.select_within(self.root(), selector)
    }

    /// Elements under `scope` (exclusive) matching `selector`.
    pub fn select_within(&self, scope: ElementId, selector: &Selector) -> Vec<ElementId> {
        self.descendants(scope)
            .into_iter()
            .filter(|id| selector.matches(self, *id))
            .collect()
    }

    /// First match under `scope`, if any.
    pub fn select_first_within(&self, scope: ElementId, selector: &Selector) -> Option<ElementId> {
        self.descendants(scope)
            .into_iter()
            .find(|id| selector.matches(self, *id))
    }

    /// Concatenated text of `id` and all its descendants, space separated.
    pub fn text_content(&self, id: ElementId) -> String {
        let mut parts = Vec::new();
        if let Some(e) = self.element(id) {
            parts.push(e.text.as_str());
        }
        for d in self.descendants(id) {
            if let Some(e) = self.element(d) {
                parts.push(e.text.as_str());
            }
        }
        parts
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (DomTree, ElementId, ElementId, ElementId) {
        let mut tree = DomTree::new();
        let body = tree.append(tree.root(), Element::new("body"));
        let main = tree.append(body, Element::new("main").with_id("main"));
        let p = tree.append(main, Element::new("p").with_text("hello"));
        (tree, body, main, p)
    }

    #[test]
    fn path_from_root_walks_ancestors() {
        let (tree, body, main, p) = sample();
        assert_eq!(
            tree.path_from_root(p),
            Some(vec![tree.root(), body, main, p])
        );
    }

    #[test]
    fn detached_subtree_has_no_path() {
        let (mut tree, _body, main, p) = sample();
        tree.detach(main);
        assert!(!tree.is_attached(main));
        assert!(!tree.is_attached(p));
        assert!(tree.path_from_root(p).is_none());
    }

    #[test]
    fn document_cannot_be_detached() {
        let (mut tree, _, _, _) = sample();
        let root = tree.root();
        tree.detach(root);
        assert!(tree.is_attached(root));
    }

    #[test]
    fn descendants_are_in_document_order() {
        let mut tree = DomTree::new();
        let a = tree.append(tree.root(), Element::new("a"));
        let b = tree.append(a, Element::new("b"));
        let c = tree.append(tree.root(), Element::new("c"));
        assert_eq!(tree.descendants(tree.root()), vec![a, b, c]);
    }

    #[test]
    fn text_content_joins_descendants() {
        let mut tree = DomTree::new();
        let div = tree.append(tree.root(), Element::new("div").with_text("one"));
        tree.append(div, Element::new("span").with_text("two"));
        tree.append(div, Element::new("span"));
        assert_eq!(tree.text_content(div), "one two");
    }

    #[test]
    fn with_class_accumulates() {
        let e = Element::new("div").with_class("a").with_class("b");
        assert!(e.has_class("a"));
        assert!(e.has_class("b"));
        assert!(!e.has_class("c"));
    }
}
