//! Document snapshot model
//!
//! An arena-backed element tree plus a small CSS selector engine. Every
//! discovery and identity function reads one of these snapshots instead of a
//! live document, so the same code runs against a browser bridge or a test
//! fixture.

mod selector;
mod text;
mod tree;

pub use selector::{Selector, SelectorError};
pub use text::{summarize_text, TEXT_LIMIT};
pub use tree::{DomTree, Element, ElementId};

/// Something that can hand out the current state of the host document.
///
/// Reconciliation polls call this once per attempt; implementations may
/// return a fresh parse, a bridge snapshot, or a scripted fixture.
pub trait DocumentSource: Send + Sync {
    fn snapshot(&self) -> DomTree;
}
