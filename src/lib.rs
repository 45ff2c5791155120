//! Turnmark: conversation discovery and turn identity for chat documents
//!
//! Finds the conversation inside a host document the crate does not control,
//! gives every user turn a durable key, and persists annotations (stars, pins,
//! per-turn timestamps, folders) against those keys across sessions.
//!
//! # Core Concepts
//!
//! - **Adapters**: per-platform capability sets (selector, text, identifiers)
//! - **Container**: the lowest common ancestor of every matched turn
//! - **Turn keys**: provisional (position-derived) or stable (host-assigned)
//! - **Annotation store**: identity-keyed records over an async key-value port
//!
//! # Example
//!
//! ```
//! use turnmark::dom::{DomTree, Element};
//! use turnmark::locator::locate_container;
//! use turnmark::dom::Selector;
//!
//! let mut tree = DomTree::new();
//! let root = tree.append(tree.root(), Element::new("div").with_id("root"));
//! tree.append(root, Element::new("p").with_class("turn"));
//! tree.append(root, Element::new("p").with_class("turn"));
//!
//! let selector = Selector::parse(".turn").unwrap();
//! let scope = locate_container(&tree, &selector).unwrap();
//! assert_eq!(scope.container, root);
//! ```

pub mod adapter;
pub mod annotations;
pub mod clock;
pub mod config;
pub mod dom;
pub mod identity;
pub mod locator;
pub mod migration;
pub mod session;
pub mod storage;

pub use adapter::{AdapterRegistry, Capabilities, SiteAdapter, TurnRef};
pub use annotations::{
    AnnotationEvent, AnnotationPatch, AnnotationRecord, AnnotationStore, ConversationTimeRecord,
    Family, FolderError, FolderNode,
};
pub use clock::{Clock, Debouncer, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use identity::{PollPolicy, Turn, TurnIdentityResolver, TurnKey};
pub use locator::{locate_container, ConversationScope};
pub use migration::{MigrationCoordinator, MigrationReport};
pub use session::{Generation, Session, SessionEvent};
pub use storage::{KvStore, MemoryKv, SqliteKv, StorageError, StorageResult, StorageScope};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
