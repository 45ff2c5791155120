//! Common test utilities for turnmark integration tests
//!
//! Page builders for the supported platforms and scripted document sources
//! for driving reconciliation deterministically.

#![allow(dead_code)]

pub mod pages;
pub mod source;

pub use pages::{chatgpt_page, random_tree, ChatGptPage};
pub use source::{NavigatingSource, ScriptedSource};

use std::sync::Arc;
use turnmark::{AnnotationStore, Config, ManualClock, MemoryKv, Session, SiteAdapter};

pub const CHATGPT_URL: &str = "https://chatgpt.com/c/conv-1";

/// A session over a fresh in-memory store, with the clock it reads.
pub fn session_for(adapter: Arc<dyn SiteAdapter>, url: &str) -> (Session, ManualClock, Arc<MemoryKv>) {
    let clock = ManualClock::new(10_000);
    let kv = Arc::new(MemoryKv::new());
    let store = AnnotationStore::new(kv.clone());
    let session = Session::new(adapter, store, Arc::new(clock.clone()), &Config::default(), url);
    (session, clock, kv)
}
