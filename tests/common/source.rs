//! Scripted document sources

use std::collections::VecDeque;
use std::sync::Mutex;
use turnmark::dom::{DocumentSource, DomTree};
use turnmark::Generation;

/// Hands out a fixed sequence of snapshots; the last one repeats.
pub struct ScriptedSource {
    frames: Mutex<VecDeque<DomTree>>,
    last: Mutex<Option<DomTree>>,
    served: Mutex<usize>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<DomTree>) -> Self {
        Self {
            frames: Mutex::new(frames.into()),
            last: Mutex::new(None),
            served: Mutex::new(0),
        }
    }

    /// Number of snapshots taken so far.
    pub fn served(&self) -> usize {
        *self.served.lock().unwrap()
    }
}

impl DocumentSource for ScriptedSource {
    fn snapshot(&self) -> DomTree {
        *self.served.lock().unwrap() += 1;
        let mut last = self.last.lock().unwrap();
        if let Some(frame) = self.frames.lock().unwrap().pop_front() {
            *last = Some(frame);
        }
        last.clone().unwrap_or_default()
    }
}

/// Simulates the user navigating away while a snapshot is being taken.
pub struct NavigatingSource {
    pub tree: DomTree,
    pub generation: Generation,
}

impl DocumentSource for NavigatingSource {
    fn snapshot(&self) -> DomTree {
        self.generation.advance();
        self.tree.clone()
    }
}
