//! Navigation generation counter
//!
//! Every navigation bumps the counter. Async work takes a ticket before it
//! starts and checks it before writing; a stale ticket means the page moved
//! on and the result belongs to a conversation that is no longer shown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Generation {
    current: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Start a new generation, invalidating every outstanding ticket.
    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn ticket(&self) -> GenerationTicket {
        GenerationTicket {
            current: self.current.clone(),
            issued: self.current(),
        }
    }
}

/// Snapshot of the generation at the time work started.
#[derive(Debug, Clone)]
pub struct GenerationTicket {
    current: Arc<AtomicU64>,
    issued: u64,
}

impl GenerationTicket {
    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn is_stale(&self) -> bool {
        self.current.load(Ordering::SeqCst) != self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_starts_fresh() {
        let generation = Generation::new();
        assert!(!generation.ticket().is_stale());
    }

    #[test]
    fn advance_invalidates_outstanding_tickets() {
        let generation = Generation::new();
        let ticket = generation.ticket();
        assert_eq!(generation.advance(), 1);
        assert!(ticket.is_stale());
        assert!(!generation.ticket().is_stale());
    }

    #[test]
    fn clones_share_the_counter() {
        let generation = Generation::new();
        let handle = generation.clone();
        let ticket = generation.ticket();
        handle.advance();
        assert!(ticket.is_stale());
    }
}
