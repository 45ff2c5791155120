//! Adapter registry — resolves the adapter for a page URL
//!
//! First match wins, in registration order. Resolution happens once per
//! page; adapters are immutable after construction and shared by `Arc`.

use super::platforms::{ChatGptAdapter, ClaudeAdapter, DeepSeekAdapter, GeminiAdapter, GrokAdapter};
use super::traits::SiteAdapter;
use std::sync::Arc;

pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn SiteAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Registry with every built-in platform.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ChatGptAdapter::new()));
        registry.register(Arc::new(GeminiAdapter::new()));
        registry.register(Arc::new(ClaudeAdapter::new()));
        registry.register(Arc::new(DeepSeekAdapter::new()));
        registry.register(Arc::new(GrokAdapter::new()));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn SiteAdapter>) {
        self.adapters.push(adapter);
    }

    /// The adapter handling `url`, if any.
    pub fn resolve(&self, url: &str) -> Option<Arc<dyn SiteAdapter>> {
        let found = self.adapters.iter().find(|a| a.matches(url)).cloned();
        match &found {
            Some(adapter) => tracing::debug!(url, adapter = adapter.id(), "adapter resolved"),
            None => tracing::debug!(url, "no adapter for url"),
        }
        found
    }

    /// Look up an adapter by its id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn SiteAdapter>> {
        self.adapters.iter().find(|a| a.id() == id).cloned()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.id()).collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
