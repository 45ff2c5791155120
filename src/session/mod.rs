//! Per-page session
//!
//! Wires one adapter, the locator, the identity resolver, and the annotation
//! store together for the conversation currently shown. Everything is
//! injected; nothing here reaches for global state.
//!
//! The session never reads the live document itself. Callers hand it
//! snapshots: on load, after debounced mutations, and on each reconciliation
//! attempt.

mod events;
mod generation;

pub use events::SessionEvent;
pub use generation::{Generation, GenerationTicket};

use crate::adapter::{AdapterRegistry, SiteAdapter};
use crate::annotations::{AnnotationRecord, AnnotationStore};
use crate::clock::{Clock, Debouncer};
use crate::config::Config;
use crate::dom::{DocumentSource, DomTree, ElementId, Selector};
use crate::identity::{IdentityEffect, Turn, TurnIdentityResolver, TurnKey};
use crate::locator::{locate_container, needs_recompute, ConversationScope};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

pub struct Session {
    adapter: Arc<dyn SiteAdapter>,
    store: AnnotationStore,
    clock: Arc<dyn Clock>,
    url: String,
    selector: Option<Selector>,
    resolver: TurnIdentityResolver,
    scope: Option<ConversationScope>,
    /// Matched turns, oldest first
    turn_elements: Vec<ElementId>,
    debouncer: Debouncer,
    generation: Generation,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(
        adapter: Arc<dyn SiteAdapter>,
        store: AnnotationStore,
        clock: Arc<dyn Clock>,
        config: &Config,
        url: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            selector: adapter.user_message_selector(&url),
            resolver: TurnIdentityResolver::new(adapter.clone(), config.poll_policy()),
            adapter,
            store,
            clock,
            url,
            scope: None,
            turn_elements: Vec::new(),
            debouncer: Debouncer::new(config.locator.debounce_ms),
            generation: Generation::new(),
            events,
        }
    }

    /// Session for the adapter that claims `url`, if any does.
    pub fn from_registry(
        registry: &AdapterRegistry,
        store: AnnotationStore,
        clock: Arc<dyn Clock>,
        config: &Config,
        url: impl Into<String>,
    ) -> Option<Self> {
        let url = url.into();
        let adapter = registry.resolve(&url)?;
        Some(Self::new(adapter, store, clock, config, url))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn adapter(&self) -> &Arc<dyn SiteAdapter> {
        &self.adapter
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    /// Shared handle to the navigation counter, for work running elsewhere.
    pub fn generation_handle(&self) -> Generation {
        self.generation.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// True when the current URL is a conversation this adapter handles.
    pub fn is_active(&self) -> bool {
        self.selector.is_some()
    }

    pub fn container(&self) -> Option<ElementId> {
        self.scope.as_ref().map(|s| s.container)
    }

    pub fn scope(&self) -> Option<&ConversationScope> {
        self.scope.as_ref()
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.resolver.turns()
    }

    pub fn has_pending_reconciliation(&self) -> bool {
        self.resolver.has_pending()
    }

    pub fn is_generating(&self, tree: &DomTree) -> bool {
        self.adapter.is_ai_generating(tree)
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    fn now_i64(&self) -> i64 {
        i64::try_from(self.now()).unwrap_or(i64::MAX)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Mark the page as loaded: bumps `lastVisit` on a conversation that
    /// already has time data.
    pub async fn visit(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.store.timestamps().touch_visit(&self.url, self.now_i64()).await
    }

    /// Switch to another conversation.
    ///
    /// In-flight work from the previous page sees a stale generation and
    /// discards its results.
    pub async fn navigate(&mut self, url: impl Into<String>) {
        let generation = self.generation.advance();
        self.url = url.into();
        self.selector = self.adapter.user_message_selector(&self.url);
        self.resolver.reset();
        self.scope = None;
        self.turn_elements.clear();
        self.debouncer.cancel();
        tracing::debug!(url = %self.url, generation, active = self.is_active(), "navigated");
        self.visit().await;
    }

    /// Record a structural mutation; recomputation waits for a quiet period.
    pub fn notify_mutation(&mut self) {
        let now = self.now();
        self.debouncer.notify(now);
    }

    /// Refresh from `tree` if the debounce period has elapsed. Returns true
    /// if a refresh ran.
    pub async fn process_pending_mutations(&mut self, tree: &DomTree) -> bool {
        let now = self.now();
        if !self.debouncer.take_ready(now) {
            return false;
        }
        self.refresh(tree).await;
        true
    }

    /// Re-run discovery against `tree` if the previous scope is no longer
    /// valid. Returns true if the scope or turn list changed.
    pub async fn refresh(&mut self, tree: &DomTree) -> bool {
        let Some(selector) = self.selector.clone() else {
            return false;
        };
        if !needs_recompute(self.scope.as_ref(), tree, &selector) {
            return false;
        }

        let Some(scope) = locate_container(tree, &selector) else {
            return self.lose_container();
        };

        let previous = self.container();
        if previous != Some(scope.container) {
            self.emit(SessionEvent::ContainerChanged {
                url: self.url.clone(),
                container: scope.container,
                coarse: scope.coarse,
            });
        }

        let mut ordered = scope.matches.clone();
        if self.adapter.is_reverse_scroll() {
            ordered.reverse();
        }
        let now = self.now();
        let ticket = self.generation.ticket();
        let observation = self.resolver.observe(tree, &ordered, now);
        self.turn_elements = ordered;
        self.scope = Some(scope);
        self.apply_rekeys(observation.effects.clone(), &ticket).await;

        if observation.changed {
            self.emit(SessionEvent::TurnsChanged {
                url: self.url.clone(),
                keys: self.resolver.turns().into_iter().map(|t| t.key).collect(),
                added: observation.added.clone(),
            });
        }
        self.record_turn_times(&observation.added).await;

        observation.changed || previous != self.container()
    }

    fn lose_container(&mut self) -> bool {
        if self.scope.take().is_none() {
            return false;
        }
        self.resolver.reset();
        self.turn_elements.clear();
        tracing::debug!(url = %self.url, "conversation container lost");
        self.emit(SessionEvent::ContainerLost { url: self.url.clone() });
        true
    }

    async fn record_turn_times(&self, added: &[usize]) {
        if added.is_empty() {
            return;
        }
        let ticket = self.generation.ticket();
        let now = self.now_i64();
        for index in added {
            let Some(key) = self.resolver.key_at(*index) else {
                continue;
            };
            if ticket.is_stale() {
                tracing::debug!(url = %self.url, "navigation during timestamp recording; discarding");
                return;
            }
            self.store.timestamps().record_turn(&self.url, key, now).await;
        }
    }

    /// Run due reconciliation attempts against `tree` and apply the re-keys
    /// they produce.
    pub async fn reconcile(&mut self, tree: &DomTree) -> Vec<IdentityEffect> {
        let ticket = self.generation.ticket();
        let now = self.now();
        let effects = self.resolver.poll(tree, &self.turn_elements, now);

        self.apply_rekeys(effects, &ticket).await
    }

    /// Move stored records for each re-key, stopping at the first one that
    /// finds the page navigated away.
    async fn apply_rekeys(&self, effects: Vec<IdentityEffect>, ticket: &GenerationTicket) -> Vec<IdentityEffect> {
        let mut applied = Vec::with_capacity(effects.len());
        for effect in effects {
            if ticket.is_stale() {
                tracing::debug!(url = %self.url, "navigation during reconciliation; discarding re-keys");
                break;
            }
            let IdentityEffect::Rekey { index, from, to } = &effect;
            self.store.migrate_turn_key(&self.url, from, to).await;
            self.emit(SessionEvent::TurnKeyMigrated {
                url: self.url.clone(),
                index: *index,
                from: from.clone(),
                to: to.clone(),
            });
            applied.push(effect);
        }
        applied
    }

    /// Poll `source` at the configured interval until every turn is stable
    /// or exhausted, or until the page navigates away.
    pub async fn drive_reconciliation(&mut self, source: &dyn DocumentSource) -> Vec<IdentityEffect> {
        let ticket = self.generation.ticket();
        let mut applied = Vec::new();

        while let Some(due) = self.resolver.next_due_ms() {
            let now = self.now();
            if due > now {
                self.clock.sleep(due - now).await;
            }
            let tree = source.snapshot();
            if ticket.is_stale() {
                tracing::debug!(url = %self.url, "navigation during reconciliation; stopping");
                break;
            }
            self.refresh(&tree).await;
            applied.extend(self.reconcile(&tree).await);
        }
        applied
    }

    /// Key of the turn at `index`, if `element` is the element there.
    pub fn resolve_turn_key(&self, element: ElementId, index: usize) -> Option<TurnKey> {
        self.scope.as_ref()?;
        self.resolver.resolve_turn_key(element, index)
    }

    /// Element for a persisted key (current or legacy positional form).
    pub fn resolve_stored_key(&self, stored: &str) -> Option<ElementId> {
        self.scope.as_ref()?;
        self.resolver.find_by_stored_key(stored, &self.turn_elements)
    }

    fn record_for(&self, tree: &DomTree, index: usize) -> Option<AnnotationRecord> {
        let key = self.resolver.key_at(index)?;
        let element = *self.turn_elements.get(index)?;
        let text = self.adapter.extract_text(tree, element);
        Some(AnnotationRecord::new(&self.url, key, text, self.now_i64()))
    }

    /// Star the turn at `index`. False if there is no such turn or the write
    /// did not persist.
    pub async fn star_turn(&self, tree: &DomTree, index: usize) -> bool {
        match self.record_for(tree, index) {
            Some(record) => self.store.stars().upsert(record).await,
            None => false,
        }
    }

    pub async fn pin_turn(&self, tree: &DomTree, index: usize) -> bool {
        match self.record_for(tree, index) {
            Some(record) => self.store.pins().upsert(record).await,
            None => false,
        }
    }

    pub async fn unstar_turn(&self, index: usize) -> bool {
        let Some(key) = self.resolver.key_at(index) else {
            return false;
        };
        let record = AnnotationRecord::new(&self.url, key, "", 0);
        self.store.stars().remove(&record.key).await
    }

    /// Stars for this conversation that resolve to a turn on the page.
    pub async fn visible_stars(&self) -> Vec<(AnnotationRecord, ElementId)> {
        self.store
            .stars()
            .get_by_url(&self.url)
            .await
            .into_iter()
            .filter_map(|record| {
                let element = self.resolve_stored_key(&record.turn_key)?;
                Some((record, element))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ChatGptAdapter, ClaudeAdapter, GrokAdapter};
    use crate::clock::ManualClock;
    use crate::dom::Element;
    use crate::storage::MemoryKv;

    const CLAUDE_URL: &str = "https://claude.ai/chat/abc";

    fn claude_page(turns: usize) -> DomTree {
        let mut tree = DomTree::new();
        tree.append(tree.root(), Element::new("nav").with_class("sidebar"));
        let thread = tree.append(tree.root(), Element::new("div").with_id("thread"));
        for i in 0..turns {
            tree.append(
                thread,
                Element::new("div")
                    .with_attr("data-testid", "user-message")
                    .with_text(format!("question {}", i)),
            );
        }
        tree
    }

    fn session(adapter: Arc<dyn SiteAdapter>, url: &str) -> (Session, ManualClock) {
        let clock = ManualClock::new(1_000);
        let store = AnnotationStore::new(Arc::new(MemoryKv::new()));
        let session = Session::new(adapter, store, Arc::new(clock.clone()), &Config::default(), url);
        (session, clock)
    }

    #[tokio::test]
    async fn refresh_locates_container_and_keys_turns() {
        let (mut s, _) = session(Arc::new(ClaudeAdapter::new()), CLAUDE_URL);
        let mut rx = s.subscribe();
        let tree = claude_page(2);

        assert!(s.refresh(&tree).await);
        assert!(s.container().is_some());
        let keys: Vec<String> = s.turns().iter().map(|t| t.key.to_string()).collect();
        assert_eq!(keys, vec!["claude-0", "claude-1"]);

        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::ContainerChanged { .. }));
        match rx.recv().await.unwrap() {
            SessionEvent::TurnsChanged { added, .. } => assert_eq!(added, vec![0, 1]),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn unchanged_snapshot_does_not_recompute() {
        let (mut s, _) = session(Arc::new(ClaudeAdapter::new()), CLAUDE_URL);
        let tree = claude_page(2);
        s.refresh(&tree).await;
        assert!(!s.refresh(&tree).await);
    }

    #[tokio::test]
    async fn new_turns_get_timestamps_once() {
        let (mut s, clock) = session(Arc::new(ClaudeAdapter::new()), CLAUDE_URL);
        s.refresh(&claude_page(1)).await;
        clock.advance(5_000);
        s.refresh(&claude_page(2)).await;

        let times = s.store().timestamps().get(CLAUDE_URL).await.unwrap();
        assert_eq!(times.nodes.get("claude-0"), Some(&1_000));
        assert_eq!(times.nodes.get("claude-1"), Some(&6_000));
        assert_eq!(times.create_time, 1_000);
    }

    #[tokio::test]
    async fn losing_every_match_clears_identity() {
        let (mut s, _) = session(Arc::new(ClaudeAdapter::new()), CLAUDE_URL);
        s.refresh(&claude_page(2)).await;
        assert!(s.refresh(&claude_page(0)).await);
        assert_eq!(s.container(), None);
        assert_eq!(s.resolve_stored_key("claude-0"), None);
    }

    #[tokio::test]
    async fn inactive_route_does_nothing() {
        let (mut s, _) = session(Arc::new(ClaudeAdapter::new()), "https://claude.ai/new");
        assert!(!s.is_active());
        assert!(!s.refresh(&claude_page(2)).await);
        assert_eq!(s.container(), None);
    }

    #[tokio::test]
    async fn mutations_are_debounced() {
        let (mut s, clock) = session(Arc::new(ClaudeAdapter::new()), CLAUDE_URL);
        let tree = claude_page(1);
        s.notify_mutation();
        clock.advance(100);
        assert!(!s.process_pending_mutations(&tree).await);
        s.notify_mutation();
        clock.advance(299);
        assert!(!s.process_pending_mutations(&tree).await);
        clock.advance(1);
        assert!(s.process_pending_mutations(&tree).await);
        assert_eq!(s.turns().len(), 1);
    }

    #[tokio::test]
    async fn star_and_resolve_round_trip() {
        let (mut s, _) = session(Arc::new(ClaudeAdapter::new()), CLAUDE_URL);
        let tree = claude_page(3);
        s.refresh(&tree).await;

        assert!(s.star_turn(&tree, 1).await);
        assert!(!s.star_turn(&tree, 9).await);
        let visible = s.visible_stars().await;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].0.display_text, "question 1");
        assert_eq!(visible[0].1, s.turns()[1].element);

        assert!(s.unstar_turn(1).await);
        assert!(s.visible_stars().await.is_empty());
    }

    #[tokio::test]
    async fn reverse_scroll_turns_are_keyed_oldest_first() {
        let (mut s, _) = session(Arc::new(GrokAdapter::new()), "https://grok.com/c/1");
        let mut tree = DomTree::new();
        let list = tree.append(tree.root(), Element::new("div").with_class("items-end"));
        // Newest first in document order
        let newest = tree.append(list, Element::new("div").with_class("message-bubble").with_text("second"));
        let oldest = tree.append(list, Element::new("div").with_class("message-bubble").with_text("first"));

        s.refresh(&tree).await;
        assert_eq!(s.resolve_turn_key(oldest, 0).unwrap().as_str(), "grok-0");
        assert_eq!(s.resolve_turn_key(newest, 1).unwrap().as_str(), "grok-1");
    }

    #[tokio::test]
    async fn reverse_scroll_new_turn_is_appended_after_existing_keys() {
        let (mut s, _) = session(Arc::new(GrokAdapter::new()), "https://grok.com/c/1");
        let bubble = |text: &str| Element::new("div").with_class("message-bubble").with_text(text);

        let mut tree = DomTree::new();
        let list = tree.append(tree.root(), Element::new("div").with_class("items-end"));
        tree.append(list, bubble("second"));
        tree.append(list, bubble("first"));
        s.refresh(&tree).await;
        s.star_turn(&tree, 0).await;

        // The host renders the newest turn at the top of the document
        let mut grown = DomTree::new();
        let list = grown.append(grown.root(), Element::new("div").with_class("items-end"));
        let third = grown.append(list, bubble("third"));
        grown.append(list, bubble("second"));
        let first = grown.append(list, bubble("first"));
        let mut rx = s.subscribe();
        assert!(s.refresh(&grown).await);

        assert_eq!(s.resolve_turn_key(first, 0).unwrap().as_str(), "grok-0");
        assert_eq!(s.resolve_turn_key(third, 2).unwrap().as_str(), "grok-2");
        match rx.recv().await.unwrap() {
            SessionEvent::TurnsChanged { added, .. } => assert_eq!(added, vec![2]),
            other => panic!("unexpected event {:?}", other),
        }
        let visible = s.visible_stars().await;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].0.display_text, "first");
        assert_eq!(visible[0].1, first);
    }

    #[tokio::test]
    async fn navigation_discards_pending_reconciliation() {
        let (mut s, _) = session(Arc::new(ChatGptAdapter::new()), "https://chatgpt.com/c/1");
        let mut tree = DomTree::new();
        let main = tree.append(tree.root(), Element::new("main"));
        tree.append(main, Element::new("div").with_attr("data-message-author-role", "user"));
        s.refresh(&tree).await;
        assert!(s.has_pending_reconciliation());

        s.navigate("https://chatgpt.com/c/2").await;
        assert!(!s.has_pending_reconciliation());
        assert_eq!(s.container(), None);
        assert_eq!(s.generation_handle().current(), 1);
    }
}
