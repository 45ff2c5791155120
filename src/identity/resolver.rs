//! Turn identity resolver
//!
//! Each position in the turn list holds one slot. A slot is either stable
//! (terminal) or provisional while the host has not yet assigned its
//! identifier. Provisional slots are re-derived on a fixed schedule until
//! the host id appears or the attempt budget runs out.
//!
//! The resolver never touches storage. Promotions come back as
//! `IdentityEffect::Rekey` values for the caller to apply.

use super::key::TurnKey;
use crate::adapter::SiteAdapter;
use crate::dom::{DomTree, ElementId};
use std::collections::HashMap;
use std::sync::Arc;

/// Reconciliation schedule for provisional keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            max_attempts: 20,
        }
    }
}

/// Lifecycle of one turn's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Waiting for the host id; re-checked at `next_due_ms`
    Provisional { attempts: u32, next_due_ms: u64 },
    /// Attempt budget spent; provisional for the rest of the session
    Exhausted,
    Stable,
}

impl TurnState {
    pub fn is_stable(&self) -> bool {
        matches!(self, TurnState::Stable)
    }
}

/// A turn as currently resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub index: usize,
    pub key: TurnKey,
    pub element: ElementId,
    pub state: TurnState,
}

/// Side effects the caller must apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEffect {
    /// Records stored under `from` now belong to `to`.
    Rekey { index: usize, from: TurnKey, to: TurnKey },
}

/// Result of observing a new turn list.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    /// True if the key sequence changed
    pub changed: bool,
    /// Indices holding turns not seen before this observation
    pub added: Vec<usize>,
    /// Positional keys that moved with their turn, in the order they must
    /// be applied
    pub effects: Vec<IdentityEffect>,
}

#[derive(Debug, Clone)]
struct Slot {
    key: TurnKey,
    element: ElementId,
    state: TurnState,
}

pub struct TurnIdentityResolver {
    adapter: Arc<dyn SiteAdapter>,
    policy: PollPolicy,
    slots: Vec<Slot>,
}

impl TurnIdentityResolver {
    pub fn new(adapter: Arc<dyn SiteAdapter>, policy: PollPolicy) -> Self {
        Self {
            adapter,
            policy,
            slots: Vec::new(),
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Forget every slot (navigation, container lost).
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// Take in the current turn list, oldest first.
    ///
    /// On platforms without host ids every key is positional and is simply
    /// re-derived. Otherwise a turn is matched to a known slot by its host
    /// id first and by element second, so prepended or dropped turns never
    /// inherit a neighbour's key. Provisional keys that moved to a new
    /// position are re-keyed to that position.
    pub fn observe(&mut self, tree: &DomTree, matches: &[ElementId], now_ms: u64) -> Observation {
        let previous = std::mem::take(&mut self.slots);
        let previous_keys: Vec<TurnKey> = previous.iter().map(|s| s.key.clone()).collect();

        let (slots, fresh) = if self.adapter.capabilities().stable_ids {
            self.match_slots(tree, matches, previous, now_ms)
        } else {
            let slots = matches
                .iter()
                .enumerate()
                .map(|(index, element)| Slot {
                    key: self.adapter.generate_turn_id(tree, *element, index),
                    element: *element,
                    state: TurnState::Stable,
                })
                .collect::<Vec<_>>();
            let fresh: Vec<bool> = slots.iter().map(|s| !previous_keys.contains(&s.key)).collect();
            (slots, fresh)
        };
        self.slots = slots;

        let effects = self.realign_positional_keys();

        let mut observation = Observation {
            changed: previous_keys.len() != self.slots.len()
                || previous_keys.iter().zip(&self.slots).any(|(k, s)| *k != s.key),
            added: Vec::new(),
            effects,
        };
        for (index, slot) in self.slots.iter().enumerate() {
            if fresh[index] {
                tracing::debug!(index, turn_key = %slot.key, state = ?slot.state, "turn observed");
                observation.added.push(index);
            }
        }
        observation
    }

    /// Pair each match with a known slot on a host-id platform.
    ///
    /// Host ids claim their slot first; the remaining matches fall back to
    /// the slot that last held the same element, unless that slot is stable
    /// and the element now reports a different host id.
    fn match_slots(
        &self,
        tree: &DomTree,
        matches: &[ElementId],
        previous: Vec<Slot>,
        now_ms: u64,
    ) -> (Vec<Slot>, Vec<bool>) {
        let mut pool: Vec<Option<Slot>> = previous.into_iter().map(Some).collect();
        let mut by_key: HashMap<TurnKey, usize> = HashMap::new();
        let mut by_element: HashMap<ElementId, usize> = HashMap::new();
        for (i, slot) in pool.iter().flatten().enumerate() {
            if slot.state.is_stable() {
                by_key.insert(slot.key.clone(), i);
            }
            by_element.insert(slot.element, i);
        }

        let derived: Vec<(TurnKey, bool)> = matches
            .iter()
            .enumerate()
            .map(|(index, element)| {
                let key = self.adapter.generate_turn_id(tree, *element, index);
                let hosted = key != TurnKey::from_index(self.adapter.id(), index);
                (key, hosted)
            })
            .collect();

        let mut claimed: Vec<Option<Slot>> = vec![None; matches.len()];
        for (index, (key, hosted)) in derived.iter().enumerate() {
            if !*hosted {
                continue;
            }
            if let Some(slot) = by_key.get(key).and_then(|i| pool[*i].take()) {
                claimed[index] = Some(slot);
            }
        }

        let mut slots = Vec::with_capacity(matches.len());
        let mut fresh = Vec::with_capacity(matches.len());
        for (index, element) in matches.iter().copied().enumerate() {
            let (key, hosted) = &derived[index];
            let carried = claimed[index].take().or_else(|| {
                let i = *by_element.get(&element)?;
                let keep = pool[i].as_ref().map(|s| !(*hosted && s.state.is_stable()))?;
                if keep {
                    pool[i].take()
                } else {
                    None
                }
            });

            match carried {
                Some(slot) => {
                    slots.push(Slot { element, ..slot });
                    fresh.push(false);
                }
                None => {
                    let state = if *hosted {
                        TurnState::Stable
                    } else {
                        self.provisional_state(now_ms)
                    };
                    slots.push(Slot {
                        key: key.clone(),
                        element,
                        state,
                    });
                    fresh.push(true);
                }
            }
        }
        (slots, fresh)
    }

    /// Move provisional keys that no longer match their position.
    ///
    /// A re-key is only issued once its target is no longer held by another
    /// pending move, so records never land on a key still in use. Moves
    /// that form a cycle keep their old keys.
    fn realign_positional_keys(&mut self) -> Vec<IdentityEffect> {
        let prefix = self.adapter.id().to_string();
        let mut pending: Vec<(usize, TurnKey)> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.state.is_stable())
            .map(|(index, _)| (index, TurnKey::from_index(&prefix, index)))
            .filter(|(index, target)| self.slots[*index].key != *target)
            .collect();

        let mut effects = Vec::new();
        loop {
            let ready = pending.iter().position(|(_, target)| {
                !pending
                    .iter()
                    .any(|(other, _)| self.slots[*other].key == *target)
            });
            let Some(at) = ready else {
                break;
            };
            let (index, target) = pending.remove(at);
            let from = std::mem::replace(&mut self.slots[index].key, target.clone());
            tracing::debug!(index, from = %from, to = %target, "provisional turn moved");
            effects.push(IdentityEffect::Rekey { index, from, to: target });
        }
        effects
    }

    fn provisional_state(&self, now_ms: u64) -> TurnState {
        TurnState::Provisional {
            attempts: 0,
            next_due_ms: now_ms.saturating_add(self.policy.interval_ms),
        }
    }

    /// Run every due reconciliation attempt.
    ///
    /// A slot is promoted when the adapter derives a host key for its
    /// element.
    pub fn poll(&mut self, tree: &DomTree, matches: &[ElementId], now_ms: u64) -> Vec<IdentityEffect> {
        let mut effects = Vec::new();
        let policy = self.policy;
        let adapter = &self.adapter;
        let prefix = adapter.id().to_string();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let TurnState::Provisional { attempts, next_due_ms } = slot.state else {
                continue;
            };
            if now_ms < next_due_ms {
                continue;
            }
            let attempt = attempts + 1;

            let derived = matches
                .get(index)
                .filter(|e| tree.is_attached(**e))
                .map(|e| adapter.generate_turn_id(tree, *e, index));

            match derived {
                Some(key) if key != slot.key && key != TurnKey::from_index(&prefix, index) => {
                    tracing::info!(index, attempt, from = %slot.key, to = %key, "provisional turn key promoted");
                    effects.push(IdentityEffect::Rekey {
                        index,
                        from: slot.key.clone(),
                        to: key.clone(),
                    });
                    slot.key = key;
                    slot.state = TurnState::Stable;
                }
                _ if attempt >= policy.max_attempts => {
                    tracing::debug!(index, attempt, turn_key = %slot.key, "reconciliation budget exhausted");
                    slot.state = TurnState::Exhausted;
                }
                _ => {
                    slot.state = TurnState::Provisional {
                        attempts: attempt,
                        next_due_ms: now_ms.saturating_add(policy.interval_ms),
                    };
                }
            }
        }

        effects
    }

    /// True while any slot is still waiting for its host id.
    pub fn has_pending(&self) -> bool {
        self.slots
            .iter()
            .any(|s| matches!(s.state, TurnState::Provisional { .. }))
    }

    /// Earliest time a pending slot is due.
    pub fn next_due_ms(&self) -> Option<u64> {
        self.slots
            .iter()
            .filter_map(|s| match s.state {
                TurnState::Provisional { next_due_ms, .. } => Some(next_due_ms),
                _ => None,
            })
            .min()
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, s)| Turn {
                index,
                key: s.key.clone(),
                element: s.element,
                state: s.state,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Key for the turn at `index`, if `element` is the element known there.
    pub fn resolve_turn_key(&self, element: ElementId, index: usize) -> Option<TurnKey> {
        self.slots
            .get(index)
            .filter(|s| s.element == element)
            .map(|s| s.key.clone())
    }

    pub fn key_at(&self, index: usize) -> Option<&TurnKey> {
        self.slots.get(index).map(|s| &s.key)
    }

    /// Find the element for a persisted key.
    ///
    /// Exact key match first (raw, then in platform format). Failing that, a
    /// bare number is treated as a position in `matches`; anything else is
    /// not found.
    pub fn find_by_stored_key(&self, stored: &str, matches: &[ElementId]) -> Option<ElementId> {
        let stored = stored.trim();
        let normalized = self.adapter.turn_id_from_stored(stored);
        let exact = self
            .slots
            .iter()
            .position(|s| s.key.as_str() == stored || s.key == normalized);
        if let Some(index) = exact {
            return matches.get(index).copied();
        }

        let index = stored.parse::<usize>().ok()?;
        matches.get(index).copied()
    }
}
