//! A bounded store of off-rank elements fetched during a transport step.

use crate::element::Element;
use std::collections::{BTreeMap, BTreeSet};

/// Off-rank elements fetched on demand, together with the set of ids
/// with a fetch in flight. The store is bounded: inserting at capacity
/// evicts the smallest stored global id and forgets that it was ever
/// requested, so a later miss can request it again. An entry being
/// inserted is never the one evicted.
pub struct RemoteCache {
    stored: BTreeMap<u32, Element>,
    requested: BTreeSet<u32>,
    capacity: usize,
}

impl RemoteCache {
    /// Creates a cache holding at most `capacity` elements. A cache with
    /// no slots could never complete a fetch, so zero is promoted to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            stored: BTreeMap::new(),
            requested: BTreeSet::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.stored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.stored.contains_key(&id)
    }

    pub fn get(&self, id: u32) -> Option<&Element> {
        self.stored.get(&id)
    }

    /// Records that a fetch for `id` is in flight. Returns `false` when
    /// the id was already recorded, which suppresses duplicate requests.
    pub fn mark_requested(&mut self, id: u32) -> bool {
        self.requested.insert(id)
    }

    pub fn is_requested(&self, id: u32) -> bool {
        self.requested.contains(&id)
    }

    /// Files a fetched element, evicting the smallest stored global id
    /// first when the store is full. Returns the evicted id, if any.
    pub fn insert(&mut self, elem: Element) -> Option<u32> {
        let id = elem.id();
        let mut evicted = None;
        if self.stored.len() >= self.capacity && !self.stored.contains_key(&id) {
            if let Some(&victim) = self.stored.keys().next() {
                self.stored.remove(&victim);
                self.requested.remove(&victim);
                evicted = Some(victim);
            }
        }
        self.stored.insert(id, elem);
        evicted
    }

    /// Drops every stored element and every in-flight record.
    pub fn purge(&mut self) {
        self.stored.clear();
        self.requested.clear();
    }
}
