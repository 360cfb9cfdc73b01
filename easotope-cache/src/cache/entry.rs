//! Cache entries and the per-plugin entry store.

use super::plugin::EntityPlugin;
use super::subscriber::Subscriber;
use easotope_events::CorrelationId;
use std::collections::HashMap;
use std::fmt;

/// A one-shot subscriber waiting for the outstanding fetch of an entry.
pub(crate) struct Waiter<P: EntityPlugin> {
    /// The id returned to this waiter by `get`.
    pub id: CorrelationId,
    pub subscriber: Subscriber<P>,
}

/// One cached key.
///
/// An entry exists as soon as a fetch for its key is outstanding. `value`
/// is `None` until the first fetch completes and again while a reload is
/// in flight; `previous` then holds the value being reloaded so the reload
/// result can be compared against it.
pub struct CacheEntry<P: EntityPlugin> {
    pub(crate) value: Option<P::Value>,
    /// Fetch parameters used to reload this entry. `None` marks a value
    /// seeded from authoritative local knowledge; it is only refetched
    /// when an event demands it and the plugin can rebuild parameters.
    pub(crate) params: Option<P::Params>,
    pub(crate) in_flight: Option<CorrelationId>,
    pub(crate) previous: Option<P::Value>,
    pub(crate) waiters: Vec<Waiter<P>>,
}

impl<P: EntityPlugin> CacheEntry<P> {
    /// An entry whose first fetch is about to be submitted.
    pub(crate) fn fetching(params: P::Params, id: CorrelationId) -> Self {
        Self {
            value: None,
            params: Some(params),
            in_flight: Some(id),
            previous: None,
            waiters: Vec::new(),
        }
    }

    /// An entry holding a value that arrived without a fetch of its own.
    pub(crate) fn resolved(value: P::Value, params: Option<P::Params>) -> Self {
        Self {
            value: Some(value),
            params,
            in_flight: None,
            previous: None,
            waiters: Vec::new(),
        }
    }

    /// The value readers should see: the current value, or the one being
    /// reloaded.
    pub fn latest(&self) -> Option<&P::Value> {
        self.value.as_ref().or(self.previous.as_ref())
    }

    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }

    pub fn in_flight(&self) -> Option<CorrelationId> {
        self.in_flight
    }

    pub fn is_seeded(&self) -> bool {
        self.params.is_none()
    }
}

impl<P: EntityPlugin> fmt::Debug for CacheEntry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("value", &self.value)
            .field("params", &self.params)
            .field("in_flight", &self.in_flight)
            .field("previous", &self.previous)
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

/// Key to entry map for one plugin.
pub struct EntryStore<P: EntityPlugin> {
    entries: HashMap<P::Key, CacheEntry<P>>,
}

impl<P: EntityPlugin> Default for EntryStore<P> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<P: EntityPlugin> EntryStore<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &P::Key) -> Option<&CacheEntry<P>> {
        self.entries.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &P::Key) -> Option<&mut CacheEntry<P>> {
        self.entries.get_mut(key)
    }

    /// The stored key structurally equal to `probe`.
    pub fn canonical_key(&self, probe: &P::Key) -> Option<&P::Key> {
        self.entries.get_key_value(probe).map(|(key, _)| key)
    }

    pub(crate) fn insert(&mut self, key: P::Key, entry: CacheEntry<P>) {
        self.entries.insert(key, entry);
    }

    pub(crate) fn remove(&mut self, key: &P::Key) -> Option<CacheEntry<P>> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &P::Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &P::Key> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-only view handed to plugins while they classify a push event.
pub struct EntryView<'a, P: EntityPlugin> {
    store: &'a EntryStore<P>,
}

impl<'a, P: EntityPlugin> EntryView<'a, P> {
    pub fn new(store: &'a EntryStore<P>) -> Self {
        Self { store }
    }

    pub fn contains(&self, key: &P::Key) -> bool {
        self.store.contains(key)
    }

    /// Current value of `key`, or the value being reloaded.
    pub fn value(&self, key: &P::Key) -> Option<&'a P::Value> {
        let store: &'a EntryStore<P> = self.store;
        store.get(key).and_then(|entry| entry.latest())
    }

    pub fn keys(&self) -> impl Iterator<Item = &'a P::Key> + 'a {
        let store: &'a EntryStore<P> = self.store;
        store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
