//! Generic entity cache.
//!
//! One `EntityCache` per entity plugin. All state sits behind a single
//! mutex; each public operation runs as a whole under it. Callbacks and
//! command submission are collected while the lock is held and performed
//! after it is released, so a subscriber may call straight back into the
//! cache from a callback.

use super::entry::{CacheEntry, EntryStore, EntryView, Waiter};
use super::plugin::{Decoded, DecodedEntry, EntityPlugin, EventUpdate};
use super::subscriber::{same_subscriber, Capabilities, Notification, Subscriber};
use super::traits::{CacheSink, CacheStats};
use easotope_core::{CacheConfig, CacheError, EasotopeResult};
use easotope_events::{Command, Completion, CorrelationId, Event, RemoteChannel, RemoteError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

// ============================================================================
// INTERNAL STATE
// ============================================================================

/// What an outstanding correlation id is waiting for.
enum Pending<P: EntityPlugin> {
    Fetch {
        key: P::Key,
    },
    Save {
        /// Id handed to the caller. Resubmissions keep reporting under it.
        origin: CorrelationId,
        params: P::SaveParams,
        subscriber: Subscriber<P>,
        attempts: u32,
    },
    Delete {
        key: P::Key,
        subscriber: Subscriber<P>,
    },
}

/// Outcome of storing a value that did not come from the entry's own fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stored {
    Ignored,
    Unchanged,
    Changed,
    Created,
}

/// What to do when a value arrives for a key that is not cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Absent {
    /// Nothing to replace.
    Ignore,
    /// Cache it quietly.
    Store,
    /// Cache it and tell listeners about the new entity.
    Announce,
}

/// Commands and callbacks produced under the lock.
struct Effects<P: EntityPlugin> {
    commands: Vec<Command>,
    notifications: Vec<Notification<P>>,
}

impl<P: EntityPlugin> Default for Effects<P> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            notifications: Vec::new(),
        }
    }
}

struct CacheState<P: EntityPlugin> {
    entries: EntryStore<P>,
    pending: HashMap<CorrelationId, Pending<P>>,
    listeners: Vec<Subscriber<P>>,
    stats: CacheStats,
}

impl<P: EntityPlugin> CacheState<P> {
    fn new() -> Self {
        Self {
            entries: EntryStore::new(),
            pending: HashMap::new(),
            listeners: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    fn prune_listeners(&mut self) {
        let before = self.listeners.len();
        self.listeners.retain(|listener| listener.is_alive());
        let pruned = before - self.listeners.len();
        if pruned > 0 {
            debug!(pruned, "dropped listeners that are no longer alive");
        }
    }

    fn notify_updated(
        &mut self,
        id: CorrelationId,
        key: &P::Key,
        value: &P::Value,
        effects: &mut Effects<P>,
    ) {
        self.prune_listeners();
        for listener in &self.listeners {
            effects.notifications.push(Notification::Updated {
                subscriber: Arc::clone(listener),
                id,
                key: key.clone(),
                value: value.clone(),
            });
        }
    }

    fn notify_deleted(
        &mut self,
        id: CorrelationId,
        key: &P::Key,
        old: Option<&P::Value>,
        effects: &mut Effects<P>,
    ) {
        self.prune_listeners();
        for listener in &self.listeners {
            effects.notifications.push(Notification::Deleted {
                subscriber: Arc::clone(listener),
                id,
                key: key.clone(),
                old: old.cloned(),
            });
        }
    }

    /// Drop `key` with no replacement. Listeners that saw its value hear
    /// that it is no longer current.
    fn evict(&mut self, key: &P::Key, effects: &mut Effects<P>) {
        let Some(entry) = self.entries.remove(key) else {
            return;
        };
        let Some(old) = entry.value.or(entry.previous) else {
            return;
        };
        self.prune_listeners();
        for listener in &self.listeners {
            effects.notifications.push(Notification::Invalidated {
                subscriber: Arc::clone(listener),
                id: CorrelationId::NONE,
                key: key.clone(),
                old: old.clone(),
            });
        }
    }

    /// Store `value` under `key`, answering any waiters still attached.
    /// A fetch still in flight for the key is superseded.
    fn store_value(
        &mut self,
        key: &P::Key,
        value: &P::Value,
        params: Option<P::Params>,
        absent: Absent,
        effects: &mut Effects<P>,
    ) -> Stored {
        match self.entries.get_mut(key) {
            Some(entry) => {
                let unchanged = entry.latest() == Some(value);
                if params.is_some() {
                    entry.params = params;
                }
                entry.value = Some(value.clone());
                entry.previous = None;
                entry.in_flight = None;
                for waiter in std::mem::take(&mut entry.waiters) {
                    effects.notifications.push(Notification::Fetched {
                        subscriber: waiter.subscriber,
                        id: waiter.id,
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
                if unchanged {
                    Stored::Unchanged
                } else {
                    Stored::Changed
                }
            }
            None if absent == Absent::Ignore => Stored::Ignored,
            None => {
                self.entries
                    .insert(key.clone(), CacheEntry::resolved(value.clone(), params));
                Stored::Created
            }
        }
    }

    /// Store a value that arrived without a fetch of its own and tell
    /// listeners if anything they can see changed.
    fn absorb(
        &mut self,
        id: CorrelationId,
        entry: DecodedEntry<P>,
        absent: Absent,
        effects: &mut Effects<P>,
    ) -> Stored {
        let stored = self.store_value(&entry.key, &entry.value, entry.params, absent, effects);
        let notify = match stored {
            Stored::Changed => true,
            Stored::Created => absent == Absent::Announce,
            Stored::Ignored | Stored::Unchanged => false,
        };
        if notify {
            self.notify_updated(id, &entry.key, &entry.value, effects);
        }
        stored
    }

    /// Remove `key` because its entity no longer exists. Returns whether
    /// anything was cached.
    fn remove_deleted(
        &mut self,
        id: CorrelationId,
        key: &P::Key,
        effects: &mut Effects<P>,
    ) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        for waiter in entry.waiters {
            effects.notifications.push(Notification::FetchError {
                subscriber: waiter.subscriber,
                id: waiter.id,
                key: key.clone(),
                error: RemoteError::EntityDeleted,
            });
        }
        let old = entry.value.or(entry.previous);
        self.notify_deleted(id, key, old.as_ref(), effects);
        true
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            pending: self.pending.len() as u64,
            entry_count: self.entries.len() as u64,
            ..self.stats.clone()
        }
    }
}

/// Classification of a `get` against the current entry.
enum Lookup<V> {
    Hit(V),
    Joined(CorrelationId),
    Miss,
}

/// Keep the first occurrence of every key not yet claimed.
fn claim<K: Clone + Eq + std::hash::Hash, T>(
    items: Vec<T>,
    claimed: &mut HashSet<K>,
    key_of: impl Fn(&T) -> &K,
) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| claimed.insert(key_of(item).clone()))
        .collect()
}

// ============================================================================
// ENTITY CACHE
// ============================================================================

/// Push-updated cache for the entities of one plugin.
pub struct EntityCache<P: EntityPlugin> {
    plugin: P,
    channel: Arc<dyn RemoteChannel>,
    config: CacheConfig,
    state: Mutex<CacheState<P>>,
}

impl<P: EntityPlugin> EntityCache<P> {
    pub fn new(plugin: P, channel: Arc<dyn RemoteChannel>, config: CacheConfig) -> Self {
        Self {
            plugin,
            channel,
            config,
            state: Mutex::new(CacheState::new()),
        }
    }

    pub fn plugin(&self) -> &P {
        &self.plugin
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> EasotopeResult<MutexGuard<'_, CacheState<P>>> {
        self.state.lock().map_err(|_| {
            CacheError::LockPoisoned {
                cache: self.plugin.name().to_string(),
            }
            .into()
        })
    }

    /// Submit collected commands, then run collected callbacks.
    /// Must be called without the lock held.
    fn finish(&self, effects: Effects<P>) {
        for command in effects.commands {
            let expected = command.id;
            let submitted = self.channel.submit(command);
            if submitted != expected {
                warn!(
                    plugin = self.plugin.name(),
                    expected = %expected,
                    submitted = %submitted,
                    "remote channel reported a different correlation id"
                );
            }
        }
        for notification in effects.notifications {
            notification.deliver();
        }
    }

    fn check_backlog(&self, state: &CacheState<P>) {
        let pending = state.pending.len();
        let threshold = self.config.warn_pending_threshold;
        if threshold > 0 && pending >= threshold && pending % threshold == 0 {
            warn!(
                plugin = self.plugin.name(),
                pending, "outstanding commands reached warning threshold"
            );
        }
    }

    // ========================================================================
    // GET / SAVE / DELETE
    // ========================================================================

    /// Fetch the value for `params`.
    ///
    /// A cached value is delivered to `subscriber` before this returns and
    /// the result is [`CorrelationId::NONE`]. Otherwise the subscriber
    /// joins the fetch already in flight for the key, or a new fetch is
    /// submitted, and the returned id is the one its callback will carry.
    pub fn get(
        &self,
        subscriber: Subscriber<P>,
        params: P::Params,
    ) -> EasotopeResult<CorrelationId> {
        let key = self.plugin.create_key(&params);
        let mut effects = Effects::default();

        let id = {
            let mut guard = self.lock()?;
            let state = &mut *guard;

            let lookup = match state.entries.get(&key) {
                Some(entry) => match (&entry.value, entry.in_flight) {
                    (Some(value), _) => Lookup::Hit(value.clone()),
                    (None, Some(in_flight)) => Lookup::Joined(in_flight),
                    (None, None) => Lookup::Miss,
                },
                None => Lookup::Miss,
            };

            let id = match lookup {
                Lookup::Hit(value) => {
                    state.stats.hits += 1;
                    debug!(plugin = self.plugin.name(), key = ?key, "cache hit");
                    effects.notifications.push(Notification::Fetched {
                        subscriber,
                        id: CorrelationId::NONE,
                        key,
                        value,
                    });
                    CorrelationId::NONE
                }
                Lookup::Joined(in_flight) => {
                    state.stats.deduplicated += 1;
                    debug!(
                        plugin = self.plugin.name(),
                        key = ?key,
                        correlation_id = %in_flight,
                        "joined fetch in flight"
                    );
                    if let Some(entry) = state.entries.get_mut(&key) {
                        entry.waiters.push(Waiter {
                            id: in_flight,
                            subscriber,
                        });
                    }
                    in_flight
                }
                Lookup::Miss => {
                    state.stats.misses += 1;
                    let command = self.plugin.fetch(&params);
                    let id = command.id;
                    let waiter = Waiter { id, subscriber };
                    match state.entries.get_mut(&key) {
                        Some(entry) => {
                            entry.params = Some(params);
                            entry.in_flight = Some(id);
                            entry.waiters.push(waiter);
                        }
                        None => {
                            let mut entry = CacheEntry::fetching(params, id);
                            entry.waiters.push(waiter);
                            state.entries.insert(key.clone(), entry);
                        }
                    }
                    debug!(
                        plugin = self.plugin.name(),
                        key = ?key,
                        correlation_id = %id,
                        "fetch issued"
                    );
                    state.pending.insert(id, Pending::Fetch { key });
                    effects.commands.push(command);
                    self.check_backlog(state);
                    id
                }
            };
            state.stats.notifications += effects.notifications.len() as u64;
            id
        };

        self.finish(effects);
        Ok(id)
    }

    /// Persist an entity. The direct subscriber gets `on_saved` or
    /// `on_save_error`; listeners hear about the change through
    /// `on_updated`.
    ///
    /// # Panics
    ///
    /// If the plugin does not support save.
    pub fn save(
        &self,
        subscriber: Subscriber<P>,
        params: P::SaveParams,
    ) -> EasotopeResult<CorrelationId> {
        let command = self.plugin.persist(&params);
        let id = command.id;
        {
            let mut state = self.lock()?;
            state.pending.insert(
                id,
                Pending::Save {
                    origin: id,
                    params,
                    subscriber,
                    attempts: 0,
                },
            );
            self.check_backlog(&state);
        }
        debug!(plugin = self.plugin.name(), correlation_id = %id, "save issued");
        self.finish(Effects {
            commands: vec![command],
            notifications: Vec::new(),
        });
        Ok(id)
    }

    /// Delete the entity identified by `params`.
    ///
    /// # Panics
    ///
    /// If the plugin does not support delete.
    pub fn delete(
        &self,
        subscriber: Subscriber<P>,
        params: P::Params,
    ) -> EasotopeResult<CorrelationId> {
        let key = self.plugin.create_key(&params);
        let command = self.plugin.delete(&params);
        let id = command.id;
        {
            let mut state = self.lock()?;
            state.pending.insert(id, Pending::Delete { key, subscriber });
            self.check_backlog(&state);
        }
        debug!(plugin = self.plugin.name(), correlation_id = %id, "delete issued");
        self.finish(Effects {
            commands: vec![command],
            notifications: Vec::new(),
        });
        Ok(id)
    }

    // ========================================================================
    // LISTENERS
    // ========================================================================

    /// Register a persistent listener.
    ///
    /// Returns `Ok(false)` if the listener handles neither updates nor
    /// deletions, or is already registered.
    pub fn add_listener(&self, listener: Subscriber<P>) -> EasotopeResult<bool> {
        if !listener.capabilities().intersects(Capabilities::LISTENER) {
            warn!(
                plugin = self.plugin.name(),
                "rejected listener without update or delete capability"
            );
            return Ok(false);
        }
        let mut state = self.lock()?;
        state.prune_listeners();
        if state
            .listeners
            .iter()
            .any(|existing| same_subscriber(existing, &listener))
        {
            return Ok(false);
        }
        state.listeners.push(listener);
        Ok(true)
    }

    pub fn remove_listener(&self, listener: &Subscriber<P>) -> EasotopeResult<bool> {
        let mut state = self.lock()?;
        let before = state.listeners.len();
        state
            .listeners
            .retain(|existing| !same_subscriber(existing, listener));
        Ok(state.listeners.len() != before)
    }

    // ========================================================================
    // INBOUND
    // ========================================================================

    /// Handle the completion of a command this cache submitted.
    /// Returns `Ok(false)` if the correlation id is not ours.
    pub fn complete(&self, completion: &Completion) -> EasotopeResult<bool> {
        let mut effects = Effects::default();
        {
            let mut guard = self.lock()?;
            let state = &mut *guard;
            let Some(pending) = state.pending.remove(&completion.id) else {
                return Ok(false);
            };
            let outcome = completion.outcome.clone();
            match pending {
                Pending::Fetch { key } => {
                    self.complete_fetch(state, completion.id, key, outcome, &mut effects)
                }
                Pending::Save {
                    origin,
                    params,
                    subscriber,
                    attempts,
                } => self.complete_save(
                    state,
                    origin,
                    params,
                    subscriber,
                    attempts,
                    outcome,
                    &mut effects,
                ),
                Pending::Delete { key, subscriber } => {
                    self.complete_delete(state, completion.id, key, subscriber, outcome, &mut effects)
                }
            }
            state.stats.notifications += effects.notifications.len() as u64;
        }
        self.finish(effects);
        Ok(true)
    }

    fn complete_fetch(
        &self,
        state: &mut CacheState<P>,
        id: CorrelationId,
        key: P::Key,
        outcome: Result<Value, RemoteError>,
        effects: &mut Effects<P>,
    ) {
        let Some(entry) = state.entries.get(&key).filter(|entry| entry.in_flight == Some(id))
        else {
            state.stats.stale_discarded += 1;
            debug!(
                plugin = self.plugin.name(),
                key = ?key,
                correlation_id = %id,
                "discarded superseded fetch result"
            );
            return;
        };

        let decoded = match (outcome, entry.params.as_ref()) {
            (Ok(result), Some(params)) => self
                .plugin
                .decode_fetch(params, result)
                .map_err(|err| RemoteError::Decode {
                    reason: err.to_string(),
                })
                .and_then(|decoded| {
                    if decoded.primary.key == key {
                        Ok(decoded)
                    } else {
                        Err(RemoteError::Decode {
                            reason: format!(
                                "fetch for {:?} answered {:?}",
                                key, decoded.primary.key
                            ),
                        })
                    }
                }),
            (Ok(_), None) => Err(RemoteError::Decode {
                reason: format!("no fetch parameters recorded for {:?}", key),
            }),
            (Err(error), _) => Err(error),
        };

        match decoded {
            Ok(decoded) => self.resolve_fetch(state, id, key, decoded, effects),
            Err(error) => self.fail_fetch(state, id, key, error, effects),
        }
    }

    fn resolve_fetch(
        &self,
        state: &mut CacheState<P>,
        id: CorrelationId,
        key: P::Key,
        decoded: Decoded<P>,
        effects: &mut Effects<P>,
    ) {
        let Decoded { primary, related } = decoded;
        for entry in related.into_iter().filter(|entry| entry.key != key) {
            state.absorb(CorrelationId::NONE, entry, Absent::Store, effects);
        }

        let Some(entry) = state.entries.get_mut(&key) else {
            return;
        };
        let value = primary.value;
        let previous = entry.previous.take();
        entry.value = Some(value.clone());
        entry.in_flight = None;
        let waiters = std::mem::take(&mut entry.waiters);
        debug!(
            plugin = self.plugin.name(),
            key = ?key,
            correlation_id = %id,
            waiters = waiters.len(),
            "fetch resolved"
        );
        for waiter in waiters {
            effects.notifications.push(Notification::Fetched {
                subscriber: waiter.subscriber,
                id: waiter.id,
                key: key.clone(),
                value: value.clone(),
            });
        }
        if previous.is_some_and(|previous| previous != value) {
            state.notify_updated(CorrelationId::NONE, &key, &value, effects);
        }
    }

    fn fail_fetch(
        &self,
        state: &mut CacheState<P>,
        id: CorrelationId,
        key: P::Key,
        error: RemoteError,
        effects: &mut Effects<P>,
    ) {
        let Some(mut entry) = state.entries.remove(&key) else {
            return;
        };
        warn!(
            plugin = self.plugin.name(),
            key = ?key,
            correlation_id = %id,
            error = %error,
            "fetch failed"
        );
        for waiter in std::mem::take(&mut entry.waiters) {
            effects.notifications.push(Notification::FetchError {
                subscriber: waiter.subscriber,
                id: waiter.id,
                key: key.clone(),
                error: error.clone(),
            });
        }
        // A failed reload keeps serving the value it was reloading.
        if let Some(previous) = entry.previous.take() {
            entry.value = Some(previous);
            entry.in_flight = None;
            state.entries.insert(key, entry);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn complete_save(
        &self,
        state: &mut CacheState<P>,
        origin: CorrelationId,
        params: P::SaveParams,
        subscriber: Subscriber<P>,
        attempts: u32,
        outcome: Result<Value, RemoteError>,
        effects: &mut Effects<P>,
    ) {
        let result = match outcome {
            Ok(result) => result,
            Err(error)
                if error.is_verify_and_resend() && attempts < self.config.max_resend_attempts =>
            {
                let current = self
                    .plugin
                    .save_key(&params)
                    .and_then(|key| state.entries.get(&key))
                    .and_then(|entry| entry.latest());
                match self.plugin.refresh_for_resend(&params, current) {
                    Some(refreshed) => {
                        let command = self.plugin.persist(&refreshed);
                        info!(
                            plugin = self.plugin.name(),
                            correlation_id = %origin,
                            resubmitted_as = %command.id,
                            attempt = attempts + 1,
                            "resubmitting save after verify-and-resend"
                        );
                        state.pending.insert(
                            command.id,
                            Pending::Save {
                                origin,
                                params: refreshed,
                                subscriber,
                                attempts: attempts + 1,
                            },
                        );
                        effects.commands.push(command);
                    }
                    None => effects.notifications.push(Notification::SaveError {
                        subscriber,
                        id: origin,
                        error,
                    }),
                }
                return;
            }
            Err(error) => {
                warn!(
                    plugin = self.plugin.name(),
                    correlation_id = %origin,
                    error = %error,
                    "save failed"
                );
                effects.notifications.push(Notification::SaveError {
                    subscriber,
                    id: origin,
                    error,
                });
                return;
            }
        };

        match self.plugin.decode_save(&params, result) {
            Ok(Decoded { primary, related }) => {
                for entry in related {
                    state.absorb(origin, entry, Absent::Announce, effects);
                }
                let key = primary.key.clone();
                let value = primary.value.clone();
                state.absorb(origin, primary, Absent::Announce, effects);
                debug!(
                    plugin = self.plugin.name(),
                    key = ?key,
                    correlation_id = %origin,
                    "save applied"
                );
                effects.notifications.push(Notification::Saved {
                    subscriber,
                    id: origin,
                    key,
                    value,
                });
            }
            Err(err) => {
                warn!(
                    plugin = self.plugin.name(),
                    correlation_id = %origin,
                    error = %err,
                    "save result undecodable"
                );
                effects.notifications.push(Notification::SaveError {
                    subscriber,
                    id: origin,
                    error: RemoteError::Decode {
                        reason: err.to_string(),
                    },
                });
            }
        }
    }

    fn complete_delete(
        &self,
        state: &mut CacheState<P>,
        id: CorrelationId,
        key: P::Key,
        subscriber: Subscriber<P>,
        outcome: Result<Value, RemoteError>,
        effects: &mut Effects<P>,
    ) {
        match outcome {
            Ok(_) => {
                let removed = state.remove_deleted(id, &key, effects);
                debug!(
                    plugin = self.plugin.name(),
                    key = ?key,
                    correlation_id = %id,
                    removed,
                    "delete applied"
                );
                effects
                    .notifications
                    .push(Notification::DeleteCompleted { subscriber, id, key });
            }
            Err(error) => {
                warn!(
                    plugin = self.plugin.name(),
                    key = ?key,
                    correlation_id = %id,
                    error = %error,
                    "delete failed"
                );
                effects.notifications.push(Notification::DeleteError {
                    subscriber,
                    id,
                    key,
                    error,
                });
            }
        }
    }

    /// Apply a push event.
    ///
    /// The plugin classifies the event into keys to delete, keys to reload
    /// and direct value updates. A key lands in at most one set, in that
    /// priority order.
    pub fn apply_event(&self, event: &Event) -> EasotopeResult<()> {
        let mut effects = Effects::default();
        {
            let mut guard = self.lock()?;
            let state = &mut *guard;

            let (deletes, reloads, updates) = {
                let view = EntryView::new(&state.entries);
                let mut claimed = HashSet::new();
                let deletes = claim(
                    self.plugin.keys_to_delete_on(event, &view),
                    &mut claimed,
                    |key| key,
                );
                let reloads = claim(
                    self.plugin.keys_to_reload_on(event, &view),
                    &mut claimed,
                    |key| key,
                );
                let updates = claim(self.plugin.apply_event(event, &view), &mut claimed, |update| {
                    update.key()
                });
                (deletes, reloads, updates)
            };

            if deletes.is_empty() && reloads.is_empty() && updates.is_empty() {
                return Ok(());
            }
            state.stats.events_applied += 1;
            debug!(
                plugin = self.plugin.name(),
                event = event.event_type(),
                deletes = deletes.len(),
                reloads = reloads.len(),
                updates = updates.len(),
                "event classified"
            );

            for key in &deletes {
                state.remove_deleted(CorrelationId::NONE, key, &mut effects);
            }
            for key in reloads {
                self.reload(state, key, &mut effects);
            }
            for update in updates {
                let (entry, absent) = match update {
                    EventUpdate::Replace { key, value } => (
                        DecodedEntry {
                            key,
                            value,
                            params: None,
                        },
                        Absent::Ignore,
                    ),
                    EventUpdate::Seed { key, value, params } => {
                        (DecodedEntry { key, value, params }, Absent::Announce)
                    }
                };
                state.absorb(CorrelationId::NONE, entry, absent, &mut effects);
            }
            state.stats.notifications += effects.notifications.len() as u64;
            self.check_backlog(state);
        }
        self.finish(effects);
        Ok(())
    }

    /// Reissue the original fetch for `key`, holding back its current value
    /// until the result arrives. Seeded entries are fetched with whatever
    /// parameters the plugin can rebuild for them. Entries that cannot or
    /// may not be reloaded are evicted and listeners told so.
    fn reload(&self, state: &mut CacheState<P>, key: P::Key, effects: &mut Effects<P>) {
        let Some(entry) = state.entries.get(&key) else {
            return;
        };
        let allowed = self.config.reload_on_event || entry.in_flight.is_some();
        let params = entry
            .params
            .clone()
            .or_else(|| self.plugin.reload_params(&key))
            .filter(|_| allowed);
        let Some(params) = params else {
            debug!(plugin = self.plugin.name(), key = ?key, "evicting entry instead of reloading");
            state.evict(&key, effects);
            return;
        };

        let command = self.plugin.fetch(&params);
        let Some(entry) = state.entries.get_mut(&key) else {
            return;
        };
        entry.params = Some(params);
        if entry.value.is_some() {
            entry.previous = entry.value.take();
        }
        entry.in_flight = Some(command.id);
        debug!(
            plugin = self.plugin.name(),
            key = ?key,
            correlation_id = %command.id,
            "reload issued"
        );
        state.pending.insert(command.id, Pending::Fetch { key });
        effects.commands.push(command);
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    /// Cached value for `key` without fetching. While a reload is in flight
    /// this is the value being reloaded.
    pub fn peek(&self, key: &P::Key) -> EasotopeResult<Option<P::Value>> {
        let state = self.lock()?;
        Ok(state.entries.get(key).and_then(|entry| entry.latest()).cloned())
    }

    pub fn contains(&self, key: &P::Key) -> EasotopeResult<bool> {
        Ok(self.lock()?.entries.contains(key))
    }

    /// Correlation id of the fetch outstanding for `key`, if any.
    pub fn in_flight(&self, key: &P::Key) -> EasotopeResult<Option<CorrelationId>> {
        Ok(self.lock()?.entries.get(key).and_then(|entry| entry.in_flight()))
    }

    pub fn listener_count(&self) -> EasotopeResult<usize> {
        let mut state = self.lock()?;
        state.prune_listeners();
        Ok(state.listeners.len())
    }

    pub fn stats(&self) -> EasotopeResult<CacheStats> {
        Ok(self.lock()?.snapshot())
    }
}

impl<P: EntityPlugin> CacheSink for EntityCache<P> {
    fn name(&self) -> &'static str {
        self.plugin.name()
    }

    fn complete(&self, completion: &Completion) -> EasotopeResult<bool> {
        EntityCache::complete(self, completion)
    }

    fn apply_event(&self, event: &Event) -> EasotopeResult<()> {
        EntityCache::apply_event(self, event)
    }

    fn stats(&self) -> EasotopeResult<CacheStats> {
        EntityCache::stats(self)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheListener, RecordingListener};
    use crate::plugins::{RefGasListKey, RefGasListPlugin, StandardKey, StandardPlugin};
    use easotope_core::{RefGasList, RefGasSummary, Standard};
    use easotope_events::{CommandKind, MockRemote};
    use chrono::{TimeZone, Utc};
    use serde::Serialize;
    use std::sync::Weak;

    fn standard(id: i32, name: &str) -> Standard {
        Standard {
            id,
            name: name.to_string(),
            description: None,
            enabled: true,
        }
    }

    fn setup_with(config: CacheConfig) -> (Arc<MockRemote>, EntityCache<StandardPlugin>) {
        let remote = Arc::new(MockRemote::new());
        let cache = EntityCache::new(StandardPlugin, remote.clone(), config);
        (remote, cache)
    }

    fn setup() -> (Arc<MockRemote>, EntityCache<StandardPlugin>) {
        setup_with(CacheConfig::default())
    }

    fn answer<P: EntityPlugin>(cache: &EntityCache<P>, id: CorrelationId, value: impl Serialize) {
        let handled = cache
            .complete(&Completion::ok(id, serde_json::to_value(value).unwrap()))
            .unwrap();
        assert!(handled, "completion {} not owned by cache", id);
    }

    fn load(cache: &EntityCache<StandardPlugin>, value: Standard) {
        let fetcher = RecordingListener::<StandardPlugin>::fetcher();
        let id = cache.get(fetcher.subscriber(), value.id).unwrap();
        answer(cache, id, value);
    }

    // === get ===

    #[test]
    fn test_fetch_deduplication() {
        let (remote, cache) = setup();
        let first = RecordingListener::<StandardPlugin>::fetcher();
        let second = RecordingListener::<StandardPlugin>::fetcher();

        let id1 = cache.get(first.subscriber(), 7).unwrap();
        let id2 = cache.get(second.subscriber(), 7).unwrap();

        assert_eq!(id1, id2);
        assert_eq!(remote.submitted_count(), 1);
        assert_eq!(cache.in_flight(&StandardKey(7)).unwrap(), Some(id1));

        answer(&cache, id1, standard(7, "NBS19"));

        assert_eq!(first.fetched(), vec![(id1, standard(7, "NBS19"))]);
        assert_eq!(second.fetched(), vec![(id1, standard(7, "NBS19"))]);
        let stats = cache.stats().unwrap();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.deduplicated, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_cache_hit_is_synchronous() {
        let (remote, cache) = setup();
        load(&cache, standard(7, "NBS19"));
        remote.drain();

        let reader = RecordingListener::<StandardPlugin>::fetcher();
        let id = cache.get(reader.subscriber(), 7).unwrap();

        assert!(id.is_none());
        assert_eq!(remote.submitted_count(), 0);
        assert_eq!(reader.fetched(), vec![(CorrelationId::NONE, standard(7, "NBS19"))]);
        assert_eq!(cache.stats().unwrap().hits, 1);
    }

    #[test]
    fn test_fetch_error_reaches_waiters_only() {
        let (remote, cache) = setup();
        let listener = RecordingListener::<StandardPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();
        let fetcher = RecordingListener::<StandardPlugin>::fetcher();

        let id = cache.get(fetcher.subscriber(), 7).unwrap();
        cache
            .complete(&Completion::err(id, RemoteError::failed("no such standard")))
            .unwrap();

        assert_eq!(fetcher.fetch_errors(), vec![(id, RemoteError::failed("no such standard"))]);
        assert_eq!(listener.call_count(), 0);
        assert!(!cache.contains(&StandardKey(7)).unwrap());

        cache.get(fetcher.subscriber(), 7).unwrap();
        assert_eq!(remote.submitted_count(), 2);
    }

    #[test]
    fn test_undecodable_result_is_a_fetch_error() {
        let (_remote, cache) = setup();
        let fetcher = RecordingListener::<StandardPlugin>::fetcher();
        let id = cache.get(fetcher.subscriber(), 7).unwrap();

        cache
            .complete(&Completion::ok(id, serde_json::json!({ "id": "seven" })))
            .unwrap();

        let errors = fetcher.fetch_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].1, RemoteError::Decode { .. }));
        assert!(!cache.contains(&StandardKey(7)).unwrap());
    }

    #[test]
    fn test_dead_waiter_is_skipped() {
        let (_remote, cache) = setup();
        let gone = RecordingListener::<StandardPlugin>::fetcher();
        let id = cache.get(gone.subscriber(), 7).unwrap();
        gone.kill();

        answer(&cache, id, standard(7, "NBS19"));
        assert_eq!(gone.call_count(), 0);
        assert!(cache.contains(&StandardKey(7)).unwrap());
    }

    // === stale-response guard ===

    fn ref_gas_list_cache() -> (Arc<MockRemote>, EntityCache<RefGasListPlugin>) {
        let remote = Arc::new(MockRemote::new());
        let cache = EntityCache::new(RefGasListPlugin, remote.clone(), CacheConfig::default());
        (remote, cache)
    }

    fn ref_gas_changed(mass_spec_id: i32) -> Event {
        Event::RefGasDeleted {
            id: 99,
            mass_spec_id,
        }
    }

    fn list_with(ids: &[i32]) -> RefGasList {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        RefGasList::new(
            4,
            ids.iter()
                .enumerate()
                .map(|(n, id)| RefGasSummary {
                    id: *id,
                    valid_from: base + chrono::Duration::days(n as i64),
                })
                .collect(),
        )
    }

    #[test]
    fn test_stale_response_guard() {
        let (remote, cache) = ref_gas_list_cache();
        let fetcher = RecordingListener::<RefGasListPlugin>::fetcher();

        let first = cache.get(fetcher.subscriber(), 4).unwrap();
        cache.apply_event(&ref_gas_changed(4)).unwrap();
        let reload = remote.last().unwrap().id;
        assert_ne!(first, reload);
        assert_eq!(cache.in_flight(&RefGasListKey(4)).unwrap(), Some(reload));

        // The superseded answer arrives first and must be ignored.
        answer(&cache, first, list_with(&[1]));
        assert!(fetcher.fetched().is_empty());
        assert_eq!(cache.stats().unwrap().stale_discarded, 1);

        answer(&cache, reload, list_with(&[1, 2]));
        let fetched = fetcher.fetched();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].0, first);
        assert_eq!(fetched[0].1, list_with(&[1, 2]));
        assert_eq!(cache.peek(&RefGasListKey(4)).unwrap(), Some(list_with(&[1, 2])));
    }

    #[test]
    fn test_reload_notifies_listeners_only_on_change() {
        let (remote, cache) = ref_gas_list_cache();
        let listener = RecordingListener::<RefGasListPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();
        let fetcher = RecordingListener::<RefGasListPlugin>::fetcher();
        let id = cache.get(fetcher.subscriber(), 4).unwrap();
        answer(&cache, id, list_with(&[1]));

        cache.apply_event(&ref_gas_changed(4)).unwrap();
        answer(&cache, remote.last().unwrap().id, list_with(&[1]));
        assert_eq!(listener.call_count(), 0);

        cache.apply_event(&ref_gas_changed(4)).unwrap();
        answer(&cache, remote.last().unwrap().id, list_with(&[1, 2]));
        assert_eq!(listener.updated().len(), 1);
        assert_eq!(listener.updated()[0].0, CorrelationId::NONE);
    }

    #[test]
    fn test_get_during_reload_joins_reload() {
        let (remote, cache) = ref_gas_list_cache();
        let fetcher = RecordingListener::<RefGasListPlugin>::fetcher();
        let id = cache.get(fetcher.subscriber(), 4).unwrap();
        answer(&cache, id, list_with(&[1]));

        cache.apply_event(&ref_gas_changed(4)).unwrap();
        let reload = remote.last().unwrap().id;

        let reader = RecordingListener::<RefGasListPlugin>::fetcher();
        assert_eq!(cache.get(reader.subscriber(), 4).unwrap(), reload);
        assert_eq!(remote.submitted_count(), 2);

        answer(&cache, reload, list_with(&[1, 3]));
        assert_eq!(reader.fetched(), vec![(reload, list_with(&[1, 3]))]);
    }

    #[test]
    fn test_failed_reload_keeps_previous_value() {
        let (remote, cache) = ref_gas_list_cache();
        let fetcher = RecordingListener::<RefGasListPlugin>::fetcher();
        let id = cache.get(fetcher.subscriber(), 4).unwrap();
        answer(&cache, id, list_with(&[1]));

        cache.apply_event(&ref_gas_changed(4)).unwrap();
        let reload = remote.last().unwrap().id;
        cache
            .complete(&Completion::err(reload, RemoteError::failed("timeout")))
            .unwrap();

        let reader = RecordingListener::<RefGasListPlugin>::fetcher();
        assert!(cache.get(reader.subscriber(), 4).unwrap().is_none());
        assert_eq!(reader.fetched()[0].1, list_with(&[1]));
    }

    #[test]
    fn test_reload_disabled_evicts() {
        let remote = Arc::new(MockRemote::new());
        let cache = EntityCache::new(
            RefGasListPlugin,
            remote.clone(),
            CacheConfig::default().with_reload_on_event(false),
        );
        let listener = RecordingListener::<RefGasListPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();
        let fetcher = RecordingListener::<RefGasListPlugin>::fetcher();
        let id = cache.get(fetcher.subscriber(), 4).unwrap();
        answer(&cache, id, list_with(&[1]));

        cache.apply_event(&ref_gas_changed(4)).unwrap();

        assert_eq!(remote.submitted_count(), 1);
        assert!(!cache.contains(&RefGasListKey(4)).unwrap());
        assert_eq!(
            listener.invalidated(),
            vec![(CorrelationId::NONE, RefGasListKey(4), list_with(&[1]))]
        );
        assert!(listener.updated().is_empty());
    }

    #[test]
    fn test_eviction_reaches_live_listeners_only() {
        let remote = Arc::new(MockRemote::new());
        let cache = EntityCache::new(
            RefGasListPlugin,
            remote.clone(),
            CacheConfig::default().with_reload_on_event(false),
        );
        let gone = RecordingListener::<RefGasListPlugin>::listener();
        let fetch_only = RecordingListener::<RefGasListPlugin>::fetcher();
        cache.add_listener(gone.subscriber()).unwrap();
        cache.add_listener(fetch_only.subscriber()).unwrap();
        let id = cache.get(fetch_only.subscriber(), 4).unwrap();
        answer(&cache, id, list_with(&[1]));
        gone.kill();
        fetch_only.clear();

        cache.apply_event(&ref_gas_changed(4)).unwrap();

        assert!(gone.invalidated().is_empty());
        assert_eq!(fetch_only.call_count(), 0);
    }

    // === listeners and events ===

    #[test]
    fn test_persistent_listener_completeness() {
        let (_remote, cache) = setup();
        let listener = RecordingListener::<StandardPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();

        load(&cache, standard(7, "NBS19"));
        assert_eq!(listener.call_count(), 0);

        cache
            .apply_event(&Event::StandardUpdated {
                standard: standard(7, "NBS19b"),
            })
            .unwrap();

        assert_eq!(
            listener.updated(),
            vec![(CorrelationId::NONE, StandardKey(7), standard(7, "NBS19b"))]
        );
    }

    #[test]
    fn test_no_op_update_suppression() {
        let (_remote, cache) = setup();
        let listener = RecordingListener::<StandardPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();
        load(&cache, standard(7, "NBS19"));
        let before = cache.stats().unwrap().notifications;

        cache
            .apply_event(&Event::StandardUpdated {
                standard: standard(7, "NBS19"),
            })
            .unwrap();

        assert_eq!(listener.call_count(), 0);
        assert_eq!(cache.stats().unwrap().notifications, before);
    }

    #[test]
    fn test_update_event_never_creates_entries() {
        let (_remote, cache) = setup();
        let listener = RecordingListener::<StandardPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();

        cache
            .apply_event(&Event::StandardUpdated {
                standard: standard(8, "NBS18"),
            })
            .unwrap();

        assert!(!cache.contains(&StandardKey(8)).unwrap());
        assert_eq!(listener.call_count(), 0);
    }

    #[test]
    fn test_update_event_answers_waiters_still_attached() {
        let (remote, cache) = setup();
        let fetcher = RecordingListener::<StandardPlugin>::fetcher();
        let id = cache.get(fetcher.subscriber(), 7).unwrap();

        cache
            .apply_event(&Event::StandardUpdated {
                standard: standard(7, "NBS19b"),
            })
            .unwrap();
        assert_eq!(fetcher.fetched(), vec![(id, standard(7, "NBS19b"))]);

        // The fetch the event overtook is now stale.
        answer(&cache, id, standard(7, "NBS19"));
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(cache.peek(&StandardKey(7)).unwrap(), Some(standard(7, "NBS19b")));
        assert_eq!(remote.submitted_count(), 1);
    }

    #[test]
    fn test_batch_event_evaluates_each_key() {
        let (_remote, cache) = setup();
        let listener = RecordingListener::<StandardPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();
        load(&cache, standard(1, "NBS18"));
        load(&cache, standard(2, "NBS19"));

        cache
            .apply_event(&Event::StandardsUpdated {
                standards: vec![standard(1, "NBS18"), standard(2, "NBS19b"), standard(3, "IAEA-603")],
            })
            .unwrap();

        let updated = listener.updated();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].1, StandardKey(2));
    }

    #[test]
    fn test_standard_update_scenario() {
        let (remote, cache) = setup();
        let first = RecordingListener::<StandardPlugin>::listener();
        let second = RecordingListener::<StandardPlugin>::all();
        cache.add_listener(first.subscriber()).unwrap();
        cache.add_listener(second.subscriber()).unwrap();
        load(&cache, standard(7, "NBS19"));
        remote.drain();

        cache
            .apply_event(&Event::StandardUpdated {
                standard: standard(7, "NBS19b"),
            })
            .unwrap();

        let expected = vec![(CorrelationId::NONE, StandardKey(7), standard(7, "NBS19b"))];
        assert_eq!(first.updated(), expected);
        assert_eq!(second.updated(), expected);
        assert_eq!(second.call_count(), 1);

        let reader = RecordingListener::<StandardPlugin>::fetcher();
        let id = cache.get(reader.subscriber(), 7).unwrap();
        assert!(id.is_none());
        assert_eq!(reader.fetched(), vec![(CorrelationId::NONE, standard(7, "NBS19b"))]);
        assert_eq!(remote.submitted_count(), 0);
    }

    #[test]
    fn test_dead_listener_is_pruned() {
        let (_remote, cache) = setup();
        let listener = RecordingListener::<StandardPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();
        load(&cache, standard(7, "NBS19"));
        listener.kill();

        cache
            .apply_event(&Event::StandardUpdated {
                standard: standard(7, "NBS19b"),
            })
            .unwrap();

        assert_eq!(listener.call_count(), 0);
        assert_eq!(cache.listener_count().unwrap(), 0);
    }

    #[test]
    fn test_listener_registration_rules() {
        let (_remote, cache) = setup();
        let fetch_only = RecordingListener::<StandardPlugin>::fetcher();
        assert!(!cache.add_listener(fetch_only.subscriber()).unwrap());

        let listener = RecordingListener::<StandardPlugin>::listener();
        let subscriber = listener.subscriber();
        assert!(cache.add_listener(subscriber.clone()).unwrap());
        assert!(!cache.add_listener(subscriber.clone()).unwrap());
        assert_eq!(cache.listener_count().unwrap(), 1);

        assert!(cache.remove_listener(&subscriber).unwrap());
        assert!(!cache.remove_listener(&subscriber).unwrap());
    }

    #[test]
    fn test_unrelated_event_is_not_counted() {
        let (_remote, cache) = setup();
        cache.apply_event(&Event::ConstantsChanged).unwrap();
        assert_eq!(cache.stats().unwrap().events_applied, 0);
    }

    // === delete ===

    #[test]
    fn test_delete_propagates() {
        let (remote, cache) = setup();
        let listener = RecordingListener::<StandardPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();
        load(&cache, standard(7, "NBS19"));

        let deleter = RecordingListener::<StandardPlugin>::all();
        let id = cache.delete(deleter.subscriber(), 7).unwrap();
        assert_eq!(remote.last().unwrap().kind, CommandKind::Delete);
        answer(&cache, id, serde_json::Value::Null);

        // The server echoes the deletion as an event as well.
        cache.apply_event(&Event::StandardDeleted { id: 7 }).unwrap();

        assert_eq!(
            listener.deleted(),
            vec![(id, StandardKey(7), Some(standard(7, "NBS19")))]
        );
        assert!(deleter
            .calls()
            .contains(&crate::cache::Callback::DeleteCompleted {
                id,
                key: StandardKey(7)
            }));

        remote.drain();
        let reader = RecordingListener::<StandardPlugin>::fetcher();
        assert!(cache.get(reader.subscriber(), 7).unwrap().is_some());
        assert_eq!(remote.submitted_count(), 1);
    }

    #[test]
    fn test_delete_error_goes_to_caller_only() {
        let (_remote, cache) = setup();
        let listener = RecordingListener::<StandardPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();
        load(&cache, standard(7, "NBS19"));

        let deleter = RecordingListener::<StandardPlugin>::all();
        let id = cache.delete(deleter.subscriber(), 7).unwrap();
        let refused = RemoteError::Refused {
            reason: "standard in use".to_string(),
        };
        cache.complete(&Completion::err(id, refused.clone())).unwrap();

        assert_eq!(
            deleter.calls(),
            vec![crate::cache::Callback::DeleteError {
                id,
                key: StandardKey(7),
                error: refused
            }]
        );
        assert_eq!(listener.call_count(), 0);
        assert!(cache.contains(&StandardKey(7)).unwrap());
    }

    #[test]
    fn test_delete_event_fails_waiters() {
        let (_remote, cache) = setup();
        let fetcher = RecordingListener::<StandardPlugin>::fetcher();
        let id = cache.get(fetcher.subscriber(), 7).unwrap();

        cache.apply_event(&Event::StandardDeleted { id: 7 }).unwrap();
        assert_eq!(fetcher.fetch_errors(), vec![(id, RemoteError::EntityDeleted)]);

        answer(&cache, id, standard(7, "NBS19"));
        assert!(!cache.contains(&StandardKey(7)).unwrap());
        assert_eq!(cache.stats().unwrap().stale_discarded, 1);
    }

    // === save ===

    #[test]
    fn test_save_notifies_caller_and_listeners() {
        let (remote, cache) = setup();
        let listener = RecordingListener::<StandardPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();
        load(&cache, standard(7, "NBS19"));

        let saver = RecordingListener::<StandardPlugin>::all();
        let id = cache.save(saver.subscriber(), standard(7, "NBS19c")).unwrap();
        assert_eq!(remote.last().unwrap().kind, CommandKind::Save);
        answer(&cache, id, standard(7, "NBS19c"));

        assert_eq!(saver.saved(), vec![(id, standard(7, "NBS19c"))]);
        assert_eq!(
            listener.updated(),
            vec![(id, StandardKey(7), standard(7, "NBS19c"))]
        );

        // The server echoes our own write; nothing changes, nobody is told.
        cache
            .apply_event(&Event::StandardUpdated {
                standard: standard(7, "NBS19c"),
            })
            .unwrap();
        assert_eq!(listener.call_count(), 1);
    }

    #[test]
    fn test_save_error_leaves_cache_unchanged() {
        let (_remote, cache) = setup();
        let listener = RecordingListener::<StandardPlugin>::listener();
        cache.add_listener(listener.subscriber()).unwrap();
        load(&cache, standard(7, "NBS19"));

        let saver = RecordingListener::<StandardPlugin>::all();
        let id = cache.save(saver.subscriber(), standard(7, "NBS19c")).unwrap();
        cache
            .complete(&Completion::err(id, RemoteError::failed("constraint")))
            .unwrap();

        assert_eq!(saver.save_errors(), vec![(id, RemoteError::failed("constraint"))]);
        assert_eq!(listener.call_count(), 0);
        assert_eq!(cache.peek(&StandardKey(7)).unwrap(), Some(standard(7, "NBS19")));
    }

    #[test]
    fn test_verify_and_resend_is_transparent() {
        let (remote, cache) = setup();
        let saver = RecordingListener::<StandardPlugin>::all();
        let id = cache.save(saver.subscriber(), standard(7, "NBS19c")).unwrap();

        cache
            .complete(&Completion::err(
                id,
                RemoteError::VerifyAndResend {
                    message: "row changed".to_string(),
                },
            ))
            .unwrap();
        assert_eq!(remote.count_kind(CommandKind::Save), 2);
        assert_eq!(saver.call_count(), 0);

        let resent = remote.last().unwrap().id;
        answer(&cache, resent, standard(7, "NBS19c"));
        assert_eq!(saver.saved(), vec![(id, standard(7, "NBS19c"))]);
    }

    #[test]
    fn test_verify_and_resend_gives_up_after_cap() {
        let (remote, cache) = setup_with(CacheConfig::default().with_max_resend_attempts(1));
        let saver = RecordingListener::<StandardPlugin>::all();
        let id = cache.save(saver.subscriber(), standard(7, "NBS19c")).unwrap();
        let verify = RemoteError::VerifyAndResend {
            message: "row changed".to_string(),
        };

        cache.complete(&Completion::err(id, verify.clone())).unwrap();
        let resent = remote.last().unwrap().id;
        cache.complete(&Completion::err(resent, verify.clone())).unwrap();

        assert_eq!(remote.count_kind(CommandKind::Save), 2);
        assert_eq!(saver.save_errors(), vec![(id, verify)]);
    }

    // === re-entrancy ===

    /// Reads the cache again from inside its own fetch callback.
    struct Chained {
        cache: Weak<EntityCache<StandardPlugin>>,
        follow_up: Arc<RecordingListener<StandardPlugin>>,
    }

    impl CacheListener<StandardPlugin> for Chained {
        fn capabilities(&self) -> Capabilities {
            Capabilities::FETCH
        }

        fn on_fetched(&self, _id: CorrelationId, _key: &StandardKey, value: &Standard) {
            if let Some(cache) = self.cache.upgrade() {
                cache.get(self.follow_up.subscriber(), value.id).unwrap();
                cache.get(self.follow_up.subscriber(), value.id + 1).unwrap();
            }
        }
    }

    #[test]
    fn test_callback_may_reenter_cache() {
        let remote = Arc::new(MockRemote::new());
        let cache = Arc::new(EntityCache::new(
            StandardPlugin,
            remote.clone(),
            CacheConfig::default(),
        ));
        let follow_up = RecordingListener::<StandardPlugin>::fetcher();
        let chained = Arc::new(Chained {
            cache: Arc::downgrade(&cache),
            follow_up: follow_up.clone(),
        });

        let id = cache.get(chained, 7).unwrap();
        answer(&cache, id, standard(7, "NBS19"));

        assert_eq!(follow_up.fetched(), vec![(CorrelationId::NONE, standard(7, "NBS19"))]);
        assert_eq!(remote.submitted_count(), 2);
        assert!(cache.in_flight(&StandardKey(8)).unwrap().is_some());
    }
}
