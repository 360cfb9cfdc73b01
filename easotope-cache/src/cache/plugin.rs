//! Entity plugin contract.
//!
//! A plugin teaches the generic [`EntityCache`](super::EntityCache) how one
//! entity kind is keyed, fetched, saved, deleted and affected by push
//! events. The cache owns all bookkeeping; the plugin only builds commands,
//! decodes results and classifies events.

use super::entry::EntryView;
use super::key::CacheKey;
use easotope_core::CacheError;
use easotope_events::{Command, Event};
use serde_json::Value;
use std::fmt::{self, Debug};

/// One decoded `(key, value)` pair.
pub struct DecodedEntry<P: EntityPlugin> {
    pub key: P::Key,
    pub value: P::Value,
    /// Parameters that would refetch this key. `None` for values that
    /// should never be refetched.
    pub params: Option<P::Params>,
}

/// Result of decoding a fetch or save completion.
///
/// `primary` answers the command itself. `related` carries further values
/// the same round trip produced; they seed or update their own entries.
pub struct Decoded<P: EntityPlugin> {
    pub primary: DecodedEntry<P>,
    pub related: Vec<DecodedEntry<P>>,
}

impl<P: EntityPlugin> Decoded<P> {
    pub fn single(key: P::Key, value: P::Value, params: Option<P::Params>) -> Self {
        Self {
            primary: DecodedEntry { key, value, params },
            related: Vec::new(),
        }
    }

    pub fn with_related(mut self, related: Vec<DecodedEntry<P>>) -> Self {
        self.related = related;
        self
    }
}

/// A value change derived directly from a push event, without a refetch.
pub enum EventUpdate<P: EntityPlugin> {
    /// Replace the value of an existing entry. Ignored if the key is not
    /// cached.
    Replace { key: P::Key, value: P::Value },
    /// Create the entry if absent, or replace it if present. Used for
    /// values known authoritatively from the event itself.
    Seed {
        key: P::Key,
        value: P::Value,
        params: Option<P::Params>,
    },
}

impl<P: EntityPlugin> EventUpdate<P> {
    pub fn key(&self) -> &P::Key {
        match self {
            EventUpdate::Replace { key, .. } => key,
            EventUpdate::Seed { key, .. } => key,
        }
    }
}

impl<P: EntityPlugin> fmt::Debug for EventUpdate<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventUpdate::Replace { key, value } => f
                .debug_struct("Replace")
                .field("key", key)
                .field("value", value)
                .finish(),
            EventUpdate::Seed { key, value, params } => f
                .debug_struct("Seed")
                .field("key", key)
                .field("value", value)
                .field("params", params)
                .finish(),
        }
    }
}

/// Build a decode error for `plugin`.
pub fn decode_error(plugin: &str, reason: impl ToString) -> CacheError {
    CacheError::Decode {
        plugin: plugin.to_string(),
        reason: reason.to_string(),
    }
}

/// Entity-kind specific behaviour of a cache.
///
/// `save` and `delete` are optional. Calling them on a plugin that does not
/// override [`EntityPlugin::persist`] or [`EntityPlugin::delete`] is a
/// programming error and panics.
pub trait EntityPlugin: Sized + Send + Sync + 'static {
    type Key: CacheKey;
    type Value: Clone + PartialEq + Debug + Send + Sync + 'static;
    /// Fetch and delete parameters. Stored on the entry for reloads.
    type Params: Clone + PartialEq + Debug + Send + Sync + 'static;
    type SaveParams: Clone + Debug + Send + Sync + 'static;

    /// Name used in logs, errors and panics.
    fn name(&self) -> &'static str;

    fn create_key(&self, params: &Self::Params) -> Self::Key;

    fn fetch(&self, params: &Self::Params) -> Command;

    fn decode_fetch(
        &self,
        params: &Self::Params,
        result: Value,
    ) -> Result<Decoded<Self>, CacheError>;

    fn persist(&self, _params: &Self::SaveParams) -> Command {
        panic!("{} does not support save", self.name())
    }

    fn decode_save(
        &self,
        _params: &Self::SaveParams,
        _result: Value,
    ) -> Result<Decoded<Self>, CacheError> {
        panic!("{} does not support save", self.name())
    }

    /// Key an existing entity being saved is cached under, if any.
    fn save_key(&self, _params: &Self::SaveParams) -> Option<Self::Key> {
        None
    }

    /// Rebuild save parameters after the server answered verify-and-resend.
    /// `current` is the cached value under [`EntityPlugin::save_key`].
    /// Returning `None` hands the error to the caller.
    fn refresh_for_resend(
        &self,
        _params: &Self::SaveParams,
        _current: Option<&Self::Value>,
    ) -> Option<Self::SaveParams> {
        None
    }

    fn delete(&self, _params: &Self::Params) -> Command {
        panic!("{} does not support delete", self.name())
    }

    // ========================================================================
    // EVENT CLASSIFICATION
    // ========================================================================

    /// Keys whose entity no longer exists after `event`.
    fn keys_to_delete_on(&self, _event: &Event, _view: &EntryView<'_, Self>) -> Vec<Self::Key> {
        Vec::new()
    }

    /// Keys that must be refetched after `event`.
    fn keys_to_reload_on(&self, _event: &Event, _view: &EntryView<'_, Self>) -> Vec<Self::Key> {
        Vec::new()
    }

    /// Parameters that fetch `key` when its entry has none of its own,
    /// as for seeded values an event asks to reload. `None` evicts the
    /// entry instead.
    fn reload_params(&self, _key: &Self::Key) -> Option<Self::Params> {
        None
    }

    /// Values that can be derived from `event` without a round trip.
    fn apply_event(&self, _event: &Event, _view: &EntryView<'_, Self>) -> Vec<EventUpdate<Self>> {
        Vec::new()
    }
}
