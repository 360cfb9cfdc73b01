//! Cache subscribers.
//!
//! A subscriber is one capability-flagged callback object. It is used in
//! two roles:
//!
//! - one-shot: passed to `get`, `save` or `delete` and answered once
//! - persistent listener: registered with `add_listener` and told about
//!   every change until removed or no longer alive
//!
//! Callbacks run on the thread that handled the completion or event, after
//! the cache lock has been released. A callback may call back into the
//! cache.

use super::plugin::EntityPlugin;
use bitflags::bitflags;
use easotope_events::{CorrelationId, RemoteError};
use std::sync::Arc;

// ============================================================================
// CAPABILITIES
// ============================================================================

bitflags! {
    /// Callbacks a subscriber wants to receive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u16 {
        const FETCHED = 0b0000_0000_0001;
        const FETCH_ERROR = 0b0000_0000_0010;
        const UPDATED = 0b0000_0000_0100;
        const DELETED = 0b0000_0000_1000;
        const SAVED = 0b0000_0001_0000;
        const SAVE_ERROR = 0b0000_0010_0000;
        const DELETE_COMPLETED = 0b0000_0100_0000;
        const DELETE_ERROR = 0b0000_1000_0000;
        const INVALIDATED = 0b0001_0000_0000;

        /// Everything a one-shot `get` caller can be told.
        const FETCH = Self::FETCHED.bits() | Self::FETCH_ERROR.bits();
        /// What a persistent listener must handle at least one of.
        const LISTENER = Self::UPDATED.bits() | Self::DELETED.bits() | Self::INVALIDATED.bits();
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::empty()
    }
}

// ============================================================================
// LISTENER TRAIT
// ============================================================================

/// Callback object for one entity plugin.
///
/// All callbacks default to no-ops; [`CacheListener::capabilities`] decides
/// which ones the cache invokes.
pub trait CacheListener<P: EntityPlugin>: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Whether the logical owner of this subscriber still exists. Dead
    /// subscribers are skipped and pruned.
    fn is_alive(&self) -> bool {
        true
    }

    fn on_fetched(&self, _id: CorrelationId, _key: &P::Key, _value: &P::Value) {}

    fn on_fetch_error(&self, _id: CorrelationId, _key: &P::Key, _error: &RemoteError) {}

    fn on_updated(&self, _id: CorrelationId, _key: &P::Key, _value: &P::Value) {}

    /// `old` is the last value the cache held, if any.
    fn on_deleted(&self, _id: CorrelationId, _key: &P::Key, _old: Option<&P::Value>) {}

    fn on_saved(&self, _id: CorrelationId, _key: &P::Key, _value: &P::Value) {}

    fn on_save_error(&self, _id: CorrelationId, _error: &RemoteError) {}

    fn on_delete_completed(&self, _id: CorrelationId, _key: &P::Key) {}

    fn on_delete_error(&self, _id: CorrelationId, _key: &P::Key, _error: &RemoteError) {}

    /// The cache dropped `key` without a replacement value. `old` is no
    /// longer current; the next `get` refetches it.
    fn on_invalidated(&self, _id: CorrelationId, _key: &P::Key, _old: &P::Value) {}
}

/// Shared handle to a subscriber.
pub type Subscriber<P> = Arc<dyn CacheListener<P>>;

/// Identity comparison for subscriber handles.
pub(crate) fn same_subscriber<P: EntityPlugin>(a: &Subscriber<P>, b: &Subscriber<P>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// A callback collected under the cache lock and delivered after it is
/// released.
pub(crate) enum Notification<P: EntityPlugin> {
    Fetched {
        subscriber: Subscriber<P>,
        id: CorrelationId,
        key: P::Key,
        value: P::Value,
    },
    FetchError {
        subscriber: Subscriber<P>,
        id: CorrelationId,
        key: P::Key,
        error: RemoteError,
    },
    Updated {
        subscriber: Subscriber<P>,
        id: CorrelationId,
        key: P::Key,
        value: P::Value,
    },
    Deleted {
        subscriber: Subscriber<P>,
        id: CorrelationId,
        key: P::Key,
        old: Option<P::Value>,
    },
    Saved {
        subscriber: Subscriber<P>,
        id: CorrelationId,
        key: P::Key,
        value: P::Value,
    },
    SaveError {
        subscriber: Subscriber<P>,
        id: CorrelationId,
        error: RemoteError,
    },
    DeleteCompleted {
        subscriber: Subscriber<P>,
        id: CorrelationId,
        key: P::Key,
    },
    DeleteError {
        subscriber: Subscriber<P>,
        id: CorrelationId,
        key: P::Key,
        error: RemoteError,
    },
    Invalidated {
        subscriber: Subscriber<P>,
        id: CorrelationId,
        key: P::Key,
        old: P::Value,
    },
}

impl<P: EntityPlugin> Notification<P> {
    fn subscriber(&self) -> &Subscriber<P> {
        match self {
            Notification::Fetched { subscriber, .. }
            | Notification::FetchError { subscriber, .. }
            | Notification::Updated { subscriber, .. }
            | Notification::Deleted { subscriber, .. }
            | Notification::Saved { subscriber, .. }
            | Notification::SaveError { subscriber, .. }
            | Notification::DeleteCompleted { subscriber, .. }
            | Notification::DeleteError { subscriber, .. }
            | Notification::Invalidated { subscriber, .. } => subscriber,
        }
    }

    fn required(&self) -> Capabilities {
        match self {
            Notification::Fetched { .. } => Capabilities::FETCHED,
            Notification::FetchError { .. } => Capabilities::FETCH_ERROR,
            Notification::Updated { .. } => Capabilities::UPDATED,
            Notification::Deleted { .. } => Capabilities::DELETED,
            Notification::Saved { .. } => Capabilities::SAVED,
            Notification::SaveError { .. } => Capabilities::SAVE_ERROR,
            Notification::DeleteCompleted { .. } => Capabilities::DELETE_COMPLETED,
            Notification::DeleteError { .. } => Capabilities::DELETE_ERROR,
            Notification::Invalidated { .. } => Capabilities::INVALIDATED,
        }
    }

    /// Invoke the callback if the subscriber wants it and is alive.
    /// Returns whether a callback ran.
    pub fn deliver(self) -> bool {
        let subscriber = self.subscriber();
        if !subscriber.capabilities().contains(self.required()) || !subscriber.is_alive() {
            return false;
        }

        match &self {
            Notification::Fetched {
                subscriber,
                id,
                key,
                value,
            } => subscriber.on_fetched(*id, key, value),
            Notification::FetchError {
                subscriber,
                id,
                key,
                error,
            } => subscriber.on_fetch_error(*id, key, error),
            Notification::Updated {
                subscriber,
                id,
                key,
                value,
            } => subscriber.on_updated(*id, key, value),
            Notification::Deleted {
                subscriber,
                id,
                key,
                old,
            } => subscriber.on_deleted(*id, key, old.as_ref()),
            Notification::Saved {
                subscriber,
                id,
                key,
                value,
            } => subscriber.on_saved(*id, key, value),
            Notification::SaveError {
                subscriber,
                id,
                error,
            } => subscriber.on_save_error(*id, error),
            Notification::DeleteCompleted {
                subscriber,
                id,
                key,
            } => subscriber.on_delete_completed(*id, key),
            Notification::DeleteError {
                subscriber,
                id,
                key,
                error,
            } => subscriber.on_delete_error(*id, key, error),
            Notification::Invalidated {
                subscriber,
                id,
                key,
                old,
            } => subscriber.on_invalidated(*id, key, old),
        }
        true
    }
}
