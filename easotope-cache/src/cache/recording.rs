//! Recording subscriber for tests and diagnostics.

use super::plugin::EntityPlugin;
use super::subscriber::{Capabilities, CacheListener, Subscriber};
use easotope_events::{CorrelationId, RemoteError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// One callback as received by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq)]
pub enum Callback<K, V> {
    Fetched {
        id: CorrelationId,
        key: K,
        value: V,
    },
    FetchError {
        id: CorrelationId,
        key: K,
        error: RemoteError,
    },
    Updated {
        id: CorrelationId,
        key: K,
        value: V,
    },
    Deleted {
        id: CorrelationId,
        key: K,
        old: Option<V>,
    },
    Saved {
        id: CorrelationId,
        key: K,
        value: V,
    },
    SaveError {
        id: CorrelationId,
        error: RemoteError,
    },
    DeleteCompleted {
        id: CorrelationId,
        key: K,
    },
    DeleteError {
        id: CorrelationId,
        key: K,
        error: RemoteError,
    },
    Invalidated {
        id: CorrelationId,
        key: K,
        old: V,
    },
}

/// Subscriber that records every callback it receives.
pub struct RecordingListener<P: EntityPlugin> {
    capabilities: Capabilities,
    alive: AtomicBool,
    calls: Mutex<Vec<Callback<P::Key, P::Value>>>,
}

impl<P: EntityPlugin> RecordingListener<P> {
    pub fn new(capabilities: Capabilities) -> Arc<Self> {
        Arc::new(Self {
            capabilities,
            alive: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Accepts every callback.
    pub fn all() -> Arc<Self> {
        Self::new(Capabilities::all())
    }

    /// Persistent listener for updates and deletions only.
    pub fn listener() -> Arc<Self> {
        Self::new(Capabilities::LISTENER)
    }

    /// One-shot `get` caller.
    pub fn fetcher() -> Arc<Self> {
        Self::new(Capabilities::FETCH)
    }

    pub fn subscriber(self: &Arc<Self>) -> Subscriber<P> {
        Arc::clone(self) as Subscriber<P>
    }

    /// Mark the owner as gone; the cache stops calling back.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    fn recorded(&self) -> MutexGuard<'_, Vec<Callback<P::Key, P::Value>>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, callback: Callback<P::Key, P::Value>) {
        self.recorded().push(callback);
    }

    pub fn calls(&self) -> Vec<Callback<P::Key, P::Value>> {
        self.recorded().clone()
    }

    pub fn call_count(&self) -> usize {
        self.recorded().len()
    }

    pub fn clear(&self) {
        self.recorded().clear();
    }

    pub fn fetched(&self) -> Vec<(CorrelationId, P::Value)> {
        self.recorded()
            .iter()
            .filter_map(|call| match call {
                Callback::Fetched { id, value, .. } => Some((*id, value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn fetch_errors(&self) -> Vec<(CorrelationId, RemoteError)> {
        self.recorded()
            .iter()
            .filter_map(|call| match call {
                Callback::FetchError { id, error, .. } => Some((*id, error.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn updated(&self) -> Vec<(CorrelationId, P::Key, P::Value)> {
        self.recorded()
            .iter()
            .filter_map(|call| match call {
                Callback::Updated { id, key, value } => Some((*id, key.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<(CorrelationId, P::Key, Option<P::Value>)> {
        self.recorded()
            .iter()
            .filter_map(|call| match call {
                Callback::Deleted { id, key, old } => Some((*id, key.clone(), old.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn saved(&self) -> Vec<(CorrelationId, P::Value)> {
        self.recorded()
            .iter()
            .filter_map(|call| match call {
                Callback::Saved { id, value, .. } => Some((*id, value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn invalidated(&self) -> Vec<(CorrelationId, P::Key, P::Value)> {
        self.recorded()
            .iter()
            .filter_map(|call| match call {
                Callback::Invalidated { id, key, old } => Some((*id, key.clone(), old.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn save_errors(&self) -> Vec<(CorrelationId, RemoteError)> {
        self.recorded()
            .iter()
            .filter_map(|call| match call {
                Callback::SaveError { id, error } => Some((*id, error.clone())),
                _ => None,
            })
            .collect()
    }
}

impl<P: EntityPlugin> CacheListener<P> for RecordingListener<P> {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn on_fetched(&self, id: CorrelationId, key: &P::Key, value: &P::Value) {
        self.record(Callback::Fetched {
            id,
            key: key.clone(),
            value: value.clone(),
        });
    }

    fn on_fetch_error(&self, id: CorrelationId, key: &P::Key, error: &RemoteError) {
        self.record(Callback::FetchError {
            id,
            key: key.clone(),
            error: error.clone(),
        });
    }

    fn on_updated(&self, id: CorrelationId, key: &P::Key, value: &P::Value) {
        self.record(Callback::Updated {
            id,
            key: key.clone(),
            value: value.clone(),
        });
    }

    fn on_deleted(&self, id: CorrelationId, key: &P::Key, old: Option<&P::Value>) {
        self.record(Callback::Deleted {
            id,
            key: key.clone(),
            old: old.cloned(),
        });
    }

    fn on_saved(&self, id: CorrelationId, key: &P::Key, value: &P::Value) {
        self.record(Callback::Saved {
            id,
            key: key.clone(),
            value: value.clone(),
        });
    }

    fn on_save_error(&self, id: CorrelationId, error: &RemoteError) {
        self.record(Callback::SaveError {
            id,
            error: error.clone(),
        });
    }

    fn on_delete_completed(&self, id: CorrelationId, key: &P::Key) {
        self.record(Callback::DeleteCompleted {
            id,
            key: key.clone(),
        });
    }

    fn on_delete_error(&self, id: CorrelationId, key: &P::Key, error: &RemoteError) {
        self.record(Callback::DeleteError {
            id,
            key: key.clone(),
            error: error.clone(),
        });
    }

    fn on_invalidated(&self, id: CorrelationId, key: &P::Key, old: &P::Value) {
        self.record(Callback::Invalidated {
            id,
            key: key.clone(),
            old: old.clone(),
        });
    }
}
