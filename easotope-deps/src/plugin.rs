//! The dependency plugin contract and the context it resolves through.
//!
//! A plugin never blocks. It asks for objects with [`ResolveContext::get`]
//! and hands back the correlation id it is waiting on; the answer is queued
//! for the manager, which feeds it to [`DependencyPlugin::received_object`]
//! on its next pass.

use crate::anchor::Anchor;
use easotope_cache::{
    CacheKind, CacheListener, Capabilities, ChangeListener, EntityCache, EntityPlugin, LabCaches,
    Subscriber,
};
use easotope_core::{EasotopeResult, LabObject};
use easotope_events::{CorrelationId, RemoteError};
use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use tracing::warn;

/// One external fact a calculation step needs.
///
/// The state machine runs `request_object`, then `received_object` once per
/// answer, until one of them returns [`CorrelationId::NONE`] without having
/// fetched anything. The plugin then holds its final object, if any.
pub trait DependencyPlugin: Send {
    fn name(&self) -> &'static str;

    /// Start resolution. Returns the id to wait on.
    fn request_object(&mut self, ctx: &ResolveContext<'_>) -> EasotopeResult<CorrelationId>;

    /// Take one answer. Either keep it as final and return NONE, or treat it
    /// as an index and fetch the next hop.
    fn received_object(
        &mut self,
        ctx: &ResolveContext<'_>,
        object: LabObject,
    ) -> EasotopeResult<CorrelationId>;

    /// Whether the resolved object still applies to `anchor`. No I/O.
    fn verify_current_object(&self, anchor: &Anchor) -> bool;

    fn caches_to_listen_to(&self) -> &'static [CacheKind];

    /// Whether a reported change to `changed` invalidates what this plugin
    /// holds. No I/O.
    fn is_no_longer_valid(&self, anchor: &Anchor, changed: &LabObject) -> bool;

    fn resolved(&self) -> Option<&LabObject>;

    /// Forget everything resolved so far.
    fn reset(&mut self);
}

// ============================================================================
// INBOX
// ============================================================================

/// What the cache callbacks report back to a manager.
#[derive(Debug, Clone)]
pub(crate) enum Message {
    Fetched {
        slot: usize,
        generation: u64,
        result: Result<LabObject, RemoteError>,
    },
    Changed {
        kind: CacheKind,
        object: LabObject,
    },
}

pub(crate) type Inbox = Arc<Mutex<VecDeque<Message>>>;

fn post(inbox: &Weak<Mutex<VecDeque<Message>>>, message: Message) {
    let Some(inbox) = inbox.upgrade() else {
        return;
    };
    match inbox.lock() {
        Ok(mut queue) => queue.push_back(message),
        Err(_) => warn!("dependency inbox poisoned, dropping message"),
    };
}

/// One-shot waiter for a single plugin fetch.
struct SlotSubscriber {
    slot: usize,
    generation: u64,
    inbox: Weak<Mutex<VecDeque<Message>>>,
}

impl<P> CacheListener<P> for SlotSubscriber
where
    P: EntityPlugin,
    P::Value: Into<LabObject>,
{
    fn capabilities(&self) -> Capabilities {
        Capabilities::FETCH
    }

    fn is_alive(&self) -> bool {
        self.inbox.strong_count() > 0
    }

    fn on_fetched(&self, _id: CorrelationId, _key: &P::Key, value: &P::Value) {
        post(
            &self.inbox,
            Message::Fetched {
                slot: self.slot,
                generation: self.generation,
                result: Ok(value.clone().into()),
            },
        );
    }

    fn on_fetch_error(&self, _id: CorrelationId, _key: &P::Key, error: &RemoteError) {
        post(
            &self.inbox,
            Message::Fetched {
                slot: self.slot,
                generation: self.generation,
                result: Err(error.clone()),
            },
        );
    }
}

/// Persistent listener queuing every change in the caches a manager watches.
pub(crate) struct ChangeInbox {
    inbox: Weak<Mutex<VecDeque<Message>>>,
}

impl ChangeInbox {
    pub(crate) fn new(inbox: &Inbox) -> Self {
        Self {
            inbox: Arc::downgrade(inbox),
        }
    }
}

impl ChangeListener for ChangeInbox {
    fn is_alive(&self) -> bool {
        self.inbox.strong_count() > 0
    }

    fn on_changed(&self, kind: CacheKind, object: LabObject) {
        post(&self.inbox, Message::Changed { kind, object });
    }
}

// ============================================================================
// RESOLVE CONTEXT
// ============================================================================

/// What a plugin sees of its manager during one call.
pub struct ResolveContext<'a> {
    anchor: &'a Anchor,
    caches: &'a LabCaches,
    inbox: &'a Inbox,
    slot: usize,
    generation: u64,
    issued: Cell<bool>,
}

impl<'a> ResolveContext<'a> {
    pub(crate) fn new(
        anchor: &'a Anchor,
        caches: &'a LabCaches,
        inbox: &'a Inbox,
        slot: usize,
        generation: u64,
    ) -> Self {
        Self {
            anchor,
            caches,
            inbox,
            slot,
            generation,
            issued: Cell::new(false),
        }
    }

    pub fn anchor(&self) -> &Anchor {
        self.anchor
    }

    pub fn caches(&self) -> &LabCaches {
        self.caches
    }

    /// Fetch through `cache` on behalf of the calling plugin.
    ///
    /// A cache hit returns NONE and the object is already queued; the
    /// plugin must not treat that NONE as "finished".
    pub fn get<P>(&self, cache: &EntityCache<P>, params: P::Params) -> EasotopeResult<CorrelationId>
    where
        P: EntityPlugin,
        P::Value: Into<LabObject>,
    {
        let subscriber: Subscriber<P> = Arc::new(SlotSubscriber {
            slot: self.slot,
            generation: self.generation,
            inbox: Arc::downgrade(self.inbox),
        });
        self.issued.set(true);
        cache.get(subscriber, params)
    }

    /// Whether the plugin called [`ResolveContext::get`] during this call.
    pub(crate) fn issued(&self) -> bool {
        self.issued.get()
    }
}
