//! The remote channel boundary.
//!
//! Transport and encryption live outside this workspace. The caches only see
//! a fire-and-forget [`RemoteChannel::submit`] and an inbound stream that
//! carries completions and push events in delivery order.

use crate::{Command, Completion, CorrelationId, Event};
use tokio::sync::mpsc;

/// Outbound side of the connection to the server.
pub trait RemoteChannel: Send + Sync {
    /// Submit a command. Must not block and must not deliver the completion
    /// before returning.
    fn submit(&self, command: Command) -> CorrelationId;
}

/// Something the server sent us.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Completion(Completion),
    Event(Event),
}

impl From<Completion> for Inbound {
    fn from(completion: Completion) -> Self {
        Inbound::Completion(completion)
    }
}

impl From<Event> for Inbound {
    fn from(event: Event) -> Self {
        Inbound::Event(event)
    }
}

pub type InboundSender = mpsc::UnboundedSender<Inbound>;
pub type InboundReceiver = mpsc::UnboundedReceiver<Inbound>;

/// Create the queue the transport writes to and a cache context drains.
pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
    mpsc::unbounded_channel()
}
