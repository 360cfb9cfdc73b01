//! Easotope Events - Commands, Completions and Push Events
//!
//! This crate defines everything that crosses the boundary between the
//! client caches and the server connection:
//!
//! ```text
//! Cache --Command--> RemoteChannel --> server
//! Cache <--Completion / Event-- Inbound queue <-- server
//! ```
//!
//! # Key Types
//!
//! - `CorrelationId`: matches a completion to the command that caused it
//! - `Command`: outbound request with an opaque JSON payload
//! - `Completion`: the single answer to one command, a result or a `RemoteError`
//! - `Event`: unsolicited remote-side change notification
//! - `RemoteChannel`: fire-and-forget submission trait
//! - `MockRemote`: recording channel for tests

mod channel;
mod command;
mod event;
mod mock;

pub use channel::{inbound_channel, Inbound, InboundReceiver, InboundSender, RemoteChannel};
pub use command::{Command, CommandKind, Completion, CorrelationId, RemoteError};
pub use event::Event;
pub use mock::MockRemote;
