//! Outbound commands and their completions.
//!
//! A command is a correlated request/response unit. The correlation id is
//! assigned when the command is built, before it reaches the channel, so a
//! cache can record what it is waiting for before submission.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_CORRELATION_ID: AtomicU64 = AtomicU64::new(1);

/// Globally unique id matching a command to its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Sentinel for "answered without a round trip" and for
    /// notifications that were not caused by a command.
    pub const NONE: CorrelationId = CorrelationId(0);

    /// Allocate the next id. Never returns [`CorrelationId::NONE`].
    pub fn next() -> Self {
        Self(NEXT_CORRELATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_some(&self) -> bool {
        self.0 != 0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "NONE")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// What a command asks the server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    Fetch,
    Save,
    Delete,
}

/// An outbound request.
///
/// `name` selects the server-side handler; `payload` is opaque to the
/// channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: CorrelationId,
    pub kind: CommandKind,
    pub name: String,
    pub payload: Value,
}

impl Command {
    pub fn new(kind: CommandKind, name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: CorrelationId::next(),
            kind,
            name: name.into(),
            payload,
        }
    }

    pub fn fetch(name: impl Into<String>, payload: Value) -> Self {
        Self::new(CommandKind::Fetch, name, payload)
    }

    pub fn save(name: impl Into<String>, payload: Value) -> Self {
        Self::new(CommandKind::Save, name, payload)
    }

    pub fn delete(name: impl Into<String>, payload: Value) -> Self {
        Self::new(CommandKind::Delete, name, payload)
    }
}

/// Failure reported by the remote authority for one command.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteError {
    #[error("Remote request failed: {message}")]
    Failed { message: String },

    #[error("Remote refused request: {reason}")]
    Refused { reason: String },

    /// The server detected a stale optimistic precondition on a save.
    /// The caller should resubmit with refreshed state.
    #[error("Remote requires verify and resend: {message}")]
    VerifyAndResend { message: String },

    #[error("Entity was deleted while the request was outstanding")]
    EntityDeleted,

    #[error("Could not decode remote result: {reason}")]
    Decode { reason: String },
}

impl RemoteError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn is_verify_and_resend(&self) -> bool {
        matches!(self, Self::VerifyAndResend { .. })
    }
}

/// The single answer to a submitted command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub id: CorrelationId,
    pub outcome: Result<Value, RemoteError>,
}

impl Completion {
    pub fn ok(id: CorrelationId, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    pub fn err(id: CorrelationId, error: RemoteError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_correlation_ids_are_unique_and_never_none() {
        let a = CorrelationId::next();
        let b = CorrelationId::next();
        assert_ne!(a, b);
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(CorrelationId::NONE.is_none());
        assert_eq!(CorrelationId::default(), CorrelationId::NONE);
    }

    #[test]
    fn test_correlation_id_display() {
        assert_eq!(CorrelationId::NONE.to_string(), "NONE");
        assert_eq!(CorrelationId::from_raw(42).to_string(), "#42");
    }

    #[test]
    fn test_command_constructors_assign_ids() {
        let fetch = Command::fetch("standard.get", json!({ "id": 7 }));
        let save = Command::save("standard.save", json!({ "id": 7 }));
        assert_eq!(fetch.kind, CommandKind::Fetch);
        assert_eq!(save.kind, CommandKind::Save);
        assert!(fetch.id.is_some());
        assert_ne!(fetch.id, save.id);
    }

    #[test]
    fn test_remote_error_verify_and_resend() {
        let err = RemoteError::VerifyAndResend {
            message: "row version changed".to_string(),
        };
        assert!(err.is_verify_and_resend());
        assert!(!RemoteError::failed("boom").is_verify_and_resend());
        assert!(err.to_string().contains("verify and resend"));
    }
}
