//! In-memory remote channel for tests and offline tooling.

use crate::{Command, CommandKind, CorrelationId, RemoteChannel};
use std::sync::{Mutex, MutexGuard};

/// Remote channel that records every submitted command and never answers.
///
/// Tests answer commands themselves by feeding [`Completion`](crate::Completion)s
/// to the cache that submitted them.
#[derive(Debug, Default)]
pub struct MockRemote {
    submitted: Mutex<Vec<Command>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn commands(&self) -> MutexGuard<'_, Vec<Command>> {
        // A panicking test thread must not hide the commands from the others.
        self.submitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All commands submitted so far, oldest first.
    pub fn submitted(&self) -> Vec<Command> {
        self.commands().clone()
    }

    pub fn submitted_count(&self) -> usize {
        self.commands().len()
    }

    pub fn last(&self) -> Option<Command> {
        self.commands().last().cloned()
    }

    /// Remove and return everything submitted so far.
    pub fn drain(&self) -> Vec<Command> {
        std::mem::take(&mut *self.commands())
    }

    /// Submitted commands with the given handler name.
    pub fn named(&self, name: &str) -> Vec<Command> {
        self.commands()
            .iter()
            .filter(|command| command.name == name)
            .cloned()
            .collect()
    }

    pub fn count_kind(&self, kind: CommandKind) -> usize {
        self.commands()
            .iter()
            .filter(|command| command.kind == kind)
            .count()
    }
}

impl RemoteChannel for MockRemote {
    fn submit(&self, command: Command) -> CorrelationId {
        let id = command.id;
        self.commands().push(command);
        id
    }
}
