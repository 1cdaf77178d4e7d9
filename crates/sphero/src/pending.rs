//! Pending-response bookkeeping.
//!
//! Regular responses carry no command identifier; the device answers strictly
//! in transmission order. The writer appends an entry here at the moment a
//! command's bytes are staged for flushing, and the receive loop pops the
//! oldest entry per regular response. Breaking that order breaks correlation
//! for every later command, so no other code touches this queue.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use sphero_protocol::Command;

/// One transmitted, not yet acknowledged command.
#[derive(Debug, Clone)]
pub(crate) struct PendingCommand {
    pub command: Command,
    /// System commands are consumed internally, never surfaced to listeners.
    pub system: bool,
    pub sent_at: Instant,
}

/// FIFO of transmitted commands awaiting their regular responses.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    inner: Mutex<VecDeque<PendingCommand>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: Command, system: bool) {
        self.lock().push_back(PendingCommand {
            command,
            system,
            sent_at: Instant::now(),
        });
    }

    /// Pop the oldest pending command, the one the next regular response
    /// answers.
    pub fn pop(&self) -> Option<PendingCommand> {
        self.lock().pop_front()
    }

    /// Remove every entry older than `timeout`, front first, and return them.
    pub fn expire(&self, timeout: Duration) -> Vec<PendingCommand> {
        let mut queue = self.lock();
        let mut expired = Vec::new();
        while let Some(front) = queue.front() {
            if front.sent_at.elapsed() < timeout {
                break;
            }
            if let Some(entry) = queue.pop_front() {
                expired.push(entry);
            }
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingCommand>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
