use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

/// Thread-safe FIFO of text payloads between a worker and the host.
///
/// Listeners push decoded strings and the host drains them; for senders the
/// roles are swapped. Clones share the same channel.
#[derive(Debug, Clone)]
pub struct MessageQueue {
    tx: Sender<String>,
    rx: Receiver<String>,
}

impl MessageQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    pub fn push(&self, message: impl Into<String>) {
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.tx.send(message.into());
    }

    pub fn try_pop(&self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next message.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Take every queued message, oldest first.
    pub fn drain(&self) -> Vec<String> {
        self.rx.try_iter().collect()
    }

    /// Drop every queued message and return how many were dropped.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}
