use std::collections::HashMap;
use std::time::Instant;

use tokio::task::JoinHandle;

use crate::transport::message::Message;

/// One in-flight `requiresAck` message: the frame as sent, when it was
/// handed to the wire, and the timeout task that will expire it.
#[derive(Debug)]
pub struct PendingEntry {
    pub message: Message,
    pub enqueued_at: Instant,
    pub timer: Option<JoinHandle<()>>,
}

/// Tracks every transmitted message that expects an acknowledgment, indexed
/// by message id.
///
/// Entries are created at send time and removed on matching ack receipt or
/// on timeout expiry, whichever comes first. An existing entry is never
/// silently overwritten; message ids are unique for the process lifetime.
#[derive(Debug, Default)]
pub struct PendingAcks {
    entries: HashMap<String, PendingEntry>,
}

impl PendingAcks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entry, returning false if the id is already tracked
    /// (the existing entry is kept untouched).
    pub fn insert(&mut self, message: Message) -> bool {
        let id = message.id.clone();
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(
            id,
            PendingEntry {
                message,
                enqueued_at: Instant::now(),
                timer: None,
            },
        );
        true
    }

    /// Attaches the timeout task handle to an entry inserted just before.
    pub fn attach_timer(&mut self, id: &str, timer: JoinHandle<()>) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.timer = Some(timer);
        } else {
            // Entry already expired or acked between insert and spawn
            timer.abort();
        }
    }

    /// Removes an entry. Removing an unknown id is a no-op returning `None`,
    /// which makes late acks and late timeouts idempotent.
    pub fn remove(&mut self, id: &str) -> Option<PendingEntry> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stops every timeout clock without forgetting the entries. Used on
    /// teardown so no timer fires spuriously after disconnect.
    pub fn cancel_timers(&mut self) {
        for entry in self.entries.values_mut() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
        }
    }
}
