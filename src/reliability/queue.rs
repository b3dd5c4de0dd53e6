use std::collections::VecDeque;
use std::time::Duration;

use crate::transport::message::Message;

/// A message waiting for the link to come back, together with the ack
/// timeout the caller asked for (resolved against the configured default at
/// transmit time).
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub message: Message,
    pub ack_timeout: Option<Duration>,
}

/// Ordered, bounded buffer of messages awaiting transmission.
///
/// Populated only while not connected. When full, new messages are dropped;
/// already-queued messages keep their order. Flushing drains strictly FIFO.
#[derive(Debug)]
pub struct OutboundQueue {
    capacity: usize,
    items: VecDeque<QueuedMessage>,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::new(),
        }
    }

    /// Appends a message, returning false when the queue is at capacity and
    /// the message was dropped.
    pub fn push(&mut self, message: Message, ack_timeout: Option<Duration>) -> bool {
        if self.items.len() >= self.capacity {
            return false;
        }
        self.items.push_back(QueuedMessage {
            message,
            ack_timeout,
        });
        true
    }

    /// Removes and returns every queued message in enqueue order.
    pub fn drain(&mut self) -> Vec<QueuedMessage> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
