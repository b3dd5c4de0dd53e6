//! The `reliability` module owns the two structures behind at-least-once
//! delivery: the bounded outbound queue that buffers messages while the link
//! is down, and the pending-ack table that tracks every message awaiting an
//! acknowledgment.

pub mod pending;
pub mod queue;

pub use pending::{PendingAcks, PendingEntry};
pub use queue::{OutboundQueue, QueuedMessage};
