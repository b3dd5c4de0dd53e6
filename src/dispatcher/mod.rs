//! The `dispatcher` module routes inbound frames to type-scoped subscriber
//! sets. Reserved frame types (`ping`, `pong`, `ack`) are consumed by the
//! heartbeat and reliability layers before generic dispatch and never reach
//! ordinary subscribers.

pub mod registry;

pub use registry::{Dispatcher, Subscription, WILDCARD};
