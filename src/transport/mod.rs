//! The `transport` module defines the wire protocol and the low-level pieces
//! of the persistent channel: the frame format, the connection state machine
//! with its backoff policy, heartbeat latency measurement, and the websocket
//! open/split plumbing.

pub mod connection;
pub mod heartbeat;
pub mod message;
pub mod websocket;
