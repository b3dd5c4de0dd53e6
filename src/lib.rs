//! # pulselink
//!
//! `pulselink` is a client-side real-time message transport. It keeps one
//! persistent WebSocket channel to a server, survives disconnects with
//! exponential-backoff reconnection, measures link quality over a ping/pong
//! heartbeat, and provides at-least-once delivery with explicit
//! acknowledgment for outbound messages.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `client`: The public `Transport` facade: connect, send, subscribe, stats.
//! - `config`: Handles loading and merging transport configuration.
//! - `dispatcher`: Routes inbound frames to type-scoped subscriber sets.
//! - `reliability`: The bounded outbound queue and the pending-ack table.
//! - `stats`: Rolling counters, bandwidth estimate, and quality grade.
//! - `transport`: The wire frame, connection state machine, and heartbeat.
//! - `utils`: Shared utilities, such as error types and logging setup.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod reliability;
pub mod stats;
pub mod transport;
pub mod utils;
