//! The `client` module exposes the public transport facade. A `Transport`
//! owns the connection, the outbound queue, the pending-ack table, and the
//! statistics, and wires the lower-level components together.

pub mod transport_client;

pub use transport_client::{SendOptions, Transport, TransportEvent};

#[cfg(test)]
mod tests;
