use thiserror::Error;

/// Raised only when the very first connection attempt fails at the transport
/// level. Failures during background reconnects are reported as lifecycle
/// events instead, never as errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket connect failed: {0}")]
    Connect(#[from] tungstenite::Error),
}

/// Raised only when the caller's payload cannot be serialized. Disconnection
/// is not a send error; messages are queued while the link is down.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
