use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

/// Frame types reserved by the transport itself. Any other `type` string is
/// an application type and is routed to subscribers.
pub const KIND_PING: &str = "ping";
pub const KIND_PONG: &str = "pong";
pub const KIND_ACK: &str = "ack";
pub const KIND_HANDSHAKE: &str = "handshake";

pub const PROTOCOL_VERSION: u32 = 1;

/// Delivery priority carried on every frame. It is kept for receiver-side
/// use; the outbound queue flushes in strict FIFO order regardless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// One unit of transport-level data.
///
/// Serializes to the wire shape
/// `{id, type, payload, timestamp, clientId, priority, requiresAck?, correlationId?}`.
/// The payload is opaque to the transport; it is only measured for the
/// bandwidth estimate, never inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "is_false")]
    pub requires_ack: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl Message {
    /// Creates an application frame with a fresh unique id.
    pub fn new(kind: &str, payload: Value, client_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            payload,
            timestamp: Utc::now(),
            client_id: client_id.to_string(),
            priority: Priority::Normal,
            requires_ack: false,
            correlation_id: None,
        }
    }

    /// The first frame sent after a connection is established, identifying
    /// the client to the server. Fire-and-forget.
    pub fn handshake(client_id: &str) -> Self {
        Self::new(
            KIND_HANDSHAKE,
            json!({
                "clientId": client_id,
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": ["compression", "heartbeat", "ack"],
            }),
            client_id,
        )
    }

    /// A liveness probe. Pings use their own pong protocol, not the generic
    /// ack mechanism, so `requires_ack` stays false.
    pub fn ping(client_id: &str) -> Self {
        Self::new(
            KIND_PING,
            json!({ "timestamp": Utc::now().timestamp_millis() }),
            client_id,
        )
    }

    /// The reply to a ping, echoing the originating ping timestamp so the
    /// receiver can compute round-trip latency.
    pub fn pong(client_id: &str, ping_timestamp: i64) -> Self {
        Self::new(
            KIND_PONG,
            json!({
                "timestamp": Utc::now().timestamp_millis(),
                "pingTimestamp": ping_timestamp,
            }),
            client_id,
        )
    }

    /// An acknowledgment frame referencing a previously received message id.
    pub fn ack(client_id: &str, message_id: &str) -> Self {
        Self::new(KIND_ACK, json!({ "messageId": message_id }), client_id)
    }

    /// For `ack` frames, the id of the message being acknowledged.
    pub fn acked_id(&self) -> Option<&str> {
        self.payload.get("messageId")?.as_str()
    }

    /// Serialized size of this frame in bytes, as it would go on the wire.
    pub fn wire_size(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }
}
