//! Latency measurement over the ping/pong exchange.
//!
//! Heartbeats measure link quality; they do not detect failure. A ping that
//! never gets a pong is not an error by itself, since liveness problems
//! surface at the socket layer as close/error events.

use chrono::Utc;
use serde::Serialize;

use crate::transport::message::Message;

/// Coarse link-quality grade derived from measured latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Pure latency-to-quality classification.
pub fn quality_from_latency(latency_ms: f64) -> ConnectionQuality {
    if latency_ms < 50.0 {
        ConnectionQuality::Excellent
    } else if latency_ms < 150.0 {
        ConnectionQuality::Good
    } else if latency_ms < 300.0 {
        ConnectionQuality::Fair
    } else {
        ConnectionQuality::Poor
    }
}

/// Round-trip latency in milliseconds extracted from an inbound pong, which
/// echoes the originating ping timestamp as `pingTimestamp`.
pub fn pong_latency_ms(pong: &Message) -> Option<f64> {
    let ping_ts = pong.payload.get("pingTimestamp")?.as_i64()?;
    let elapsed = Utc::now().timestamp_millis() - ping_ts;
    Some(elapsed.max(0) as f64)
}

/// The timestamp an inbound server ping carries, echoed back in our pong.
pub fn ping_echo_timestamp(ping: &Message) -> Option<i64> {
    ping.payload.get("timestamp")?.as_i64()
}
