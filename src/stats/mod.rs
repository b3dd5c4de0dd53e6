//! The `stats` module owns the rolling transport statistics: frame counters,
//! a windowed bandwidth estimate per direction, measured latency, and the
//! derived connection-quality grade.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::transport::heartbeat::{ConnectionQuality, quality_from_latency};

/// Bandwidth samples older than this fall out of the estimate.
const BANDWIDTH_WINDOW: Duration = Duration::from_secs(10);

/// Latency is averaged over this many recent pong samples.
const LATENCY_SAMPLES: usize = 10;

/// Bytes per second, per direction, over the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bandwidth {
    pub upstream: f64,
    pub downstream: f64,
}

/// Read-only view handed to callers. Derived fields (bandwidth, quality) are
/// computed at snapshot time, never cached stale.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub connected: bool,
    pub connection_time: Option<DateTime<Utc>>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_attempts: u32,
    pub latency_ms: f64,
    pub bandwidth: Bandwidth,
    pub connection_quality: ConnectionQuality,
}

/// Mutable aggregate behind the snapshot. Owned by the transport; every
/// component records through it, none keeps a private copy.
#[derive(Debug)]
pub struct StatsAggregator {
    connected: bool,
    connection_time: Option<DateTime<Utc>>,
    last_message_time: Option<DateTime<Utc>>,
    messages_sent: u64,
    messages_received: u64,
    reconnect_attempts: u32,
    latency: VecDeque<f64>,
    upstream: VecDeque<(Instant, usize)>,
    downstream: VecDeque<(Instant, usize)>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            connected: false,
            connection_time: None,
            last_message_time: None,
            messages_sent: 0,
            messages_received: 0,
            reconnect_attempts: 0,
            latency: VecDeque::new(),
            upstream: VecDeque::new(),
            downstream: VecDeque::new(),
        }
    }

    pub fn mark_connected(&mut self, at: DateTime<Utc>) {
        self.connected = true;
        self.connection_time = Some(at);
    }

    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    /// Counts every transmitted frame, internal ping/pong/ack included.
    pub fn record_sent(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.last_message_time = Some(Utc::now());
        self.upstream.push_back((Instant::now(), bytes));
    }

    /// Counts every received frame, internal ping/pong/ack included.
    pub fn record_received(&mut self, bytes: usize) {
        self.messages_received += 1;
        self.last_message_time = Some(Utc::now());
        self.downstream.push_back((Instant::now(), bytes));
    }

    pub fn record_latency(&mut self, latency_ms: f64) {
        if self.latency.len() >= LATENCY_SAMPLES {
            self.latency.pop_front();
        }
        self.latency.push_back(latency_ms);
    }

    pub fn record_reconnect_attempt(&mut self) {
        self.reconnect_attempts += 1;
    }

    /// Rolling average over recent pong samples; 0 before any sample.
    pub fn latency_ms(&self) -> f64 {
        if self.latency.is_empty() {
            return 0.0;
        }
        self.latency.iter().sum::<f64>() / self.latency.len() as f64
    }

    pub fn snapshot(&mut self) -> StatsSnapshot {
        prune(&mut self.upstream);
        prune(&mut self.downstream);
        let latency_ms = self.latency_ms();
        StatsSnapshot {
            connected: self.connected,
            connection_time: self.connection_time,
            last_message_time: self.last_message_time,
            messages_sent: self.messages_sent,
            messages_received: self.messages_received,
            reconnect_attempts: self.reconnect_attempts,
            latency_ms,
            bandwidth: Bandwidth {
                upstream: window_rate(&self.upstream),
                downstream: window_rate(&self.downstream),
            },
            connection_quality: quality_from_latency(latency_ms),
        }
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn prune(window: &mut VecDeque<(Instant, usize)>) {
    while let Some(&(at, _)) = window.front() {
        if at.elapsed() > BANDWIDTH_WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}

fn window_rate(window: &VecDeque<(Instant, usize)>) -> f64 {
    let total: usize = window.iter().map(|&(_, bytes)| bytes).sum();
    total as f64 / BANDWIDTH_WINDOW.as_secs_f64()
}
