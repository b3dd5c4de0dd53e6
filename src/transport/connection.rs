use std::time::Duration;

/// Reconnect delays stop growing past this point.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// The connection lifecycle. Exactly one value holds at any time.
///
/// `Failed` is reached only after reconnect attempts are exhausted and is
/// terminal until an explicit external `connect()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Delay before reconnect attempt number `attempt` (1-based):
/// `min(base * 2^(attempt-1), 30s)`.
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(15);
    let delay_ms = base_ms.saturating_mul(1u64 << shift);
    Duration::from_millis(delay_ms.min(MAX_BACKOFF.as_millis() as u64))
}

/// Owns the connection state machine and the reconnect attempt counter.
///
/// The manager only does bookkeeping; socket I/O and timers live in the
/// client facade, which consults the manager for every transition.
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    attempts: u32,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of the reconnect attempt currently scheduled or in flight.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// External `connect()` entry point. Returns false while already
    /// connecting or connected, making repeated calls a no-op. A manual call
    /// from `Disconnected` starts over with a fresh attempt counter.
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => false,
            ConnectionState::Disconnected => {
                self.attempts = 0;
                self.state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Reconnecting | ConnectionState::Failed => {
                self.state = ConnectionState::Connecting;
                true
            }
        }
    }

    /// Socket opened. The attempt counter resets upon reaching connected.
    pub fn mark_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
    }

    /// Transition to `Disconnected` from any state, returning the previous
    /// state so callers can tell whether a live link was torn down.
    pub fn mark_disconnected(&mut self) -> ConnectionState {
        std::mem::replace(&mut self.state, ConnectionState::Disconnected)
    }

    /// Schedules the next reconnect attempt. Returns the attempt number and
    /// its backoff delay, or `None` once attempts are exhausted, in which
    /// case the state becomes `Failed`.
    pub fn schedule_reconnect(&mut self, base_ms: u64, max_attempts: u32) -> Option<(u32, Duration)> {
        self.attempts += 1;
        if self.attempts > max_attempts {
            self.state = ConnectionState::Failed;
            None
        } else {
            self.state = ConnectionState::Reconnecting;
            Some((self.attempts, backoff_delay(base_ms, self.attempts)))
        }
    }

    /// The reconnect timer fired; the scheduled attempt is now in flight.
    pub fn reconnect_due(&mut self) {
        self.state = ConnectionState::Connecting;
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
