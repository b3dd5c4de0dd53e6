use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::config::TransportSettings;
use crate::dispatcher::{Dispatcher, Subscription};
use crate::reliability::{OutboundQueue, PendingAcks};
use crate::stats::{StatsAggregator, StatsSnapshot};
use crate::transport::connection::{ConnectionManager, ConnectionState};
use crate::transport::heartbeat;
use crate::transport::message::{KIND_ACK, KIND_PING, KIND_PONG, Message, Priority};
use crate::transport::websocket::{self, FrameSender, WsReader};
use crate::utils::error::{ConnectionError, SendError};

/// Lifecycle notifications emitted to external collaborators.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The socket opened and the handshake went out.
    Established,
    /// The link went down, by error, server close, or manual disconnect.
    Closed,
    /// A transport-level error, including failed background reconnects.
    Error(String),
    /// A reconnect attempt has been scheduled.
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// Reconnect attempts are exhausted; recoverable only via `connect()`.
    Failed,
    /// A `requiresAck` message was acknowledged in time.
    Acknowledged { id: String },
    /// A `requiresAck` message's deadline elapsed with no matching ack.
    /// No automatic retry is performed; the caller decides whether to resend.
    AckTimeout { id: String },
}

/// Per-send options. `timeout` overrides the configured ack deadline for
/// this message only.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub priority: Priority,
    pub requires_ack: bool,
    pub timeout: Option<Duration>,
    pub correlation_id: Option<String>,
}

#[derive(Default)]
struct ConnTasks {
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

struct Inner {
    settings: TransportSettings,
    client_id: String,
    conn: Mutex<ConnectionManager>,
    queue: Mutex<OutboundQueue>,
    pending: Mutex<PendingAcks>,
    stats: Mutex<StatsAggregator>,
    dispatcher: Dispatcher,
    sender: Mutex<Option<FrameSender>>,
    tasks: Mutex<ConnTasks>,
    events: broadcast::Sender<TransportEvent>,
}

/// The real-time transport client.
///
/// Maintains one persistent websocket channel: reconnects with exponential
/// backoff when the link drops, measures latency over ping/pong, buffers
/// outbound messages while disconnected, and tracks acknowledgment deadlines
/// for messages that require one.
///
/// Cloning is cheap and every clone drives the same connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl Transport {
    pub fn new(settings: TransportSettings) -> Self {
        let (events, _) = broadcast::channel(64);
        let queue_size = settings.message_queue_size;
        Self {
            inner: Arc::new(Inner {
                settings,
                client_id: format!("client-{}", Uuid::new_v4()),
                conn: Mutex::new(ConnectionManager::new()),
                queue: Mutex::new(OutboundQueue::new(queue_size)),
                pending: Mutex::new(PendingAcks::new()),
                stats: Mutex::new(StatsAggregator::new()),
                dispatcher: Dispatcher::new(),
                sender: Mutex::new(None),
                tasks: Mutex::new(ConnTasks::default()),
                events,
            }),
        }
    }

    /// Establishes the connection. Idempotent: while already connecting or
    /// connected this resolves immediately. Errors only if this initial
    /// attempt fails before any retry is scheduled; once connected, later
    /// failures are retried in the background and reported as events.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        {
            let mut conn = self.inner.conn.lock().unwrap();
            if !conn.begin_connect() {
                return Ok(());
            }
        }
        if let Some(handle) = self.inner.tasks.lock().unwrap().reconnect.take() {
            handle.abort();
        }
        match self.open().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.inner.conn.lock().unwrap().mark_disconnected();
                self.emit(TransportEvent::Error(e.to_string()));
                tracing::warn!("connect failed: {e}");
                Err(ConnectionError::Connect(e))
            }
        }
    }

    /// Tears the connection down. Always succeeds: cancels the heartbeat,
    /// any scheduled reconnect, and every pending-ack timeout clock (the
    /// entries themselves stay in the table).
    pub fn disconnect(&self) {
        let prev = self.inner.conn.lock().unwrap().mark_disconnected();
        if let Some(handle) = self.inner.tasks.lock().unwrap().reconnect.take() {
            handle.abort();
        }
        self.teardown_link(true);
        self.inner.pending.lock().unwrap().cancel_timers();
        if matches!(
            prev,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        ) {
            self.emit(TransportEvent::Closed);
            tracing::info!("disconnected");
        }
    }

    /// Sends an application message, or queues it while the link is down.
    ///
    /// Fails only if the payload cannot be serialized; disconnection is not
    /// an error. When the bounded queue is full the message is dropped
    /// silently, the deliberate backpressure policy for callers that already
    /// elected best-effort delivery.
    pub async fn send(
        &self,
        kind: &str,
        payload: impl Serialize,
        options: SendOptions,
    ) -> Result<(), SendError> {
        let payload = serde_json::to_value(payload)?;
        let mut msg = Message::new(kind, payload, &self.inner.client_id);
        msg.priority = options.priority;
        msg.requires_ack = options.requires_ack;
        msg.correlation_id = options.correlation_id;

        let connected = self.connection_state() == ConnectionState::Connected;
        if connected {
            self.transmit(msg, options.timeout);
        } else {
            self.enqueue(msg, options.timeout);
        }
        Ok(())
    }

    /// Registers a handler for an application message type. `"*"` (or
    /// `"all"`) receives every message, after type-specific handlers. The
    /// returned handle unsubscribes exactly this registration; calling it
    /// twice is a no-op.
    pub fn subscribe<F>(&self, kind: &str, handler: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(kind, handler)
    }

    /// A receiver of lifecycle events. Each call returns an independent
    /// receiver observing events from this point on.
    pub fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }

    /// A point-in-time copy of the transport statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.lock().unwrap().snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.conn.lock().unwrap().state()
    }

    /// Stable for the lifetime of this client, across reconnects.
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn queue_size(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }

    /// Number of sent messages still awaiting acknowledgment.
    pub fn pending_ack_count(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }

    fn emit(&self, event: TransportEvent) {
        // Nobody listening is fine
        let _ = self.inner.events.send(event);
    }

    /// Opens the socket and brings the link up: writer and reader tasks,
    /// handshake, heartbeat, then the queued backlog in FIFO order.
    async fn open(&self) -> Result<(), tungstenite::Error> {
        let (tx, reader, writer) = websocket::open_socket(&self.inner.settings.url).await?;

        {
            let mut conn = self.inner.conn.lock().unwrap();
            if conn.state() != ConnectionState::Connecting {
                // disconnect() won the race while the handshake was in flight
                writer.abort();
                return Ok(());
            }
            conn.mark_connected();
        }
        *self.inner.sender.lock().unwrap() = Some(tx);
        self.inner.tasks.lock().unwrap().writer = Some(writer);
        self.inner.stats.lock().unwrap().mark_connected(Utc::now());
        self.emit(TransportEvent::Established);
        tracing::info!(url = %self.inner.settings.url, "connection established");

        // Fire-and-forget: failure to deliver the handshake is not fatal
        self.transmit(Message::handshake(&self.inner.client_id), None);

        let heartbeat = tokio::spawn(self.clone().run_heartbeat());
        let read = tokio::spawn(self.clone().run_read_loop(reader));
        {
            let mut tasks = self.inner.tasks.lock().unwrap();
            tasks.heartbeat = Some(heartbeat);
            tasks.reader = Some(read);
        }

        self.flush_queue();
        Ok(())
    }

    /// Hands a frame to the writer task and, for `requiresAck` frames that
    /// made it onto the wire, starts tracking the acknowledgment deadline.
    fn transmit(&self, msg: Message, ack_timeout: Option<Duration>) {
        let text = match serde_json::to_string(&msg) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(kind = %msg.kind, "failed to serialize frame: {e}");
                return;
            }
        };

        let delivered = self
            .inner
            .sender
            .lock()
            .unwrap()
            .as_ref()
            .map(|tx| tx.send(WsMessage::text(text.clone())).is_ok())
            .unwrap_or(false);

        if !delivered {
            // The link raced down underneath us; keep the message for the flush
            tracing::debug!(kind = %msg.kind, "writer gone, message requeued");
            self.enqueue(msg, ack_timeout);
            return;
        }

        self.inner.stats.lock().unwrap().record_sent(text.len());
        if msg.requires_ack {
            self.track_pending(msg, ack_timeout);
        }
    }

    /// Stores a message for the next flush, logging when the bounded queue
    /// rejects it.
    fn enqueue(&self, msg: Message, ack_timeout: Option<Duration>) {
        let kind = msg.kind.clone();
        let stored = self.inner.queue.lock().unwrap().push(msg, ack_timeout);
        if !stored {
            tracing::debug!(kind = %kind, "outbound queue full, message dropped");
        }
    }

    /// Inserts a pending-ack entry and arms its timeout clock. An existing
    /// entry under the same id is never overwritten.
    fn track_pending(&self, msg: Message, ack_timeout: Option<Duration>) {
        let id = msg.id.clone();
        {
            let mut pending = self.inner.pending.lock().unwrap();
            if !pending.insert(msg) {
                tracing::error!(id = %id, "pending-ack id already tracked, entry kept");
                return;
            }
        }

        let wait =
            ack_timeout.unwrap_or(Duration::from_millis(self.inner.settings.ack_timeout_ms));
        let transport = self.clone();
        let timer_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let expired = transport
                .inner
                .pending
                .lock()
                .unwrap()
                .remove(&timer_id)
                .is_some();
            if expired {
                tracing::debug!(id = %timer_id, "ack deadline elapsed");
                transport.emit(TransportEvent::AckTimeout { id: timer_id });
            }
        });
        self.inner.pending.lock().unwrap().attach_timer(&id, timer);
    }

    /// Drains the outbound queue in enqueue order. `priority` is carried on
    /// the frames but does not reorder the flush.
    fn flush_queue(&self) {
        let backlog = self.inner.queue.lock().unwrap().drain();
        if backlog.is_empty() {
            return;
        }
        tracing::debug!(count = backlog.len(), "flushing outbound queue");
        for queued in backlog {
            self.transmit(queued.message, queued.ack_timeout);
        }
    }

    async fn run_heartbeat(self) {
        let period = Duration::from_millis(self.inner.settings.heartbeat_interval_ms);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately; the first ping waits a full period
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if self.connection_state() != ConnectionState::Connected {
                break;
            }
            self.transmit(Message::ping(&self.inner.client_id), None);
            tracing::trace!("ping sent");
        }
    }

    async fn run_read_loop(self, mut reader: WsReader) {
        while let Some(frame) = reader.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("socket error: {e}");
                    self.emit(TransportEvent::Error(e.to_string()));
                    break;
                }
            };
            if frame.is_close() {
                break;
            }
            if !frame.is_text() {
                continue;
            }
            let Ok(text) = frame.to_text() else { continue };
            self.inner.stats.lock().unwrap().record_received(text.len());
            match serde_json::from_str::<Message>(text) {
                Ok(msg) => self.handle_frame(msg),
                Err(e) => tracing::warn!("invalid frame: {e} | {text}"),
            }
        }
        self.handle_socket_down();
    }

    /// Reserved frames are consumed here; everything else is acked when
    /// asked and dispatched to subscribers.
    fn handle_frame(&self, msg: Message) {
        match msg.kind.as_str() {
            KIND_PONG => {
                if let Some(latency) = heartbeat::pong_latency_ms(&msg) {
                    self.inner.stats.lock().unwrap().record_latency(latency);
                    tracing::trace!(latency_ms = latency, "pong received");
                }
            }
            KIND_PING => {
                if let Some(ts) = heartbeat::ping_echo_timestamp(&msg) {
                    self.transmit(Message::pong(&self.inner.client_id, ts), None);
                }
            }
            KIND_ACK => {
                if let Some(id) = msg.acked_id().map(str::to_string) {
                    self.handle_ack(&id);
                }
            }
            _ => {
                if msg.requires_ack {
                    // Ack goes out before the message reaches subscribers
                    self.transmit(Message::ack(&self.inner.client_id, &msg.id), None);
                }
                self.inner.dispatcher.dispatch(&msg);
            }
        }
    }

    fn handle_ack(&self, id: &str) {
        let entry = self.inner.pending.lock().unwrap().remove(id);
        match entry {
            Some(entry) => {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                self.emit(TransportEvent::Acknowledged { id: id.to_string() });
            }
            // Late ack after timeout, or ack for a message we never tracked
            None => tracing::debug!(id, "ack for untracked message ignored"),
        }
    }

    /// The read loop ended. Manual disconnects were already handled; an
    /// unexpected drop tears the link down and, when auto-reconnect is on,
    /// schedules the next attempt.
    fn handle_socket_down(&self) {
        {
            let conn = self.inner.conn.lock().unwrap();
            if conn.state() != ConnectionState::Connected {
                return;
            }
        }
        // Running inside the reader task, which must not abort itself
        self.teardown_link(false);
        self.emit(TransportEvent::Closed);
        tracing::info!("connection closed");

        if !self.inner.settings.auto_reconnect {
            self.inner.conn.lock().unwrap().mark_disconnected();
            return;
        }
        self.schedule_reconnect();
    }

    fn teardown_link(&self, abort_reader: bool) {
        {
            let mut tasks = self.inner.tasks.lock().unwrap();
            if let Some(handle) = tasks.heartbeat.take() {
                handle.abort();
            }
            if let Some(handle) = tasks.writer.take() {
                handle.abort();
            }
            if let Some(handle) = tasks.reader.take() {
                if abort_reader {
                    handle.abort();
                }
            }
        }
        *self.inner.sender.lock().unwrap() = None;
        self.inner.stats.lock().unwrap().mark_disconnected();
    }

    fn schedule_reconnect(&self) {
        let scheduled = {
            let mut conn = self.inner.conn.lock().unwrap();
            conn.schedule_reconnect(
                self.inner.settings.reconnect_interval_ms,
                self.inner.settings.max_reconnect_attempts,
            )
        };
        let Some((attempt, delay)) = scheduled else {
            self.emit(TransportEvent::Failed);
            tracing::warn!("reconnect attempts exhausted");
            return;
        };

        self.inner.stats.lock().unwrap().record_reconnect_attempt();
        self.emit(TransportEvent::Reconnecting {
            attempt,
            delay_ms: delay.as_millis() as u64,
        });
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");

        let transport = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut conn = transport.inner.conn.lock().unwrap();
                if conn.state() != ConnectionState::Reconnecting {
                    return;
                }
                conn.reconnect_due();
            }
            if let Err(e) = transport.open().await {
                tracing::warn!(attempt, "reconnect attempt failed: {e}");
                transport.emit(TransportEvent::Error(e.to_string()));
                transport.schedule_reconnect();
            }
        });
        self.inner.tasks.lock().unwrap().reconnect = Some(handle);
    }
}
