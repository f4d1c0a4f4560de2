//! Session actor
//!
//! One task owns the socket write half, the outbox and the connection state.
//! The connector, the per-connection reader, ack timers and the reconnect
//! timer are separate tasks that report back through the event channel.
//! Every connection attempt bumps `generation`; events tagged with an older
//! generation are ignored.

use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::{backoff::Backoff, ExponentialBackoff};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::state::{ConnectionState, SessionState};
use super::{redact, session_url, SessionConfig, SessionHandle};
use crate::delivery::Outbox;
use crate::error::Error;
use crate::executor::TaskDispatcher;
use crate::protocol::{InboundMessage, MessageEnvelope, OutboundMessage};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ─────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────

/// Everything the actor reacts to
pub(crate) enum SessionEvent {
    /// Open (or reopen) the session for a registered service
    Connect { service_id: String },

    /// Deliver a message reliably
    Send(OutboundMessage),

    /// Connector finished the handshake
    Opened { generation: u64, stream: WsStream },

    /// Connector failed or timed out
    OpenFailed { generation: u64, error: Error },

    /// Text frame from the reader
    Frame { generation: u64, text: String },

    /// Transport-level ping frame
    TransportPing { generation: u64, payload: Vec<u8> },

    /// Reader saw close, error or end of stream
    Closed { generation: u64, reason: String },

    /// Ack deadline for an envelope passed
    AckTimeout { envelope_id: String },

    /// Backoff delay elapsed
    ReconnectDue { generation: u64 },

    /// Close the session and stop the actor
    Shutdown { done: oneshot::Sender<()> },
}

/// Why `transmit` did not put a message on the wire
enum TransmitError {
    /// The socket write failed; the message goes back to the queue
    Write { message: OutboundMessage, error: Error },

    /// The envelope could not be encoded; resending would fail the same way
    Encode { envelope_id: String, error: Error },
}

impl TransmitError {
    /// The message to requeue and the transport error, or `None` when the
    /// message was dropped
    fn into_retry(self) -> Option<(OutboundMessage, Error)> {
        match self {
            TransmitError::Write { message, error } => Some((message, error)),
            TransmitError::Encode { envelope_id, error } => {
                error!(envelope_id = %envelope_id, error = %error, "Dropping message that cannot be encoded");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────

pub(crate) struct SessionActor {
    config: SessionConfig,
    api_url: String,
    api_key: String,
    events: mpsc::UnboundedSender<SessionEvent>,
    shared: Arc<RwLock<SessionState>>,
    outbox: Outbox,
    dispatcher: TaskDispatcher<SessionHandle>,

    connection: ConnectionState,
    service_id: Option<String>,
    generation: u64,
    attempts: u32,
    backoff: ExponentialBackoff,
    connected_at: Option<Instant>,
    last_error: Option<String>,

    sink: Option<WsSink>,
    reader: Option<JoinHandle<()>>,
    connector: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl SessionActor {
    pub(crate) fn new(
        config: SessionConfig,
        api_url: String,
        api_key: String,
        events: mpsc::UnboundedSender<SessionEvent>,
        shared: Arc<RwLock<SessionState>>,
        dispatcher: TaskDispatcher<SessionHandle>,
    ) -> Self {
        let backoff = config.reconnect.backoff();
        Self {
            config,
            api_url,
            api_key,
            events,
            shared,
            outbox: Outbox::new(),
            dispatcher,
            connection: ConnectionState::Disconnected,
            service_id: None,
            generation: 0,
            attempts: 0,
            backoff,
            connected_at: None,
            last_error: None,
            sink: None,
            reader: None,
            connector: None,
            reconnect_timer: None,
        }
    }

    /// Process events until shutdown
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                SessionEvent::Connect { service_id } => self.on_connect(service_id).await,
                SessionEvent::Send(message) => self.on_send(message).await,
                SessionEvent::Opened { generation, stream } if generation == self.generation => {
                    self.on_opened(stream).await
                }
                SessionEvent::OpenFailed { generation, error } if generation == self.generation => {
                    self.on_open_failed(error)
                }
                SessionEvent::Frame { generation, text } if generation == self.generation => {
                    self.on_frame(text).await
                }
                SessionEvent::TransportPing { generation, payload } if generation == self.generation => {
                    self.on_transport_ping(payload).await
                }
                SessionEvent::Closed { generation, reason } if generation == self.generation => {
                    self.on_transport_lost(reason).await
                }
                SessionEvent::AckTimeout { envelope_id } => self.on_ack_timeout(envelope_id).await,
                SessionEvent::ReconnectDue { generation } if generation == self.generation => {
                    self.reconnect_timer = None;
                    self.start_connecting();
                }
                SessionEvent::Shutdown { done } => {
                    self.shutdown().await;
                    self.publish();
                    let _ = done.send(());
                    break;
                }
                _ => debug!("Ignoring event from a previous connection"),
            }
            self.publish();
        }

        debug!("Session actor terminated");
    }

    // ─── Lifecycle ──────────────────────────────────────────────

    async fn on_connect(&mut self, service_id: String) {
        let same_service = self.service_id.as_deref() == Some(service_id.as_str());
        if same_service
            && matches!(self.connection, ConnectionState::Connected | ConnectionState::Connecting)
        {
            debug!(service_id = %service_id, "Session already open");
            return;
        }

        self.dispatcher.set_service_id(service_id.clone());
        self.service_id = Some(service_id);
        self.attempts = 0;
        self.backoff.reset();
        self.drop_transport(true).await;
        self.start_connecting();
    }

    fn start_connecting(&mut self) {
        let Some(service_id) = self.service_id.clone() else {
            return;
        };

        let url = match session_url(&self.api_url, &service_id, &self.api_key) {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Cannot build session URL");
                self.last_error = Some(e.to_string());
                self.connection = ConnectionState::GivingUp;
                return;
            }
        };

        self.generation += 1;
        self.connection = ConnectionState::Connecting;

        let generation = self.generation;
        let display_url = redact(&url);
        let timeout = self.config.connect_timeout;
        let events = self.events.clone();

        info!(url = %display_url, service_id = %service_id, attempt = self.attempts, "Connecting to platform");

        self.connector = Some(tokio::spawn(async move {
            let event = match tokio::time::timeout(timeout, connect_async(url.as_str())).await {
                Ok(Ok((stream, _response))) => SessionEvent::Opened { generation, stream },
                Ok(Err(e)) => SessionEvent::OpenFailed {
                    generation,
                    error: Error::WebSocket(e),
                },
                Err(_) => SessionEvent::OpenFailed {
                    generation,
                    error: Error::connection_timeout(display_url, timeout.as_secs()),
                },
            };
            let _ = events.send(event);
        }));
    }

    async fn on_opened(&mut self, stream: WsStream) {
        self.connector = None;

        let (sink, source) = stream.split();
        self.sink = Some(sink);
        self.reader = Some(tokio::spawn(read_frames(
            self.generation,
            source,
            self.events.clone(),
        )));

        self.attempts = 0;
        self.backoff.reset();
        self.connection = ConnectionState::Connected;
        self.connected_at = Some(Instant::now());
        self.last_error = None;

        info!(
            service_id = self.service_id.as_deref().unwrap_or_default(),
            queued = self.outbox.queued_len(),
            "Connected to platform"
        );

        self.flush().await;
    }

    fn on_open_failed(&mut self, error: Error) {
        self.connector = None;
        self.last_error = Some(error.to_string());

        if !error.is_retryable() {
            error!(error = %error.format_for_log(), "Cannot open session, not retrying");
            self.connection = ConnectionState::GivingUp;
            return;
        }

        warn!(error = %error.format_for_log(), attempt = self.attempts, "Failed to connect to platform");
        self.connection = ConnectionState::Disconnected;
        self.schedule_reconnect();
    }

    async fn on_transport_lost(&mut self, reason: String) {
        if self.sink.is_none() {
            return;
        }

        warn!(reason = %reason, in_flight = self.outbox.in_flight_len(), "Connection to platform lost");
        self.drop_transport(false).await;
        self.last_error = Some(reason);
        self.connection = ConnectionState::Disconnected;
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        let policy = self.config.reconnect;
        if policy.should_give_up(self.attempts) {
            error!(
                attempts = self.attempts,
                max = policy.max_attempts,
                "Max reconnection attempts reached, giving up"
            );
            self.connection = ConnectionState::GivingUp;
            return;
        }

        let delay = self.backoff.next_backoff().unwrap_or(policy.max_interval);
        self.attempts += 1;

        info!(delay_ms = delay.as_millis() as u64, attempt = self.attempts, "Waiting before reconnection");

        let generation = self.generation;
        let events = self.events.clone();
        if let Some(previous) = self.reconnect_timer.take() {
            previous.abort();
        }
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::ReconnectDue { generation });
        }));
    }

    /// Tear down the current connection attempt or socket. In-flight
    /// messages go back to the queue.
    async fn drop_transport(&mut self, send_close: bool) {
        self.generation += 1;

        for task in [self.reader.take(), self.connector.take(), self.reconnect_timer.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }

        if let Some(mut sink) = self.sink.take() {
            if send_close {
                if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                    debug!("Close handshake timed out");
                }
            }
        }

        let requeued = self.outbox.requeue_in_flight();
        if requeued > 0 {
            debug!(requeued, "Moved in-flight messages back to the queue");
        }
        self.connected_at = None;
    }

    async fn shutdown(&mut self) {
        self.drop_transport(true).await;

        let dropped = self.outbox.clear();
        if dropped > 0 {
            warn!(dropped, "Session closed with undelivered messages");
        }

        self.connection = ConnectionState::Closed;
        info!("Session closed");
    }

    // ─── Delivery ───────────────────────────────────────────────

    async fn on_send(&mut self, message: OutboundMessage) {
        if self.sink.is_none() {
            debug!(kind = message.type_name(), queued = self.outbox.queued_len() + 1, "Not connected, message queued");
            self.outbox.enqueue(message);
            return;
        }

        if let Err(failure) = self.transmit(message).await {
            if let Some((message, error)) = failure.into_retry() {
                self.outbox.enqueue(message);
                self.on_transport_lost(error.to_string()).await;
            }
        }
    }

    /// Drain the queue in FIFO order while the socket is open
    async fn flush(&mut self) {
        while self.sink.is_some() {
            let Some(message) = self.outbox.pop_queued() else {
                break;
            };

            if let Err(failure) = self.transmit(message).await {
                if let Some((message, error)) = failure.into_retry() {
                    self.outbox.push_front(message);
                    self.on_transport_lost(error.to_string()).await;
                    break;
                }
            }
        }
    }

    /// Seal, write and track one message
    async fn transmit(&mut self, message: OutboundMessage) -> std::result::Result<(), TransmitError> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(TransmitError::Write {
                message,
                error: Error::Connection("not connected".to_string()),
            });
        };

        let envelope = self.outbox.seal(message);
        let json = envelope.to_json().map_err(|error| TransmitError::Encode {
            envelope_id: envelope.id.clone(),
            error: Error::Json(error),
        })?;

        if let Err(e) = sink.send(WsMessage::Text(json)).await {
            return Err(TransmitError::Write {
                message: envelope.payload,
                error: Error::WebSocket(e),
            });
        }

        debug!(envelope_id = %envelope.id, kind = envelope.payload.type_name(), "Message sent");
        let timer = arm_ack_timer(&self.events, envelope.id.clone(), self.config.ack_timeout);
        self.outbox.track(envelope, Some(timer));
        Ok(())
    }

    async fn on_ack_timeout(&mut self, envelope_id: String) {
        if !self.outbox.expire(&envelope_id) {
            return;
        }

        debug!(envelope_id = %envelope_id, "Ack timeout, message requeued");
        if self.sink.is_some() {
            self.flush().await;
        }
    }

    // ─── Inbound ────────────────────────────────────────────────

    async fn on_frame(&mut self, text: String) {
        match InboundMessage::parse(&text) {
            Ok(InboundMessage::Ping) => self.write_pong().await,
            Ok(InboundMessage::Ack { id }) => match self.outbox.acknowledge(&id) {
                Some(pending) => debug!(
                    envelope_id = %id,
                    latency_ms = pending.sent_at.elapsed().as_millis() as u64,
                    "Ack received"
                ),
                None => debug!(envelope_id = %id, "Ack for unknown message"),
            },
            Ok(InboundMessage::TaskRequest(task)) => {
                debug!(task_id = %task.id, idempotency_key = %task.idempotency_key, "Task request received");
                self.dispatcher.dispatch(task);
            }
            Err(e) => warn!(error = %e, "Dropping malformed message"),
        }
    }

    async fn write_pong(&mut self) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let Ok(json) = MessageEnvelope::pong().to_json() else {
            return;
        };

        if let Err(e) = sink.send(WsMessage::Text(json)).await {
            self.on_transport_lost(e.to_string()).await;
        }
    }

    async fn on_transport_ping(&mut self, payload: Vec<u8>) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(e) = sink.send(WsMessage::Pong(payload)).await {
            self.on_transport_lost(e.to_string()).await;
        }
    }

    fn publish(&self) {
        let mut state = self.shared.write();
        state.connection_state = self.connection;
        state.service_id = self.service_id.clone();
        state.reconnect_attempts = self.attempts;
        state.connected_at = self.connected_at;
        state.last_error = self.last_error.clone();
        state.delivery = self.outbox.stats();
    }
}

// ─────────────────────────────────────────────────────────────────
// Helper Tasks
// ─────────────────────────────────────────────────────────────────

fn arm_ack_timer(
    events: &mpsc::UnboundedSender<SessionEvent>,
    envelope_id: String,
    timeout: Duration,
) -> AbortHandle {
    let events = events.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = events.send(SessionEvent::AckTimeout { envelope_id });
    })
    .abort_handle()
}

/// Forward frames from one connection until it ends
async fn read_frames(generation: u64, mut source: WsSource, events: mpsc::UnboundedSender<SessionEvent>) {
    let reason = loop {
        let event = match source.next().await {
            Some(Ok(WsMessage::Text(text))) => SessionEvent::Frame { generation, text },
            Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => SessionEvent::Frame { generation, text },
                Err(_) => {
                    warn!("Ignoring non UTF-8 binary frame");
                    continue;
                }
            },
            Some(Ok(WsMessage::Ping(payload))) => SessionEvent::TransportPing { generation, payload },
            Some(Ok(WsMessage::Close(frame))) => {
                break match frame {
                    Some(f) => format!("closed by platform ({}): {}", u16::from(f.code), f.reason),
                    None => "closed by platform".to_string(),
                }
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break e.to_string(),
            None => break "stream ended".to_string(),
        };

        if events.send(event).is_err() {
            return;
        }
    };

    debug!(reason = %reason, "Reader finished");
    let _ = events.send(SessionEvent::Closed { generation, reason });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_failure_is_requeued() {
        let failure = TransmitError::Write {
            message: OutboundMessage::Pong,
            error: Error::Connection("not connected".to_string()),
        };
        let (message, error) = failure.into_retry().unwrap();
        assert_eq!(message.type_name(), "pong");
        assert!(error.to_string().contains("not connected"));
    }

    #[test]
    fn test_encode_failure_is_dropped() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let failure = TransmitError::Encode {
            envelope_id: "message_1_exec-1".to_string(),
            error: Error::Json(json_error),
        };
        assert!(failure.into_retry().is_none());
    }
}
