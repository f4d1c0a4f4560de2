//! Session with the platform
//!
//! Provides a durable WebSocket session with:
//! - Automatic reconnection with capped exponential backoff
//! - Heartbeat replies (`ping` → pong envelope, transport pings → pong frames)
//! - Reliable delivery through the outbox (ack tracking, requeue on loss)
//! - Dispatch of inbound task requests to the executor

mod actor;
mod policy;
mod state;

pub use policy::ReconnectPolicy;
pub use state::{ConnectionState, SessionState};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;
use url::Url;

use crate::error::{Error, Result};
use crate::executor::{HandlerSlot, ResultSink, TaskDispatcher};
use crate::idempotency::IdempotencyCache;
use crate::protocol::OutboundMessage;

use actor::{SessionActor, SessionEvent};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Reconnect backoff and ceiling
    pub reconnect: ReconnectPolicy,

    /// Bound on the WebSocket handshake
    pub connect_timeout: Duration,

    /// How long a sent message may stay unacknowledged
    pub ack_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(30),
            ack_timeout: Duration::from_millis(5000),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Session Handle
// ─────────────────────────────────────────────────────────────────

/// Cheap handle for posting commands to the session actor
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Open the session for `service_id`, replacing any current connection
    /// for a different id and resetting the reconnect counter
    pub fn connect(&self, service_id: impl Into<String>) {
        let service_id = service_id.into();
        if self.events.send(SessionEvent::Connect { service_id }).is_err() {
            warn!("Session is closed, connect request ignored");
        }
    }

    /// Queue a message for reliable delivery. Never blocks.
    pub fn send(&self, message: OutboundMessage) {
        if self.events.send(SessionEvent::Send(message)).is_err() {
            warn!("Session is closed, dropping outbound message");
        }
    }

    /// Close the session and wait for the actor to finish
    pub async fn shutdown(&self) {
        let (done, wait) = oneshot::channel();
        if self.events.send(SessionEvent::Shutdown { done }).is_ok() {
            let _ = wait.await;
        }
    }

    /// Ask the actor to stop without waiting
    pub(crate) fn abandon(&self) {
        let (done, _wait) = oneshot::channel();
        let _ = self.events.send(SessionEvent::Shutdown { done });
    }

    /// True once the actor has stopped
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

impl ResultSink for SessionHandle {
    fn deliver(&self, message: OutboundMessage) {
        self.send(message);
    }
}

/// Start a session actor. The returned task finishes after shutdown.
pub fn spawn_session(
    config: SessionConfig,
    api_url: impl Into<String>,
    api_key: impl Into<String>,
    state: Arc<RwLock<SessionState>>,
    cache: Arc<IdempotencyCache>,
    handler: HandlerSlot,
) -> (SessionHandle, JoinHandle<()>) {
    let (events, rx) = mpsc::unbounded_channel();
    let handle = SessionHandle {
        events: events.clone(),
    };

    let dispatcher = TaskDispatcher::new(cache, handler, handle.clone());
    let actor = SessionActor::new(config, api_url.into(), api_key.into(), events, state, dispatcher);

    (handle, tokio::spawn(actor.run(rx)))
}

// ─────────────────────────────────────────────────────────────────
// URL Helpers
// ─────────────────────────────────────────────────────────────────

/// `{api_url with http→ws}/ws?serviceId=..&apiKey=..`
pub fn session_url(api_url: &str, service_id: &str, api_key: &str) -> Result<Url> {
    let mut url = Url::parse(api_url).map_err(|e| {
        Error::config_field_invalid("platform.api_url", format!("Invalid URL '{}': {}", api_url, e))
    })?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::config_field_invalid(
                "platform.api_url",
                format!("Unsupported scheme '{}'. Use http or https", other),
            ))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::config_field_invalid("platform.api_url", "Cannot derive WebSocket scheme"))?;

    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("serviceId", service_id)
        .append_pair("apiKey", api_key);

    Ok(url)
}

/// URL without the query string, safe to log
pub(crate) fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
