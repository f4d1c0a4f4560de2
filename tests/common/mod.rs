//! Common test utilities and fixtures
//!
//! [`MockPlatform`] serves the registration endpoint and the WebSocket
//! session on one local port and records everything the client sends.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const API_KEY: &str = "sk-orra-test";

const WAIT: Duration = Duration::from_secs(5);

/// How the mock answers POST /register/{kind}
#[derive(Debug, Clone)]
pub enum RegisterBehavior {
    /// Echo the submitted id or assign a fresh one
    Assign,
    /// 200 without an id field
    MissingId,
    /// Non-2xx with a plain body
    Fail(u16, String),
    /// Raw status and body, sent as-is
    Reply(u16, String),
}

/// One recorded registration request
#[derive(Debug, Clone)]
pub struct RegistrationRecord {
    pub kind: String,
    pub authorization: Option<String>,
    pub body: Value,
}

enum Control {
    Send(String),
    Drop,
}

struct Shared {
    register_behavior: Mutex<RegisterBehavior>,
    registrations: Mutex<Vec<RegistrationRecord>>,
    session_queries: Mutex<Vec<HashMap<String, String>>>,
    reject_sessions: AtomicBool,
    auto_ack: AtomicBool,
    connections: AtomicUsize,
    assigned: AtomicUsize,
    control: Mutex<Option<mpsc::UnboundedSender<Control>>>,
    inbound: mpsc::UnboundedSender<String>,
}

pub struct MockPlatform {
    addr: SocketAddr,
    shared: Arc<Shared>,
    inbound: mpsc::UnboundedReceiver<String>,
    server: JoinHandle<()>,
}

impl MockPlatform {
    pub async fn start() -> Self {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            register_behavior: Mutex::new(RegisterBehavior::Assign),
            registrations: Mutex::new(Vec::new()),
            session_queries: Mutex::new(Vec::new()),
            reject_sessions: AtomicBool::new(false),
            auto_ack: AtomicBool::new(true),
            connections: AtomicUsize::new(0),
            assigned: AtomicUsize::new(0),
            control: Mutex::new(None),
            inbound: inbound_tx,
        });

        let app = Router::new()
            .route("/register/:kind", post(register))
            .route("/ws", get(session))
            .with_state(shared.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            shared,
            inbound,
            server,
        }
    }

    /// HTTP base URL to hand to the client
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_register_behavior(&self, behavior: RegisterBehavior) {
        *self.shared.register_behavior.lock() = behavior;
    }

    /// Answer WebSocket upgrades with 503
    pub fn set_reject_sessions(&self, reject: bool) {
        self.shared.reject_sessions.store(reject, Ordering::SeqCst);
    }

    /// Acknowledge every enveloped message automatically
    pub fn set_auto_ack(&self, enabled: bool) {
        self.shared.auto_ack.store(enabled, Ordering::SeqCst);
    }

    pub fn registrations(&self) -> Vec<RegistrationRecord> {
        self.shared.registrations.lock().clone()
    }

    pub fn session_queries(&self) -> Vec<HashMap<String, String>> {
        self.shared.session_queries.lock().clone()
    }

    /// WebSocket sessions accepted so far
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub async fn wait_for_connections(&self, n: usize) {
        let reached = wait_until(|| self.connections() >= n).await;
        assert!(reached, "expected {} session(s), saw {}", n, self.connections());
    }

    /// Send a text frame on the newest session
    pub async fn send_text(&self, text: impl Into<String>) {
        let text = text.into();
        let sender = self.shared.control.lock().clone();
        let sender = sender.expect("no session to send on");
        sender.send(Control::Send(text)).expect("session ended");
    }

    pub async fn send_json(&self, value: Value) {
        self.send_text(value.to_string()).await;
    }

    /// Send a task request frame
    pub async fn send_task(&self, id: &str, execution_id: &str, idempotency_key: &str, input: Value) {
        self.send_json(json!({
            "type": "task_request",
            "id": id,
            "executionId": execution_id,
            "idempotencyKey": idempotency_key,
            "input": input,
        }))
        .await;
    }

    pub async fn ack(&self, envelope_id: &str) {
        self.send_json(json!({"type": "ACK", "id": envelope_id})).await;
    }

    /// Cut the newest session without a close handshake
    pub fn drop_connection(&self) {
        if let Some(sender) = self.shared.control.lock().take() {
            let _ = sender.send(Control::Drop);
        }
    }

    /// Next raw text frame from the client
    pub async fn next_text(&mut self) -> String {
        tokio::time::timeout(WAIT, self.inbound.recv())
            .await
            .expect("timed out waiting for a frame from the client")
            .expect("mock platform stopped")
    }

    /// Next enveloped frame whose payload type is `kind`
    pub async fn next_of_type(&mut self, kind: &str) -> Value {
        loop {
            let text = self.next_text().await;
            let Ok(value) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            if value["payload"]["type"] == kind {
                return value;
            }
        }
    }

    /// Frames received so far without waiting
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(text) = self.inbound.try_recv() {
            frames.push(text);
        }
        frames
    }
}

impl Drop for MockPlatform {
    fn drop(&mut self) {
        self.drop_connection();
        self.server.abort();
    }
}

/// Poll `condition` until it holds or the wait budget runs out
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Run `future` with the shared wait budget
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(WAIT, future).await.expect("timed out")
}

async fn register(
    State(shared): State<Arc<Shared>>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    shared.registrations.lock().push(RegistrationRecord {
        kind,
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    let behavior = shared.register_behavior.lock().clone();
    match behavior {
        RegisterBehavior::Assign => {
            let id = match body["id"].as_str() {
                Some(id) => id.to_string(),
                None => format!("svc_{}", shared.assigned.fetch_add(1, Ordering::SeqCst) + 1),
            };
            Json(json!({"id": id, "version": 1})).into_response()
        }
        RegisterBehavior::MissingId => Json(json!({"version": 1})).into_response(),
        RegisterBehavior::Fail(status, text) | RegisterBehavior::Reply(status, text) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, text).into_response()
        }
    }
}

async fn session(
    State(shared): State<Arc<Shared>>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    if shared.reject_sessions.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    shared.session_queries.lock().push(query);
    ws.on_upgrade(move |socket| serve_session(shared, socket))
}

async fn serve_session(shared: Arc<Shared>, mut socket: WebSocket) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    *shared.control.lock() = Some(tx);
    shared.connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            control = rx.recv() => match control {
                Some(Control::Send(text)) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Control::Drop) | None => break,
            },
            frame = socket.recv() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if shared.auto_ack.load(Ordering::SeqCst) {
                        if let Some(id) = ack_target(&text) {
                            let ack = json!({"type": "ACK", "id": id}).to_string();
                            let _ = socket.send(Message::Text(ack)).await;
                        }
                    }
                    let _ = shared.inbound.send(text);
                }
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}

/// Envelope id to acknowledge, if the frame carries one other than pong
fn ack_target(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    let id = value["id"].as_str()?;
    (id != "pong").then(|| id.to_string())
}
