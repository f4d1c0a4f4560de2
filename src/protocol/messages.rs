//! Protocol message definitions
//!
//! All message types exchanged with the platform over the session socket.
//! Inbound frames are either the literal heartbeat `ping` or JSON objects with
//! a `type` discriminator; outbound frames are always wrapped in a
//! [`MessageEnvelope`] so the platform can acknowledge them by id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Heartbeat frame sent by the platform as raw text
pub const PING_FRAME: &str = "ping";

/// Envelope id used for heartbeat replies; the platform never acks it
pub const PONG_ENVELOPE_ID: &str = "pong";

// ─────────────────────────────────────────────────────────────────
// Inbound Messages (Platform → Client)
// ─────────────────────────────────────────────────────────────────

/// A unit of work pushed by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    /// Task id, unique per delivery
    pub id: String,

    /// Target service; older platforms omit it
    #[serde(default)]
    pub service_id: String,

    /// Orchestration execution this task belongs to
    pub execution_id: String,

    /// Deduplication key, stable across redeliveries
    pub idempotency_key: String,

    /// Opaque task input
    #[serde(default)]
    pub input: Value,
}

/// JSON frames with a `type` discriminator
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum TaggedFrame {
    #[serde(rename = "ACK")]
    Ack { id: String },

    #[serde(rename = "task_request")]
    TaskRequest(TaskRequest),
}

/// All messages the client can receive
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Heartbeat request, answered with a pong envelope
    Ping,

    /// Acknowledgment of a previously sent envelope
    Ack { id: String },

    /// Task to execute
    TaskRequest(TaskRequest),
}

impl InboundMessage {
    /// Parse a text frame received from the platform
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed == PING_FRAME || trimmed == "\"ping\"" {
            return Ok(InboundMessage::Ping);
        }

        let frame: TaggedFrame = serde_json::from_str(trimmed)
            .map_err(|e| Error::malformed(format!("{}: {}", e, truncate(trimmed, 120))))?;

        Ok(match frame {
            TaggedFrame::Ack { id } => InboundMessage::Ack { id },
            TaggedFrame::TaskRequest(task) => InboundMessage::TaskRequest(task),
        })
    }

    /// Get the message type name
    pub fn type_name(&self) -> &'static str {
        match self {
            InboundMessage::Ping => "ping",
            InboundMessage::Ack { .. } => "ACK",
            InboundMessage::TaskRequest(_) => "task_request",
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Outcome
// ─────────────────────────────────────────────────────────────────

/// Settled result of one handler invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success(Value),
    Failure(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }
}

// ─────────────────────────────────────────────────────────────────
// Outbound Messages (Client → Platform)
// ─────────────────────────────────────────────────────────────────

/// Result of a task, success or failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultMessage {
    pub task_id: String,
    pub execution_id: String,
    pub service_id: String,
    pub idempotency_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResultMessage {
    /// Build the result for a delivery from a (possibly cached) outcome
    pub fn for_task(task: &TaskRequest, outcome: &TaskOutcome) -> Self {
        let (result, error) = match outcome {
            TaskOutcome::Success(value) => (Some(value.clone()), None),
            TaskOutcome::Failure(message) => (None, Some(message.clone())),
        };

        Self {
            task_id: task.id.clone(),
            execution_id: task.execution_id.clone(),
            service_id: task.service_id.clone(),
            idempotency_key: task.idempotency_key.clone(),
            result,
            error,
        }
    }
}

/// Progress states reported for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
}

/// Status notification for a duplicate delivery of a running task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusMessage {
    pub task_id: String,
    pub execution_id: String,
    pub service_id: String,
    pub idempotency_key: String,
    pub status: TaskStatus,
}

impl TaskStatusMessage {
    pub fn in_progress(task: &TaskRequest) -> Self {
        Self {
            task_id: task.id.clone(),
            execution_id: task.execution_id.clone(),
            service_id: task.service_id.clone(),
            idempotency_key: task.idempotency_key.clone(),
            status: TaskStatus::InProgress,
        }
    }
}

/// All messages the client can send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    TaskResult(TaskResultMessage),
    TaskStatus(TaskStatusMessage),
    Pong,
}

impl OutboundMessage {
    /// Get the message type name
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::TaskResult(_) => "task_result",
            OutboundMessage::TaskStatus(_) => "task_status",
            OutboundMessage::Pong => "pong",
        }
    }

    /// Execution the message refers to, if any
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            OutboundMessage::TaskResult(m) => Some(&m.execution_id),
            OutboundMessage::TaskStatus(m) => Some(&m.execution_id),
            OutboundMessage::Pong => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Message Envelope
// ─────────────────────────────────────────────────────────────────

/// Wrapper carrying the id the platform acknowledges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// `message_{seq}_{executionId}`, or `pong` for heartbeat replies
    pub id: String,

    /// The actual message payload
    pub payload: OutboundMessage,
}

impl MessageEnvelope {
    /// Create a new message envelope
    pub fn new(id: impl Into<String>, payload: OutboundMessage) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Heartbeat reply
    pub fn pong() -> Self {
        Self::new(PONG_ENVELOPE_ID, OutboundMessage::Pong)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_task() -> TaskRequest {
        TaskRequest {
            id: "t1".into(),
            service_id: "s_abc".into(),
            execution_id: "e1".into(),
            idempotency_key: "k1".into(),
            input: json!({"customerId": "c-42"}),
        }
    }

    #[test]
    fn test_parse_ping() {
        assert_eq!(InboundMessage::parse("ping").unwrap(), InboundMessage::Ping);
        assert_eq!(InboundMessage::parse(" ping\n").unwrap(), InboundMessage::Ping);
    }

    #[test]
    fn test_parse_ack() {
        let msg = InboundMessage::parse(r#"{"type":"ACK","id":"message_3_e1"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Ack { id: "message_3_e1".into() });
        assert_eq!(msg.type_name(), "ACK");
    }

    #[test]
    fn test_parse_task_request() {
        let text = r#"{
            "type": "task_request",
            "id": "t1",
            "serviceId": "s_abc",
            "executionId": "e1",
            "idempotencyKey": "k1",
            "input": {"customerId": "c-42"}
        }"#;

        match InboundMessage::parse(text).unwrap() {
            InboundMessage::TaskRequest(task) => assert_eq!(task, sample_task()),
            other => panic!("Expected TaskRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_task_request_without_service_id() {
        let text = r#"{"type":"task_request","id":"t1","executionId":"e1","idempotencyKey":"k1"}"#;
        match InboundMessage::parse(text).unwrap() {
            InboundMessage::TaskRequest(task) => {
                assert!(task.service_id.is_empty());
                assert_eq!(task.input, Value::Null);
            }
            other => panic!("Expected TaskRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in ["{not json", r#"{"type":"unknown"}"#, r#"{"type":"task_request","id":"t1"}"#, "pong"] {
            let err = InboundMessage::parse(text).unwrap_err();
            assert!(matches!(err, Error::ProtocolMalformed { .. }), "{}", text);
        }
    }

    #[test]
    fn test_task_result_success_wire_format() {
        let msg = OutboundMessage::TaskResult(TaskResultMessage::for_task(
            &sample_task(),
            &TaskOutcome::Success(json!({"ok": true})),
        ));
        let json = serde_json::to_value(MessageEnvelope::new("message_1_e1", msg)).unwrap();

        assert_eq!(
            json,
            json!({
                "id": "message_1_e1",
                "payload": {
                    "type": "task_result",
                    "taskId": "t1",
                    "executionId": "e1",
                    "serviceId": "s_abc",
                    "idempotencyKey": "k1",
                    "result": {"ok": true}
                }
            })
        );
    }

    #[test]
    fn test_task_result_failure_omits_result() {
        let msg = TaskResultMessage::for_task(&sample_task(), &TaskOutcome::Failure("boom".into()));
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["error"], "boom");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_task_status_wire_format() {
        let msg = OutboundMessage::TaskStatus(TaskStatusMessage::in_progress(&sample_task()));
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "task_status");
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["taskId"], "t1");
        assert_eq!(msg.execution_id(), Some("e1"));
    }

    #[test]
    fn test_pong_envelope() {
        let json = MessageEnvelope::pong().to_json().unwrap();
        assert_eq!(json, r#"{"id":"pong","payload":{"type":"pong"}}"#);
        assert_eq!(OutboundMessage::Pong.execution_id(), None);
    }
}
