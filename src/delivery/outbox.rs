//! Outbound queue and in-flight tracking
//!
//! Messages wait in a FIFO queue while the session is down. Once written they
//! move to the in-flight set under a fresh envelope id until the platform acks
//! them. An ack timeout or a lost connection puts them back in the queue, so
//! every message is delivered at least once.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use serde::Serialize;
use tokio::task::AbortHandle;

use crate::protocol::{MessageEnvelope, OutboundMessage};

/// A written message awaiting acknowledgment
#[derive(Debug)]
pub struct PendingMessage {
    pub envelope_id: String,
    pub payload: OutboundMessage,
    pub sent_at: Instant,
    seq: u64,
    ack_timer: Option<AbortHandle>,
}

impl PendingMessage {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.ack_timer.take() {
            timer.abort();
        }
    }
}

/// Point-in-time delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    /// Waiting for a connection
    pub queued: usize,
    /// Written, not yet acknowledged
    pub in_flight: usize,
    /// Envelopes assigned so far
    pub sent_total: u64,
    /// Envelopes acknowledged so far
    pub acked_total: u64,
    /// Messages put back in the queue after a timeout or disconnect
    pub requeued_total: u64,
}

/// Queue plus in-flight set, owned by the session actor
#[derive(Debug, Default)]
pub struct Outbox {
    seq: u64,
    queue: VecDeque<OutboundMessage>,
    in_flight: HashMap<String, PendingMessage>,
    acked_total: u64,
    requeued_total: u64,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the queue tail
    pub fn enqueue(&mut self, message: OutboundMessage) {
        self.queue.push_back(message);
    }

    /// Put a message back at the head, ahead of everything queued
    pub fn push_front(&mut self, message: OutboundMessage) {
        self.queue.push_front(message);
    }

    /// Next message to write, oldest first
    pub fn pop_queued(&mut self) -> Option<OutboundMessage> {
        self.queue.pop_front()
    }

    /// Wrap a message in an envelope with a never-reused id
    pub fn seal(&mut self, message: OutboundMessage) -> MessageEnvelope {
        self.seq += 1;
        let id = format!(
            "message_{}_{}",
            self.seq,
            message.execution_id().unwrap_or("none")
        );
        MessageEnvelope::new(id, message)
    }

    /// Record a written envelope as in flight
    pub fn track(&mut self, envelope: MessageEnvelope, ack_timer: Option<AbortHandle>) {
        let pending = PendingMessage {
            envelope_id: envelope.id.clone(),
            payload: envelope.payload,
            sent_at: Instant::now(),
            seq: self.seq,
            ack_timer,
        };
        self.in_flight.insert(envelope.id, pending);
    }

    /// Remove exactly the acknowledged entry and cancel its timer
    pub fn acknowledge(&mut self, envelope_id: &str) -> Option<PendingMessage> {
        let mut pending = self.in_flight.remove(envelope_id)?;
        pending.cancel_timer();
        self.acked_total += 1;
        Some(pending)
    }

    /// Ack deadline passed: move the message back to the queue tail
    pub fn expire(&mut self, envelope_id: &str) -> bool {
        match self.in_flight.remove(envelope_id) {
            Some(pending) => {
                self.requeued_total += 1;
                self.queue.push_back(pending.payload);
                true
            }
            None => false,
        }
    }

    /// Connection lost: move everything in flight back to the queue tail,
    /// preserving original send order
    pub fn requeue_in_flight(&mut self) -> usize {
        let mut pending: Vec<PendingMessage> = self.in_flight.drain().map(|(_, p)| p).collect();
        pending.sort_by_key(|p| p.seq);

        let count = pending.len();
        for mut p in pending {
            p.cancel_timer();
            self.queue.push_back(p.payload);
        }
        self.requeued_total += count as u64;
        count
    }

    /// Drop everything and cancel all timers. Returns the number of
    /// undelivered messages.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len() + self.in_flight.len();
        for (_, mut p) in self.in_flight.drain() {
            p.cancel_timer();
        }
        self.queue.clear();
        dropped
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    #[cfg(test)]
    fn is_in_flight(&self, envelope_id: &str) -> bool {
        self.in_flight.contains_key(envelope_id)
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            queued: self.queue.len(),
            in_flight: self.in_flight.len(),
            sent_total: self.seq,
            acked_total: self.acked_total,
            requeued_total: self.requeued_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{TaskOutcome, TaskRequest, TaskResultMessage};
    use serde_json::json;

    fn result_for(execution_id: &str) -> OutboundMessage {
        let task = TaskRequest {
            id: format!("task-{}", execution_id),
            service_id: "s_1".into(),
            execution_id: execution_id.into(),
            idempotency_key: format!("key-{}", execution_id),
            input: json!({}),
        };
        OutboundMessage::TaskResult(TaskResultMessage::for_task(&task, &TaskOutcome::Success(json!(1))))
    }

    fn send(outbox: &mut Outbox, message: OutboundMessage) -> String {
        let envelope = outbox.seal(message);
        let id = envelope.id.clone();
        outbox.track(envelope, None);
        id
    }

    #[test]
    fn test_envelope_ids_are_unique_and_formatted() {
        let mut outbox = Outbox::new();
        let a = outbox.seal(result_for("e1"));
        let b = outbox.seal(result_for("e1"));

        assert_eq!(a.id, "message_1_e1");
        assert_eq!(b.id, "message_2_e1");
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut outbox = Outbox::new();
        outbox.enqueue(result_for("e1"));
        outbox.enqueue(result_for("e2"));
        outbox.push_front(result_for("e0"));

        let order: Vec<_> = std::iter::from_fn(|| outbox.pop_queued())
            .map(|m| m.execution_id().unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["e0", "e1", "e2"]);
    }

    #[test]
    fn test_ack_removes_exactly_that_entry() {
        let mut outbox = Outbox::new();
        let first = send(&mut outbox, result_for("e1"));
        let second = send(&mut outbox, result_for("e2"));

        assert!(outbox.acknowledge(&first).is_some());
        assert!(!outbox.is_in_flight(&first));
        assert!(outbox.is_in_flight(&second));
        assert_eq!(outbox.in_flight_len(), 1);

        assert!(outbox.acknowledge(&first).is_none());
        assert!(outbox.acknowledge("message_99_unknown").is_none());
    }

    #[tokio::test]
    async fn test_ack_cancels_timer() {
        let mut outbox = Outbox::new();
        let timer = tokio::spawn(std::future::pending::<()>());
        let handle = timer.abort_handle();

        let envelope = outbox.seal(result_for("e1"));
        let id = envelope.id.clone();
        outbox.track(envelope, Some(handle));
        outbox.acknowledge(&id);

        assert!(timer.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_expire_requeues_at_tail_and_resend_gets_new_id() {
        let mut outbox = Outbox::new();
        let id = send(&mut outbox, result_for("e1"));
        outbox.enqueue(result_for("e2"));

        assert!(outbox.expire(&id));
        assert!(!outbox.expire(&id));
        assert_eq!(outbox.in_flight_len(), 0);

        assert_eq!(outbox.pop_queued().unwrap().execution_id(), Some("e2"));
        let again = outbox.pop_queued().unwrap();
        assert_eq!(again.execution_id(), Some("e1"));

        let resent = send(&mut outbox, again);
        assert_ne!(resent, id);
        assert_eq!(outbox.stats().requeued_total, 1);
    }

    #[test]
    fn test_requeue_in_flight_preserves_send_order() {
        let mut outbox = Outbox::new();
        for exec in ["e1", "e2", "e3"] {
            send(&mut outbox, result_for(exec));
        }

        assert_eq!(outbox.requeue_in_flight(), 3);
        assert_eq!(outbox.in_flight_len(), 0);

        let order: Vec<_> = std::iter::from_fn(|| outbox.pop_queued())
            .map(|m| m.execution_id().unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn test_stats_and_clear() {
        let mut outbox = Outbox::new();
        let id = send(&mut outbox, result_for("e1"));
        send(&mut outbox, result_for("e2"));
        outbox.enqueue(result_for("e3"));
        outbox.acknowledge(&id);

        let stats = outbox.stats();
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.sent_total, 2);
        assert_eq!(stats.acked_total, 1);

        assert_eq!(outbox.clear(), 2);
        assert_eq!(outbox.stats().queued, 0);
        assert_eq!(outbox.stats().in_flight, 0);
    }
}
