//! Inbound task dispatch
//!
//! Consults the idempotency cache for every delivery, runs the handler in its
//! own task when the key is new, and forwards results to the delivery layer.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handler::{invoke, TaskHandler};
use crate::idempotency::{Admission, IdempotencyCache};
use crate::protocol::{OutboundMessage, TaskRequest, TaskResultMessage, TaskStatusMessage};

/// Slot holding the installed handler, shared with the public client
pub type HandlerSlot = Arc<RwLock<Option<Arc<dyn TaskHandler>>>>;

/// Where outbound messages go; implemented by the session handle
pub trait ResultSink: Clone + Send + Sync + 'static {
    fn deliver(&self, message: OutboundMessage);
}

/// What happened to a delivery
#[derive(Debug)]
pub enum Dispatch {
    /// Handler started; the handle resolves after the result was handed off
    Started(JoinHandle<()>),
    /// Cached outcome replayed
    Replayed,
    /// Same key already running; status reported
    AlreadyRunning,
    /// No handler installed; nothing recorded
    Dropped,
}

/// Routes task requests through the cache to the handler
pub struct TaskDispatcher<S: ResultSink> {
    cache: Arc<IdempotencyCache>,
    handler: HandlerSlot,
    sink: S,
    service_id: Option<String>,
}

impl<S: ResultSink> TaskDispatcher<S> {
    pub fn new(cache: Arc<IdempotencyCache>, handler: HandlerSlot, sink: S) -> Self {
        Self {
            cache,
            handler,
            sink,
            service_id: None,
        }
    }

    /// Service id used when a request does not name one
    pub fn set_service_id(&mut self, service_id: impl Into<String>) {
        self.service_id = Some(service_id.into());
    }

    /// Handle one delivery
    pub fn dispatch(&self, mut task: TaskRequest) -> Dispatch {
        if task.service_id.is_empty() {
            if let Some(id) = &self.service_id {
                task.service_id = id.clone();
            }
        }

        let Some(handler) = self.handler.read().clone() else {
            warn!(task_id = %task.id, idempotency_key = %task.idempotency_key, "No task handler installed, dropping task");
            return Dispatch::Dropped;
        };

        match self.cache.admit(&task.idempotency_key) {
            Admission::Replay(entry) => {
                info!(task_id = %task.id, idempotency_key = %task.idempotency_key, "Replaying cached result");
                self.sink.deliver(OutboundMessage::TaskResult(TaskResultMessage::for_task(
                    &task,
                    &entry.outcome,
                )));
                Dispatch::Replayed
            }
            Admission::InProgress(marker) => {
                debug!(
                    task_id = %task.id,
                    idempotency_key = %task.idempotency_key,
                    started_at = %marker.started_at,
                    "Task already in progress"
                );
                self.sink
                    .deliver(OutboundMessage::TaskStatus(TaskStatusMessage::in_progress(&task)));
                Dispatch::AlreadyRunning
            }
            Admission::Execute => {
                info!(task_id = %task.id, execution_id = %task.execution_id, "Task started");
                let cache = self.cache.clone();
                let sink = self.sink.clone();

                Dispatch::Started(tokio::spawn(async move {
                    let outcome = invoke(handler.as_ref(), task.clone()).await;
                    if outcome.is_success() {
                        info!(task_id = %task.id, "Task completed");
                    } else {
                        warn!(task_id = %task.id, "Task failed");
                    }

                    cache.complete(&task.idempotency_key, outcome.clone());
                    sink.deliver(OutboundMessage::TaskResult(TaskResultMessage::for_task(
                        &task, &outcome,
                    )));
                }))
            }
        }
    }
}
