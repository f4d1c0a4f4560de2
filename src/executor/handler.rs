//! Task handler trait and the panic-safe invocation bridge

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;

use crate::protocol::{TaskOutcome, TaskRequest};

/// User code that executes tasks
///
/// Implemented for any `Fn(TaskRequest) -> impl Future<Output = anyhow::Result<Value>>`,
/// so an async closure is enough for most workers.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, task: TaskRequest) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> TaskHandler for F
where
    F: Fn(TaskRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn handle(&self, task: TaskRequest) -> anyhow::Result<Value> {
        (self)(task).await
    }
}

/// Run the handler and settle its outcome. Errors and panics both become
/// [`TaskOutcome::Failure`]; nothing escapes to the caller.
pub async fn invoke(handler: &dyn TaskHandler, task: TaskRequest) -> TaskOutcome {
    match AssertUnwindSafe(handler.handle(task)).catch_unwind().await {
        Ok(Ok(value)) => TaskOutcome::Success(value),
        Ok(Err(e)) => TaskOutcome::Failure(e.to_string()),
        Err(panic) => TaskOutcome::Failure(format!("task handler panicked: {}", panic_message(&panic))),
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
