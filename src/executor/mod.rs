//! Task executor module
//!
//! Handles the task execution lifecycle:
//! - Deduplicating deliveries through the idempotency cache
//! - Running the user handler concurrently, capturing errors and panics
//! - Handing results and status updates to the delivery layer

mod dispatch;
mod handler;

pub use dispatch::{Dispatch, HandlerSlot, ResultSink, TaskDispatcher};
pub use handler::{invoke, TaskHandler};
