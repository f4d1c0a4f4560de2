//! Reliable delivery layer
//!
//! Envelope ids, the outbound FIFO queue and ack tracking. The session actor
//! owns the [`Outbox`] and arms the ack timers; this module holds no I/O.

mod outbox;

pub use outbox::{DeliveryStats, Outbox, PendingMessage};
