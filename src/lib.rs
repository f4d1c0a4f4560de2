//! Orra SDK
//!
//! Client runtime for workers (services and agents) of the Orra platform:
//! - Registration with identity persistence
//! - A durable WebSocket session with capped exponential reconnect backoff
//! - Acknowledged, at-least-once delivery of results
//! - Idempotent task execution keyed by the platform's idempotency key

pub mod client;
pub mod config;
pub mod delivery;
pub mod error;
pub mod executor;
pub mod idempotency;
pub mod logging;
pub mod protocol;
pub mod registration;
pub mod session;
pub mod version;

pub use client::{ClientOptions, OrraClient, Persistence};
pub use delivery::DeliveryStats;
pub use error::{Error, ErrorCode, Result};
pub use executor::TaskHandler;
pub use protocol::{TaskOutcome, TaskRequest};
pub use registration::{
    CallbackIdentityStore, FileIdentityStore, IdentityStore, RegistrationOptions, ServiceIdentity,
    ServiceKind,
};
pub use session::ConnectionState;
