//! Protocol module for platform communication
//!
//! Defines the message types and serialization for the client-platform
//! session protocol: JSON text frames over WebSocket, plus the raw `ping`
//! heartbeat.

mod messages;

pub use messages::*;
