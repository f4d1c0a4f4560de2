//! Connection state shared between the session actor and the client

use std::fmt;
use std::time::Instant;

use crate::delivery::DeliveryStats;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected; a reconnect may be scheduled
    #[default]
    Disconnected,
    /// Opening the session socket
    Connecting,
    /// Session open, messages flow
    Connected,
    /// Reconnect ceiling reached; waits for a new registration
    GivingUp,
    /// Closed by the application
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::GivingUp => "giving_up",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published by the actor after every event
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Current connection state
    pub connection_state: ConnectionState,

    /// Service id the session connects with
    pub service_id: Option<String>,

    /// Reconnects scheduled since the last successful open
    pub reconnect_attempts: u32,

    /// When the current connection opened
    pub connected_at: Option<Instant>,

    /// Last transport error or close reason
    pub last_error: Option<String>,

    /// Delivery counters
    pub delivery: DeliveryStats,
}
