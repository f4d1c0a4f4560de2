//! Reconnect backoff policy

use std::time::Duration;

use backoff::ExponentialBackoff;

/// Capped exponential backoff with an attempt ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect
    pub base_interval: Duration,

    /// Upper bound for any single delay
    pub max_interval: Duration,

    /// Attempts allowed since the last successful open (0 = unlimited)
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(1000),
            max_interval: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Deterministic doubling backoff yielding `min(base * 2^n, max)`
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_interval,
            initial_interval: self.base_interval,
            max_interval: self.max_interval,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None, // the attempt ceiling decides when to stop
            ..Default::default()
        }
    }

    /// True once `attempts` reconnects have already been scheduled
    pub fn should_give_up(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }
}
