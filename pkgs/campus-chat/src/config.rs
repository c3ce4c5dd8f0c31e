//! Chat client configuration

use std::time::Duration;

/// Tunables for the chat client
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// How long a typing signal stays valid without a refresh (default: 3s)
    pub typing_ttl: Duration,

    /// Interval between presence heartbeats while the client runs (default: 30s)
    pub heartbeat_interval: Duration,

    /// First delay before reconnecting a lost feed (default: 500ms)
    pub reconnect_base_delay: Duration,

    /// Upper bound for the reconnect backoff (default: 30s)
    pub reconnect_max_delay: Duration,

    /// Buffered updates per UI subscriber (default: 64)
    pub update_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            typing_ttl: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_millis(500),
            reconnect_max_delay: Duration::from_secs(30),
            update_capacity: 64,
        }
    }
}

impl ChatConfig {
    /// Backoff before reconnect attempt `attempt` (0-based), doubling up to the cap
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.reconnect_base_delay
            .saturating_mul(factor)
            .min(self.reconnect_max_delay)
    }
}
