//! Tunable protocol parameters shared by client and server.

use std::time::Duration;

use crate::packet::PROTOCOL_VERSION;

const DEFAULT_WINDOW: u16 = 5; // frames
const DEFAULT_RETRANSMIT_TIMEOUT: u64 = 4000; // ms
const DEFAULT_POLL_INTERVAL: u64 = 500; // ms

/// Default UDP port of the relay server.
pub const DEFAULT_PORT: u16 = 12000;

#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Version byte written into every outgoing frame.
    version: u8,

    /// Maximum number of unacknowledged frames a sender keeps in flight,
    /// regardless of what the peer advertises.
    window_limit: u16,

    /// Receive capacity advertised in every ACK.
    recv_capacity: u16,

    /// Age of the oldest unacknowledged frame after which the whole window
    /// is retransmitted.
    retransmit_timeout: Duration,

    /// Upper bound on how long the socket receive blocks before the
    /// retransmission timer is polled.
    poll_interval: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            window_limit: DEFAULT_WINDOW,
            recv_capacity: DEFAULT_WINDOW,
            retransmit_timeout: Duration::from_millis(DEFAULT_RETRANSMIT_TIMEOUT),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL),
        }
    }
}

impl ProtocolConfig {
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn with_version(mut self, value: u8) -> Self {
        self.version = value;

        self
    }

    pub fn window_limit(&self) -> u16 {
        self.window_limit
    }

    pub fn with_window_limit(mut self, value: u16) -> Self {
        assert!(value >= 1, "window limit must be at least 1");
        self.window_limit = value;

        self
    }

    pub fn recv_capacity(&self) -> u16 {
        self.recv_capacity
    }

    pub fn with_recv_capacity(mut self, value: u16) -> Self {
        self.recv_capacity = value;

        self
    }

    pub fn retransmit_timeout(&self) -> Duration {
        self.retransmit_timeout
    }

    pub fn with_retransmit_timeout(mut self, value: Duration) -> Self {
        self.retransmit_timeout = value;

        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn with_poll_interval(mut self, value: Duration) -> Self {
        assert!(!value.is_zero(), "poll interval must be non-zero");
        self.poll_interval = value;

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProtocolConfig::default();

        assert_eq!(config.version(), 1);
        assert_eq!(config.window_limit(), 5);
        assert_eq!(config.recv_capacity(), 5);
        assert_eq!(config.retransmit_timeout(), Duration::from_secs(4));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_builder_overrides() {
        let config = ProtocolConfig::default()
            .with_window_limit(8)
            .with_recv_capacity(3)
            .with_retransmit_timeout(Duration::from_millis(200))
            .with_poll_interval(Duration::from_millis(20));

        assert_eq!(config.window_limit(), 8);
        assert_eq!(config.recv_capacity(), 3);
        assert_eq!(config.retransmit_timeout(), Duration::from_millis(200));
        assert_eq!(config.poll_interval(), Duration::from_millis(20));
    }

    #[test]
    #[should_panic]
    fn test_zero_window_rejected() {
        let _ = ProtocolConfig::default().with_window_limit(0);
    }
}
