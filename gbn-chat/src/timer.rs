//! Poll-driven retransmission timer.
//!
//! Each sender owns exactly one [`RetransmitTimer`].  It tracks the age of
//! the oldest unacknowledged frame, not one deadline per frame.  Nothing
//! fires on its own: the owner asks [`RetransmitTimer::expired`] every time
//! the runtime wakes up (socket receive timeout, periodic tick, test clock),
//! so the worst-case extra latency beyond the timeout is one poll interval.
//!
//! There is no RTT estimation and no back-off; the timeout is a fixed
//! duration taken from [`crate::config::ProtocolConfig`].

use std::time::{Duration, Instant};

/// A single logical timer, armed while frames are in flight.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitTimer {
    /// Instant the timer was last (re)started; `None` while disarmed.
    started_at: Option<Instant>,
}

impl RetransmitTimer {
    /// Construct a disarmed timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the timer at `now`.  Restarting resets the age to
    /// zero rather than extending the previous deadline.
    pub fn arm(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    /// Stop the timer.
    pub fn disarm(&mut self) {
        self.started_at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.started_at.is_some()
    }

    /// Instant of the last (re)start, if armed.
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// `true` when armed and at least `timeout` has elapsed since the last
    /// (re)start.  A `now` earlier than the start counts as zero elapsed.
    pub fn expired(&self, now: Instant, timeout: Duration) -> bool {
        match self.started_at {
            Some(start) => now.saturating_duration_since(start) >= timeout,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(4);

    #[test]
    fn new_timer_is_disarmed() {
        let t = RetransmitTimer::new();
        assert!(!t.is_armed());
        assert!(!t.expired(Instant::now() + TIMEOUT * 10, TIMEOUT));
    }

    #[test]
    fn expires_exactly_at_timeout() {
        let start = Instant::now();
        let mut t = RetransmitTimer::new();
        t.arm(start);

        assert!(!t.expired(start + TIMEOUT - Duration::from_millis(1), TIMEOUT));
        assert!(t.expired(start + TIMEOUT, TIMEOUT));
    }

    #[test]
    fn rearm_restarts_instead_of_extending() {
        let start = Instant::now();
        let mut t = RetransmitTimer::new();
        t.arm(start);
        t.arm(start + Duration::from_secs(3));

        assert!(!t.expired(start + Duration::from_secs(5), TIMEOUT));
        assert!(t.expired(start + Duration::from_secs(7), TIMEOUT));
    }

    #[test]
    fn disarm_stops_expiry() {
        let start = Instant::now();
        let mut t = RetransmitTimer::new();
        t.arm(start);
        t.disarm();
        assert!(!t.expired(start + TIMEOUT * 2, TIMEOUT));
        assert_eq!(t.started_at(), None);
    }

    #[test]
    fn clock_before_start_is_not_expired() {
        let start = Instant::now() + Duration::from_secs(1);
        let mut t = RetransmitTimer::new();
        t.arm(start);
        assert!(!t.expired(Instant::now(), Duration::from_millis(1)));
    }
}
