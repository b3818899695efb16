//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] maintains a sliding window of in-flight frames.  Sequence
//! numbers count frames, not bytes: the first frame is `1` and each accepted
//! send takes the next integer.
//!
//! # Protocol contract
//!
//! - At most `min(window_limit, peer_window)` frames may be in flight.
//! - ACKs are **cumulative**: `ack = K` means the receiver has accepted every
//!   frame up to and including `K`.
//! - On timeout the caller retransmits **all** unacked frames from `base`
//!   onwards (go back to N), in ascending order.
//!
//! This module only manages state; the datagrams it returns are the
//! caller's to put on the wire.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::ProtocolConfig;
use crate::packet::{flags, Packet, MAX_PAYLOAD};
use crate::state::SenderState;
use crate::timer::RetransmitTimer;

/// A new frame accepted into the window, ready for its first transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    /// Sequence number assigned to the frame.
    pub seq: u32,
    /// Encoded datagram to send now.  When corruption was requested this
    /// differs from the clean copy kept for retransmission.
    pub datagram: Vec<u8>,
}

/// Why [`GbnSender::try_send`] refused a payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The effective window is exhausted; retry after an ACK arrives.
    #[error("send window full ({in_flight} of {window} frames unacknowledged)")]
    WindowFull { in_flight: u32, window: u16 },
    /// The payload would not fit in a single datagram.
    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },
}

// ---------------------------------------------------------------------------
// GbnSender
// ---------------------------------------------------------------------------

/// Go-Back-N send-side state for one direction.
///
/// # Sequence-number layout
///
/// ```text
///    base               next
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space
///      │ <── in flight ──▶│ <── sendable ───▶
/// ```
///
/// `outstanding` holds exactly the keys in `[base, next)` and the timer is
/// armed iff `outstanding` is non-empty.
#[derive(Debug)]
pub struct GbnSender {
    /// Oldest unacknowledged sequence number (left window edge).
    base: u32,

    /// Sequence number for the next new frame.
    next: u32,

    /// Local cap on frames in flight.
    window_limit: u16,

    /// Capacity last advertised by the peer.
    peer_window: u16,

    /// Receive capacity written into outgoing data frames.
    advertise: u16,

    version: u8,

    /// Clean encoded frames awaiting acknowledgement, keyed by sequence.
    outstanding: BTreeMap<u32, Vec<u8>>,

    timer: RetransmitTimer,
}

impl GbnSender {
    /// Create an idle sender whose first frame will carry sequence `1`.
    ///
    /// Until the peer's first ACK arrives, its window is assumed to equal
    /// the local window limit.
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            base: 1,
            next: 1,
            window_limit: config.window_limit(),
            peer_window: config.window_limit(),
            advertise: config.recv_capacity(),
            version: config.version(),
            outstanding: BTreeMap::new(),
            timer: RetransmitTimer::new(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_seq(&self) -> u32 {
        self.next
    }

    pub fn peer_window(&self) -> u16 {
        self.peer_window
    }

    /// `min(window_limit, peer_window)`.
    pub fn effective_window(&self) -> u16 {
        self.window_limit.min(self.peer_window)
    }

    /// Number of frames currently awaiting acknowledgement.
    pub fn in_flight(&self) -> u32 {
        self.next - self.base
    }

    /// `true` when there is room for at least one more in-flight frame.
    pub fn can_send(&self) -> bool {
        self.in_flight() < u32::from(self.effective_window())
    }

    /// `true` when at least one frame is awaiting acknowledgement.
    pub fn has_unacked(&self) -> bool {
        !self.outstanding.is_empty()
    }

    /// Sequence numbers awaiting acknowledgement, oldest first.
    pub fn outstanding_seqs(&self) -> impl Iterator<Item = u32> + '_ {
        self.outstanding.keys().copied()
    }

    pub fn timer(&self) -> &RetransmitTimer {
        &self.timer
    }

    pub fn state(&self) -> SenderState {
        if self.timer.is_armed() {
            SenderState::Armed
        } else {
            SenderState::Idle
        }
    }

    /// Admit `payload` into the window as a new DATA frame.
    ///
    /// On success the frame is stored for retransmission, `next` advances,
    /// and the timer is armed at `now` if the window was empty.  With
    /// `corrupt` set, the returned datagram is encoded with
    /// [`flags::TEST_CORRUPT`] while the stored copy stays clean, so the
    /// first timeout heals it.
    pub fn try_send(
        &mut self,
        payload: Vec<u8>,
        now: Instant,
        corrupt: bool,
    ) -> Result<Transmit, SendError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(SendError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        if !self.can_send() {
            return Err(SendError::WindowFull {
                in_flight: self.in_flight(),
                window: self.effective_window(),
            });
        }

        let seq = self.next;
        let mut packet = Packet::new(self.version, flags::DATA, seq, 0, self.advertise, payload);
        let clean = packet.encode();
        let datagram = if corrupt {
            packet.header.flags |= flags::TEST_CORRUPT;
            packet.encode()
        } else {
            clean.clone()
        };

        let was_empty = self.base == self.next;
        self.outstanding.insert(seq, clean);
        self.next += 1;
        if was_empty {
            self.timer.arm(now);
        }

        log::debug!(
            "[gbn] → DATA seq={} len={} in_flight={}{}",
            seq,
            packet.payload.len(),
            self.in_flight(),
            if corrupt { " (corrupted)" } else { "" }
        );
        Ok(Transmit { seq, datagram })
    }

    /// Process a cumulative ACK carrying the peer's advertised `window`.
    ///
    /// The advertised window is always recorded.  An ACK older than
    /// `base - 1` is stale, and an ACK at or beyond `next` names a frame
    /// never sent; both leave the window untouched.  Otherwise `base` moves
    /// to `ack + 1`, acknowledged frames are dropped, and the timer is
    /// disarmed (window empty) or restarted at `now`.
    ///
    /// Returns the number of newly acknowledged frames.
    pub fn on_ack(&mut self, ack: u32, window: u16, now: Instant) -> usize {
        self.peer_window = window;

        if ack < self.base - 1 {
            log::debug!("[gbn] ← stale ACK ack={} base={}", ack, self.base);
            return 0;
        }
        if ack >= self.next {
            log::debug!("[gbn] ← ACK ack={} beyond next={}; ignored", ack, self.next);
            return 0;
        }

        let before = self.outstanding.len();
        self.base = ack + 1;
        self.outstanding = self.outstanding.split_off(&self.base);
        let acked = before - self.outstanding.len();

        if self.outstanding.is_empty() {
            self.timer.disarm();
        } else {
            self.timer.arm(now);
        }

        log::debug!(
            "[gbn] ← ACK ack={} win={} slid={} in_flight={}",
            ack,
            window,
            acked,
            self.in_flight()
        );
        acked
    }

    /// Poll the retransmission timer.
    ///
    /// When it has been running for at least `timeout`, returns every
    /// outstanding frame in ascending sequence order and restarts the timer
    /// at `now`.  A timer found running over an empty window is disarmed.
    pub fn check_timeout(&mut self, now: Instant, timeout: Duration) -> Vec<Vec<u8>> {
        if !self.timer.expired(now, timeout) {
            return Vec::new();
        }
        if self.outstanding.is_empty() {
            self.timer.disarm();
            return Vec::new();
        }

        log::debug!(
            "[gbn] timeout, retransmitting seq {}..{}",
            self.base,
            self.next - 1
        );
        self.timer.arm(now);
        self.outstanding.values().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
