//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] implements the receiver side of Go-Back-N:
//!
//! - Only **in-order**, checksum-valid DATA frames are accepted
//!   (`seq == expected`).
//! - Corrupted, out-of-order, and duplicate frames are **discarded**, never
//!   buffered.
//! - Every frame, accepted or not, is answered with a **cumulative ACK**
//!   naming the last frame of the contiguous prefix.  A rejected frame
//!   therefore produces a duplicate ACK, and the gap is healed only by the
//!   sender's full-window retransmission.
//!
//! This module only manages state; the caller encodes and sends the ACK.

use crate::packet::Packet;

/// Outcome of [`GbnReceiver::accept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// In-order frame: hand `payload` to the application and send `ack`.
    Delivered { payload: Vec<u8>, ack: Packet },
    /// Frame discarded: send the duplicate `ack`.
    Rejected { reason: RejectReason, ack: Packet },
}

impl Delivery {
    /// The ACK frame to send back, whichever way the frame went.
    pub fn ack(&self) -> &Packet {
        match self {
            Self::Delivered { ack, .. } | Self::Rejected { ack, .. } => ack,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Corrupt,
    NotData,
    /// `seq < expected`.
    Duplicate,
    /// `seq > expected`.
    OutOfOrder,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Corrupt => "checksum mismatch",
            Self::NotData => "not a data frame",
            Self::Duplicate => "duplicate",
            Self::OutOfOrder => "out of order",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// GbnReceiver
// ---------------------------------------------------------------------------

/// Go-Back-N receive-side state for one inbound direction.
#[derive(Debug)]
pub struct GbnReceiver {
    /// Next sequence number that will be accepted.  The last cumulative ACK
    /// is always `expected - 1`, so it is derived rather than stored.
    expected: u32,

    version: u8,
}

impl GbnReceiver {
    /// Create a receiver expecting sequence `1`; its cumulative ACK is `0`.
    pub fn new(version: u8) -> Self {
        Self {
            expected: 1,
            version,
        }
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Cumulative ACK number: every frame up to and including this one has
    /// been delivered in order.
    pub fn last_cumulative_ack(&self) -> u32 {
        self.expected - 1
    }

    /// Process an inbound frame, advertising `capacity` in the ACK.
    pub fn accept(&mut self, packet: Packet, capacity: u16) -> Delivery {
        let verdict = if !packet.checksum_ok() {
            Err(RejectReason::Corrupt)
        } else if !packet.is_data() {
            Err(RejectReason::NotData)
        } else if packet.header.seq < self.expected {
            Err(RejectReason::Duplicate)
        } else if packet.header.seq > self.expected {
            Err(RejectReason::OutOfOrder)
        } else {
            Ok(())
        };

        match verdict {
            Ok(()) => {
                self.expected += 1;
                log::debug!(
                    "[gbn] ← DATA seq={} len={} accepted; → ACK ack={}",
                    packet.header.seq,
                    packet.payload.len(),
                    self.last_cumulative_ack()
                );
                Delivery::Delivered {
                    ack: self.make_ack(capacity),
                    payload: packet.payload,
                }
            }
            Err(reason) => {
                log::debug!(
                    "[gbn] ← DATA seq={} rejected ({}); → dup ACK ack={}",
                    packet.header.seq,
                    reason,
                    self.last_cumulative_ack()
                );
                Delivery::Rejected {
                    reason,
                    ack: self.make_ack(capacity),
                }
            }
        }
    }

    /// Pure ACK carrying the current cumulative ACK number.
    pub fn make_ack(&self, capacity: u16) -> Packet {
        Packet::ack(self.version, self.last_cumulative_ack(), capacity)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{flags, PROTOCOL_VERSION};

    const CAPACITY: u16 = 5;

    /// Helper: a data frame as it would look after a clean trip over the wire.
    fn wire_data(seq: u32, payload: &[u8]) -> Packet {
        let pkt = Packet::new(PROTOCOL_VERSION, flags::DATA, seq, 0, CAPACITY, payload.to_vec());
        Packet::decode(&pkt.encode()).unwrap()
    }

    /// Helper: drive the receiver until `expected == target`.
    fn receiver_expecting(target: u32) -> GbnReceiver {
        let mut r = GbnReceiver::new(PROTOCOL_VERSION);
        for seq in 1..target {
            r.accept(wire_data(seq, b"x"), CAPACITY);
        }
        assert_eq!(r.expected(), target);
        r
    }

    #[test]
    fn initial_state() {
        let r = GbnReceiver::new(PROTOCOL_VERSION);
        assert_eq!(r.expected(), 1);
        assert_eq!(r.last_cumulative_ack(), 0);
    }

    #[test]
    fn in_order_frame_delivered() {
        let mut r = GbnReceiver::new(PROTOCOL_VERSION);
        match r.accept(wire_data(1, b"hello"), CAPACITY) {
            Delivery::Delivered { payload, ack } => {
                assert_eq!(payload, b"hello");
                assert!(ack.is_pure_ack());
                assert_eq!(ack.header.ack, 1);
                assert_eq!(ack.header.window, CAPACITY);
            }
            other => panic!("expected delivery, got {other:?}"),
        }
        assert_eq!(r.expected(), 2);
        assert_eq!(r.last_cumulative_ack(), 1);
    }

    #[test]
    fn duplicate_frame_gets_duplicate_ack() {
        let mut r = receiver_expecting(5);
        let d = r.accept(wire_data(4, b"old"), CAPACITY);
        assert!(matches!(
            d,
            Delivery::Rejected { reason: RejectReason::Duplicate, .. }
        ));
        assert_eq!(d.ack().header.ack, 4);
        assert_eq!(r.expected(), 5);
    }

    #[test]
    fn future_frame_gets_duplicate_ack() {
        let mut r = receiver_expecting(5);
        let d = r.accept(wire_data(6, b"future"), CAPACITY);
        assert!(matches!(
            d,
            Delivery::Rejected { reason: RejectReason::OutOfOrder, .. }
        ));
        assert_eq!(d.ack().header.ack, 4);
        assert_eq!(r.expected(), 5);
    }

    #[test]
    fn corrupt_frame_rejected_even_in_order() {
        let mut r = GbnReceiver::new(PROTOCOL_VERSION);
        let pkt = Packet::new(1, flags::DATA | flags::TEST_CORRUPT, 1, 0, 5, b"bad".to_vec());
        let d = r.accept(Packet::decode(&pkt.encode()).unwrap(), CAPACITY);

        assert!(matches!(
            d,
            Delivery::Rejected { reason: RejectReason::Corrupt, .. }
        ));
        assert_eq!(d.ack().header.ack, 0);
        assert_eq!(r.expected(), 1);
    }

    #[test]
    fn frame_without_data_flag_rejected() {
        let mut r = GbnReceiver::new(PROTOCOL_VERSION);
        let pkt = Packet::new(1, flags::ACK, 1, 0, 5, b"x".to_vec());
        let d = r.accept(Packet::decode(&pkt.encode()).unwrap(), CAPACITY);
        assert!(matches!(
            d,
            Delivery::Rejected { reason: RejectReason::NotData, .. }
        ));
        assert_eq!(r.expected(), 1);
    }

    #[test]
    fn gap_healed_by_retransmission() {
        let mut r = GbnReceiver::new(PROTOCOL_VERSION);
        assert!(matches!(r.accept(wire_data(1, b"a"), CAPACITY), Delivery::Delivered { .. }));
        // Frame 2 lost; 3 and 4 are discarded.
        assert!(matches!(r.accept(wire_data(3, b"c"), CAPACITY), Delivery::Rejected { .. }));
        assert!(matches!(r.accept(wire_data(4, b"d"), CAPACITY), Delivery::Rejected { .. }));
        // Go-back-N: sender resends 2, 3, 4.
        for (seq, body) in [(2, b"b"), (3, b"c"), (4, b"d")] {
            match r.accept(wire_data(seq, body), CAPACITY) {
                Delivery::Delivered { payload, .. } => assert_eq!(payload, body),
                other => panic!("seq {seq} not delivered: {other:?}"),
            }
        }
        assert_eq!(r.last_cumulative_ack(), 4);
    }
}
