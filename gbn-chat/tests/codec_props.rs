//! Property tests for the wire codec and the sender window.

use std::time::{Duration, Instant};

use gbn_chat::gbn_sender::GbnSender;
use gbn_chat::packet::{flags, Packet, HEADER_LEN};
use gbn_chat::ProtocolConfig;
use proptest::prelude::*;

/// Any frame the encoder emits intact: every version and flag combination
/// except a deliberately corrupted DATA frame.
fn intact_frame() -> impl Strategy<Value = Packet> {
    (
        any::<u8>(),
        any::<u8>(),
        any::<u32>(),
        any::<u32>(),
        any::<u16>(),
        proptest::collection::vec(any::<u8>(), 0..512),
    )
        .prop_filter("DATA|TEST_CORRUPT is corrupted on purpose", |(_, f, ..)| {
            f & (flags::DATA | flags::TEST_CORRUPT) != flags::DATA | flags::TEST_CORRUPT
        })
        .prop_map(|(version, f, seq, ack, window, payload)| {
            Packet::new(version, f, seq, ack, window, payload)
        })
}

proptest! {
    #[test]
    fn encoded_frame_decodes_with_valid_checksum(packet in intact_frame()) {
        let wire = packet.encode();
        prop_assert_eq!(wire.len(), HEADER_LEN + packet.payload.len());

        let decoded = Packet::decode(&wire).expect("decode");
        prop_assert!(decoded.checksum_ok());
        prop_assert_eq!(decoded.header.version, packet.header.version);
        prop_assert_eq!(decoded.header.flags, packet.header.flags);
        prop_assert_eq!(decoded.header.seq, packet.header.seq);
        prop_assert_eq!(decoded.header.ack, packet.header.ack);
        prop_assert_eq!(decoded.header.window, packet.header.window);
        prop_assert_eq!(&decoded.payload, &packet.payload);
    }

    #[test]
    fn any_single_bit_flip_is_detected(packet in intact_frame(), bit in any::<prop::sample::Index>()) {
        let mut wire = packet.encode();
        let bit = bit.index(wire.len() * 8);
        wire[bit / 8] ^= 1 << (bit % 8);

        // Either framing rejects it outright or the checksum does.
        if let Ok(decoded) = Packet::decode(&wire) {
            prop_assert!(!decoded.checksum_ok());
        }
    }

    #[test]
    fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let _ = Packet::decode(&bytes);
    }

    #[test]
    fn sender_window_invariants_hold(acks in proptest::collection::vec((0u32..16, 0u16..8), 0..40)) {
        let now = Instant::now();
        let config = ProtocolConfig::default().with_window_limit(4);
        let mut sender = GbnSender::new(&config);

        for (ack, window) in acks {
            while sender.can_send() {
                sender.try_send(vec![0], now, false).expect("admitted");
            }
            sender.on_ack(ack, window, now);

            prop_assert!(sender.base() <= sender.next_seq());
            prop_assert_eq!(sender.in_flight(), sender.next_seq() - sender.base());
            prop_assert_eq!(sender.outstanding_seqs().next().unwrap_or(sender.base()), sender.base());
            prop_assert_eq!(sender.timer().is_armed(), sender.has_unacked());
        }

        let resent = sender.check_timeout(now + Duration::from_secs(60), config.retransmit_timeout());
        prop_assert_eq!(resent.len() as u32, sender.in_flight());
    }
}
