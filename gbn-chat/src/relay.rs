//! Server-side relay: one Go-Back-N receiver per client, plus an outbound
//! Go-Back-N sender toward each client that has been chosen as a forwarding
//! destination.
//!
//! # Routing an inbound datagram
//!
//! 1. Malformed datagrams are dropped before the source becomes known.
//! 2. A pure ACK goes to the outbound sender *toward the source*.
//! 3. Anything else runs through the source's receiver, and the resulting
//!    (possibly duplicate) ACK goes back to the source.
//! 4. The first payload delivered from a source is its display name.
//! 5. Later payloads are prefixed with the name and pushed into the outbound
//!    sender of the first other known peer, which numbers them in its own
//!    sequence space.  With no other peer the source gets a notice instead.
//!
//! # Locking
//!
//! Each peer lives behind its own mutex, and the address table has another.
//! At most one peer lock is held at a time, and the table lock is never held
//! while a peer is locked, so processing one peer never blocks on another.
//!
//! Peers are never evicted; `last_seen` is kept for diagnostics only.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::ProtocolConfig;
use crate::fault::FaultInjection;
use crate::gbn_receiver::{Delivery, GbnReceiver};
use crate::gbn_sender::GbnSender;
use crate::packet::{flags, Packet};
use crate::sync::lock;

/// Separator between the sender's display name and the relayed text.
pub const NAME_SEPARATOR: &str = ": ";

const NO_PEER_NOTICE: &str = "no other peer is connected";
const BUSY_NOTICE: &str = "destination window full, message not relayed";

/// A datagram the server must send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub dest: SocketAddr,
    pub datagram: Vec<u8>,
}

/// Protocol state the server holds for one client address.
#[derive(Debug)]
pub struct PeerSession {
    receiver: GbnReceiver,
    /// Created the first time this peer is a relay destination.
    outbound: Option<GbnSender>,
    name: Option<String>,
    last_seen: Instant,
}

impl PeerSession {
    fn new(version: u8, now: Instant) -> Self {
        Self {
            receiver: GbnReceiver::new(version),
            outbound: None,
            name: None,
            last_seen: now,
        }
    }
}

/// Diagnostic snapshot of one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub addr: SocketAddr,
    pub name: Option<String>,
    pub last_seen: Instant,
    /// Next sequence number expected from the peer.
    pub expected: u32,
    /// Relayed frames awaiting the peer's acknowledgement.
    pub in_flight: u32,
}

#[derive(Debug, Default)]
struct PeerTable {
    /// Addresses in the order they were first seen.
    order: Vec<SocketAddr>,
    sessions: HashMap<SocketAddr, Arc<Mutex<PeerSession>>>,
}

#[derive(Debug)]
pub struct RelayRouter {
    config: ProtocolConfig,
    faults: Mutex<FaultInjection>,
    peers: Mutex<PeerTable>,
}

impl RelayRouter {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            faults: Mutex::new(FaultInjection::default()),
            peers: Mutex::new(PeerTable::default()),
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn faults(&self) -> FaultInjection {
        *lock(&self.faults)
    }

    pub fn set_faults(&self, faults: FaultInjection) {
        *lock(&self.faults) = faults;
    }

    /// Process one datagram from `from`, returning what must be sent.
    pub fn on_datagram(&self, from: SocketAddr, datagram: &[u8], now: Instant) -> Vec<Outgoing> {
        let mut out = Vec::new();

        let packet = match Packet::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("[relay] dropping malformed datagram from {from}: {e}");
                return out;
            }
        };

        let faults = self.faults();
        let source = self.session(from, now);
        let mut peer = lock(&source);
        peer.last_seen = now;

        if packet.is_pure_ack() {
            if !packet.checksum_ok() {
                log::debug!("[relay] dropping corrupted ACK from {from}");
            } else if faults.drop_incoming_acks {
                log::info!("[test] ACK={} from {from} ignored (drop acks)", packet.header.ack);
            } else if let Some(outbound) = peer.outbound.as_mut() {
                outbound.on_ack(packet.header.ack, packet.header.window, now);
            } else {
                log::debug!("[relay] ACK from {from} with nothing relayed to it");
            }
            return out;
        }

        if faults.drop_incoming_data && packet.is_data() {
            log::info!("[test] DATA seq={} from {from} discarded (drop data)", packet.header.seq);
            return out;
        }

        let payload = match peer.receiver.accept(packet, self.config.recv_capacity()) {
            Delivery::Rejected { ack, .. } => {
                out.push(Outgoing {
                    dest: from,
                    datagram: ack.encode(),
                });
                return out;
            }
            Delivery::Delivered { payload, ack } => {
                out.push(Outgoing {
                    dest: from,
                    datagram: ack.encode(),
                });
                payload
            }
        };

        let text = String::from_utf8_lossy(&payload);
        let name = match peer.name.clone() {
            Some(name) => name,
            None => {
                let name = text.trim().to_string();
                log::info!("[relay] {from} is now known as {name:?}");
                peer.name = Some(name);
                return out;
            }
        };
        let source_ack = peer.receiver.last_cumulative_ack();
        drop(peer);

        let Some((dest, dest_session)) = self.destination_for(from) else {
            log::info!("[relay] {name}: no destination for message");
            out.push(self.notice(from, source_ack, NO_PEER_NOTICE));
            return out;
        };

        let line = format!("{name}{NAME_SEPARATOR}{text}");
        let mut dest_peer = lock(&dest_session);
        let config = &self.config;
        let outbound = dest_peer
            .outbound
            .get_or_insert_with(|| GbnSender::new(config));
        match outbound.try_send(line.into_bytes(), now, faults.corrupt_outgoing) {
            Ok(transmit) => {
                log::info!("[relay] {from} → {dest} seq={}", transmit.seq);
                out.push(Outgoing {
                    dest,
                    datagram: transmit.datagram,
                });
            }
            Err(e) => {
                log::warn!("[relay] {from} → {dest} not relayed: {e}");
                drop(dest_peer);
                out.push(self.notice(from, source_ack, BUSY_NOTICE));
            }
        }
        out
    }

    /// Poll every outbound retransmission timer.
    pub fn tick(&self, now: Instant) -> Vec<Outgoing> {
        let mut out = Vec::new();
        for (addr, session) in self.snapshot() {
            let mut peer = lock(&session);
            if let Some(outbound) = peer.outbound.as_mut() {
                let resent = outbound.check_timeout(now, self.config.retransmit_timeout());
                out.extend(resent.into_iter().map(|datagram| Outgoing {
                    dest: addr,
                    datagram,
                }));
            }
        }
        out
    }

    /// Known peers in the order they were first seen.
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.snapshot()
            .into_iter()
            .map(|(addr, session)| {
                let peer = lock(&session);
                PeerInfo {
                    addr,
                    name: peer.name.clone(),
                    last_seen: peer.last_seen,
                    expected: peer.receiver.expected(),
                    in_flight: peer.outbound.as_ref().map_or(0, GbnSender::in_flight),
                }
            })
            .collect()
    }

    /// Look up `addr`, registering it as known if this is its first frame.
    fn session(&self, addr: SocketAddr, now: Instant) -> Arc<Mutex<PeerSession>> {
        let mut table = lock(&self.peers);
        if let Some(session) = table.sessions.get(&addr) {
            return Arc::clone(session);
        }

        let session = Arc::new(Mutex::new(PeerSession::new(self.config.version(), now)));
        table.order.push(addr);
        table.sessions.insert(addr, Arc::clone(&session));
        log::info!("[relay] new peer {addr} (total={})", table.order.len());
        session
    }

    /// First known peer other than `source`.
    fn destination_for(&self, source: SocketAddr) -> Option<(SocketAddr, Arc<Mutex<PeerSession>>)> {
        let table = lock(&self.peers);
        table
            .order
            .iter()
            .find(|addr| **addr != source)
            .and_then(|addr| table.sessions.get(addr).map(|s| (*addr, Arc::clone(s))))
    }

    fn snapshot(&self) -> Vec<(SocketAddr, Arc<Mutex<PeerSession>>)> {
        let table = lock(&self.peers);
        table
            .order
            .iter()
            .filter_map(|addr| table.sessions.get(addr).map(|s| (*addr, Arc::clone(s))))
            .collect()
    }

    /// Unsequenced informational DATA+ACK frame for `dest`.
    fn notice(&self, dest: SocketAddr, ack: u32, text: &str) -> Outgoing {
        let packet = Packet::new(
            self.config.version(),
            flags::DATA | flags::ACK,
            0,
            ack,
            self.config.recv_capacity(),
            text.as_bytes().to_vec(),
        );
        Outgoing {
            dest,
            datagram: packet.encode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::is_notice;
    use std::time::Duration;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn data(seq: u32, payload: &str) -> Vec<u8> {
        Packet::new(1, flags::DATA, seq, 0, 5, payload.as_bytes().to_vec()).encode()
    }

    fn decode(out: &Outgoing) -> Packet {
        Packet::decode(&out.datagram).unwrap()
    }

    /// Router with A named "alice" and B named "bob", A seen first.
    fn named_pair(now: Instant) -> RelayRouter {
        let router = RelayRouter::new(ProtocolConfig::default());
        router.on_datagram(addr(1), &data(1, "alice"), now);
        router.on_datagram(addr(2), &data(1, "bob"), now);
        router
    }

    #[test]
    fn first_payload_becomes_name_and_is_not_relayed() {
        let router = RelayRouter::new(ProtocolConfig::default());
        let out = router.on_datagram(addr(1), &data(1, " alice\n"), Instant::now());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].dest, addr(1));
        let ack = decode(&out[0]);
        assert!(ack.is_pure_ack());
        assert_eq!(ack.header.ack, 1);
        assert_eq!(router.peers()[0].name.as_deref(), Some("alice"));
    }

    #[test]
    fn relays_named_message_to_other_peer() {
        let now = Instant::now();
        let router = named_pair(now);

        let out = router.on_datagram(addr(1), &data(2, "hi"), now);
        assert_eq!(out.len(), 2);

        let ack = decode(&out[0]);
        assert_eq!(out[0].dest, addr(1));
        assert!(ack.is_pure_ack());
        assert_eq!(ack.header.ack, 2);

        let relayed = decode(&out[1]);
        assert_eq!(out[1].dest, addr(2));
        assert!(relayed.is_data());
        assert_eq!(relayed.header.seq, 1, "destination numbering is independent");
        let text = String::from_utf8(relayed.payload).unwrap();
        assert_eq!(text, "alice: hi");
    }

    #[test]
    fn lone_peer_gets_notice() {
        let now = Instant::now();
        let router = RelayRouter::new(ProtocolConfig::default());
        router.on_datagram(addr(1), &data(1, "alice"), now);

        let out = router.on_datagram(addr(1), &data(2, "anyone?"), now);
        assert_eq!(out.len(), 2);
        let notice = decode(&out[1]);
        assert_eq!(out[1].dest, addr(1));
        assert!(is_notice(&notice));
        assert!(notice.has_flags(flags::DATA | flags::ACK));
        assert_eq!(notice.header.ack, 2);
    }

    #[test]
    fn duplicate_from_source_gets_dup_ack_and_no_relay() {
        let now = Instant::now();
        let router = named_pair(now);
        router.on_datagram(addr(1), &data(2, "hi"), now);

        let out = router.on_datagram(addr(1), &data(2, "hi"), now);
        assert_eq!(out.len(), 1);
        assert_eq!(decode(&out[0]).header.ack, 2);
        assert_eq!(router.peers()[1].in_flight, 1);
    }

    #[test]
    fn ack_from_destination_reaches_its_outbound_window() {
        let now = Instant::now();
        let router = named_pair(now);
        router.on_datagram(addr(1), &data(2, "one"), now);
        router.on_datagram(addr(1), &data(3, "two"), now);
        assert_eq!(router.peers()[1].in_flight, 2);

        let out = router.on_datagram(addr(2), &Packet::ack(1, 2, 5).encode(), now);
        assert!(out.is_empty());
        assert_eq!(router.peers()[1].in_flight, 0);
    }

    #[test]
    fn malformed_datagram_does_not_register_peer() {
        let router = RelayRouter::new(ProtocolConfig::default());
        let out = router.on_datagram(addr(1), &[0u8; 5], Instant::now());
        assert!(out.is_empty());
        assert!(router.peers().is_empty());
    }

    #[test]
    fn tick_retransmits_unacked_relays() {
        let now = Instant::now();
        let router = named_pair(now);
        router.on_datagram(addr(1), &data(2, "one"), now);
        router.on_datagram(addr(1), &data(3, "two"), now);

        assert!(router.tick(now + Duration::from_secs(1)).is_empty());
        let resent = router.tick(now + Duration::from_secs(4));
        let seqs: Vec<u32> = resent.iter().map(|o| decode(o).header.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert!(resent.iter().all(|o| o.dest == addr(2)));
    }

    #[test]
    fn full_destination_window_sends_busy_notice() {
        let now = Instant::now();
        let router = RelayRouter::new(ProtocolConfig::default().with_window_limit(1));
        router.on_datagram(addr(1), &data(1, "alice"), now);
        router.on_datagram(addr(2), &data(1, "bob"), now);
        router.on_datagram(addr(1), &data(2, "one"), now);

        let out = router.on_datagram(addr(1), &data(3, "two"), now);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].dest, addr(1));
        assert!(is_notice(&decode(&out[1])));
    }

    #[test]
    fn drop_acks_fault_keeps_relays_outstanding() {
        let now = Instant::now();
        let router = named_pair(now);
        router.set_faults(FaultInjection {
            drop_incoming_acks: true,
            ..Default::default()
        });
        router.on_datagram(addr(1), &data(2, "one"), now);
        router.on_datagram(addr(2), &Packet::ack(1, 1, 5).encode(), now);
        assert_eq!(router.peers()[1].in_flight, 1);
    }
}
