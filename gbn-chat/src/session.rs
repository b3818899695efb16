//! Sans-IO protocol core for one endpoint talking to one peer.
//!
//! A [`Session`] pairs an outbound [`GbnSender`] with an inbound
//! [`GbnReceiver`] and the endpoint's [`FaultInjection`] toggles.  It is the
//! collaborator boundary of the transport:
//!
//! - [`Session::send`]: admit an application payload or report
//!   [`SendError::WindowFull`].
//! - [`Session::on_datagram`]: feed one raw datagram from the socket.
//! - [`Session::tick`]: poll the retransmission timer.
//!
//! Every method returns the datagrams the caller must transmit; nothing here
//! touches a socket or reads a clock.

use std::time::Instant;

use crate::config::ProtocolConfig;
use crate::fault::{FaultCommand, FaultInjection};
use crate::gbn_receiver::{Delivery, GbnReceiver};
use crate::gbn_sender::{GbnSender, SendError, Transmit};
use crate::packet::Packet;

/// What one inbound datagram produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// In-order payload for the application.
    pub delivered: Option<Vec<u8>>,
    /// Out-of-band notice (an unsequenced DATA frame) for the application.
    pub notice: Option<Vec<u8>>,
    /// Datagrams to send back to the peer (ACKs).
    pub replies: Vec<Vec<u8>>,
}

#[derive(Debug)]
pub struct Session {
    config: ProtocolConfig,
    sender: GbnSender,
    receiver: GbnReceiver,
    faults: FaultInjection,
}

impl Session {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            sender: GbnSender::new(&config),
            receiver: GbnReceiver::new(config.version()),
            faults: FaultInjection::default(),
            config,
        }
    }

    pub fn sender(&self) -> &GbnSender {
        &self.sender
    }

    pub fn receiver(&self) -> &GbnReceiver {
        &self.receiver
    }

    pub fn faults(&self) -> FaultInjection {
        self.faults
    }

    pub fn set_faults(&mut self, faults: FaultInjection) {
        self.faults = faults;
    }

    pub fn apply_fault(&mut self, command: FaultCommand) {
        self.faults.apply(command);
    }

    /// Admit `payload` into the send window.
    pub fn send(&mut self, payload: Vec<u8>, now: Instant) -> Result<Transmit, SendError> {
        let result = self
            .sender
            .try_send(payload, now, self.faults.corrupt_outgoing);
        if let Err(ref e) = result {
            log::warn!("send rejected: {e}");
        }
        result
    }

    /// Process one raw datagram from the peer.
    pub fn on_datagram(&mut self, datagram: &[u8], now: Instant) -> Inbound {
        let mut inbound = Inbound::default();

        let packet = match Packet::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("dropping malformed datagram: {e}");
                return inbound;
            }
        };

        // A damaged frame whose seq reads as 0 is not trusted as a notice; it
        // falls through and is answered like any other corrupt frame.
        if is_notice(&packet) && packet.checksum_ok() {
            inbound.notice = Some(packet.payload);
            return inbound;
        }

        if packet.is_pure_ack() {
            if !packet.checksum_ok() {
                log::debug!("dropping corrupted ACK");
            } else if self.faults.drop_incoming_acks {
                log::info!("[test] ACK={} ignored (drop acks)", packet.header.ack);
            } else {
                self.sender
                    .on_ack(packet.header.ack, packet.header.window, now);
            }
            return inbound;
        }

        if self.faults.drop_incoming_data && packet.is_data() {
            log::info!("[test] DATA seq={} discarded (drop data)", packet.header.seq);
            return inbound;
        }

        let delivery = self.receiver.accept(packet, self.config.recv_capacity());
        inbound.replies.push(delivery.ack().encode());
        if let Delivery::Delivered { payload, .. } = delivery {
            inbound.delivered = Some(payload);
        }
        inbound
    }

    /// Poll the retransmission timer; returns frames to resend, oldest first.
    pub fn tick(&mut self, now: Instant) -> Vec<Vec<u8>> {
        self.sender
            .check_timeout(now, self.config.retransmit_timeout())
    }
}

/// Sequence 0 is never allocated by a sender, so a DATA frame carrying it is
/// an unsequenced notice rather than part of the reliable stream.
pub fn is_notice(packet: &Packet) -> bool {
    packet.is_data() && packet.header.seq == 0
}
