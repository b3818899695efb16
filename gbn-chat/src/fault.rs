//! Runtime fault-injection toggles.
//!
//! Each toggle is consulted at the point where a frame would normally be
//! sent or accepted.  They exist to exercise the checksum-rejection,
//! timeout-retransmission, and duplicate-ACK paths against a live peer.

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FaultInjection {
    /// Send the first transmission of each new DATA frame corrupted.
    pub corrupt_outgoing: bool,
    /// Discard received DATA frames before they reach the receiver (no ACK).
    pub drop_incoming_data: bool,
    /// Discard received pure ACK frames before they reach the sender.
    pub drop_incoming_acks: bool,
}

/// A control line from the front end, e.g. `///set_drop_ack 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCommand {
    Corrupt(bool),
    DropData(bool),
    DropAcks(bool),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FaultCommandError {
    #[error("not a control line")]
    NotACommand,
    #[error("unknown control command `{0}`")]
    Unknown(String),
}

/// Prefix that marks a line as a control command rather than chat text.
pub const COMMAND_PREFIX: &str = "///";

impl FromStr for FaultCommand {
    type Err = FaultCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if !line.starts_with(COMMAND_PREFIX) {
            return Err(FaultCommandError::NotACommand);
        }

        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or_default();
        // Anything but an explicit "1" switches the toggle off.
        let on = parts.next() == Some("1");

        match cmd {
            "///set_err" => Ok(Self::Corrupt(on)),
            "///set_drop_pkt" => Ok(Self::DropData(on)),
            "///set_drop_ack" => Ok(Self::DropAcks(on)),
            other => Err(FaultCommandError::Unknown(other.to_string())),
        }
    }
}

impl FaultInjection {
    pub fn apply(&mut self, command: FaultCommand) {
        match command {
            FaultCommand::Corrupt(on) => self.corrupt_outgoing = on,
            FaultCommand::DropData(on) => self.drop_incoming_data = on,
            FaultCommand::DropAcks(on) => self.drop_incoming_acks = on,
        }
        log::info!("fault injection now {:?}", self);
    }
}
