//! Sender finite-state machine types.
//!
//! A Go-Back-N sender has only two observable states, distinguished by
//! whether its retransmission timer is running.  Transitions are driven by
//! [`crate::gbn_sender::GbnSender`]:
//!
//! ```text
//!            first send into empty window
//!   IDLE ─────────────────────────────────────▶ ARMED ──┐
//!    ▲                                            │     │ ack advance that leaves
//!    │          ack that empties the window       │     │ frames in flight, or
//!    └────────────────────────────────────────────┘     │ timeout retransmission
//!                                                  ▲    │ (timer restarted)
//!                                                  └────┘
//! ```
//!
//! The receive side has no separate state type: its whole state is the next
//! expected sequence number.

/// Observable state of one outbound direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Nothing in flight; retransmission timer disarmed.
    #[default]
    Idle,
    /// At least one frame awaits acknowledgement; timer running.
    Armed,
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Armed => f.write_str("armed"),
        }
    }
}
