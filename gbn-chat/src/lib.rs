//! `gbn-chat`: two-peer chat relayed through a server over a Go-Back-N
//! reliable transport on UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  DATA / ACK   ┌──────────────────┐  DATA / ACK   ┌──────────┐
//!  │  Client  │◀─────────────▶│   RelayRouter    │◀─────────────▶│  Client  │
//!  │ (Session)│               │ PeerSession × N  │               │ (Session)│
//!  └────┬─────┘               └────────┬─────────┘               └────┬─────┘
//!       │                              │                              │
//!  ┌────▼──────────────────────────────▼──────────────────────────────▼────┐
//!  │  GbnSender (window, timer)   GbnReceiver (cumulative ACKs)   Packet   │
//!  └───────────────────────────────────┬───────────────────────────────────┘
//!                                      │ raw UDP datagrams
//!                                 ┌────▼──────┐
//!                                 │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!                                 └───────────┘
//! ```
//!
//! The protocol core (everything but [`client`], [`server`] and [`socket`])
//! is sans-IO: callers pass in bytes and the current [`std::time::Instant`]
//! and get back the datagrams to send.
//!
//! Each module has a single responsibility:
//! - [`packet`]        : wire format (encode / decode / checksum)
//! - [`config`]        : protocol tunables
//! - [`gbn_sender`]    : GBN outbound window state machine
//! - [`gbn_receiver`]  : GBN inbound cumulative-ACK state machine
//! - [`timer`]         : single retransmission timer
//! - [`state`]         : sender state type
//! - [`fault`]         : runtime fault-injection toggles
//! - [`session`]       : one endpoint's sender + receiver pair
//! - [`relay`]         : server-side per-peer routing
//! - [`client`]        : async chat client
//! - [`server`]        : async relay server
//! - [`simulator`]     : seeded lossy link for testing
//! - [`socket`]        : async UDP socket abstraction
//! - [`error`]         : runtime error type
//! - `sync`            : poison-tolerant lock helper

pub mod client;
pub mod config;
pub mod error;
pub mod fault;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod packet;
pub mod relay;
pub mod server;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod state;
mod sync;
pub mod timer;

pub use client::{Client, ClientEvent};
pub use config::ProtocolConfig;
pub use error::Error;
pub use relay::RelayRouter;
pub use server::{Server, ServerHandle};
pub use session::Session;
