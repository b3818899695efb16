//! Chat client: one [`Session`] talking to the relay server.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send(payload)                      recv() ◀── ClientEvent
//!      ▼                                        ▲
//!  Client ── Arc<Mutex<Session>> ──────────┐    │ mpsc
//!      │                                    ▼    │
//!      └── Arc<Socket> ◀──────────────  receive_loop task
//!                                       (recv_timeout → on_datagram → tick)
//! ```
//!
//! Sends happen on the caller's task; inbound frames and retransmission
//! polling happen on the spawned receive loop.  Both sides take the session
//! lock only around protocol-core calls, never across an `.await`.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ProtocolConfig;
use crate::error::Error;
use crate::fault::{FaultCommand, FaultInjection};
use crate::session::Session;
use crate::sync::lock;
use crate::socket::Socket;

/// Something the server pushed to this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// An in-order chat line relayed from the other peer.
    Message(String),
    /// An out-of-band server notice (no peer, peer busy).
    Notice(String),
}

pub struct Client {
    server: SocketAddr,
    socket: Arc<Socket>,
    session: Arc<Mutex<Session>>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<(), Error>>>,
}

impl Client {
    /// Bind an ephemeral local port and start the receive loop.
    ///
    /// No frame is sent; the server learns about this client from its first
    /// DATA frame (conventionally the display name).
    pub async fn connect(server: SocketAddr, config: ProtocolConfig) -> Result<Self, Error> {
        let local: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = Arc::new(Socket::bind(local).await?);
        log::info!("[client] bound {} → server {server}", socket.local_addr);

        let poll = config.poll_interval();
        let session = Arc::new(Mutex::new(Session::new(config)));
        let (events_tx, events) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            server,
            Arc::clone(&session),
            poll,
            events_tx,
            shutdown_rx,
        ));

        Ok(Self {
            server,
            socket,
            session,
            events,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    /// Send one chat payload; returns its sequence number.
    ///
    /// Fails with [`Error::Send`] when the window is full.  The payload is not
    /// queued in that case.
    pub async fn send(&self, payload: impl Into<Vec<u8>>) -> Result<u32, Error> {
        let transmit = lock(&self.session).send(payload.into(), Instant::now())?;
        self.socket
            .send_to(&transmit.datagram, self.server)
            .await?;
        log::debug!("[client] → DATA seq={}", transmit.seq);
        Ok(transmit.seq)
    }

    /// Next event from the server, or `None` once the receive loop has ended.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Frames sent but not yet acknowledged.
    pub fn in_flight(&self) -> u32 {
        lock(&self.session).sender().in_flight()
    }

    pub fn faults(&self) -> FaultInjection {
        lock(&self.session).faults()
    }

    pub fn set_faults(&self, faults: FaultInjection) {
        lock(&self.session).set_faults(faults);
    }

    pub fn apply_fault(&self, command: FaultCommand) {
        lock(&self.session).apply_fault(command);
    }

    /// Stop the receive loop and release the socket.
    ///
    /// Unacknowledged frames are abandoned.
    pub async fn quit(mut self) -> Result<(), Error> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.handle.take() {
            Some(handle) => handle.await.map_err(|_| Error::Closed)?,
            None => Ok(()),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn receive_loop(
    socket: Arc<Socket>,
    server: SocketAddr,
    session: Arc<Mutex<Session>>,
    poll: Duration,
    events: mpsc::UnboundedSender<ClientEvent>,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<(), Error> {
    loop {
        let received = tokio::select! {
            _ = &mut shutdown => {
                log::debug!("[client] receive loop stopping");
                break;
            }
            result = socket.recv_timeout(poll) => match result {
                Ok(received) => received,
                Err(e) => {
                    log::error!("[client] receive failed: {e}");
                    return Err(e.into());
                }
            },
        };

        let now = Instant::now();
        let mut outgoing = Vec::new();
        let mut delivered = None;
        let mut notice = None;
        {
            let mut session = lock(&session);
            match received {
                Some((datagram, from)) if from == server => {
                    let inbound = session.on_datagram(&datagram, now);
                    outgoing = inbound.replies;
                    delivered = inbound.delivered;
                    notice = inbound.notice;
                }
                Some((_, from)) => log::debug!("[client] ignoring datagram from {from}"),
                None => {}
            }
            outgoing.extend(session.tick(now));
        }

        if let Some(payload) = delivered {
            let line = String::from_utf8_lossy(&payload).into_owned();
            let _ = events.send(ClientEvent::Message(line));
        }
        if let Some(payload) = notice {
            let line = String::from_utf8_lossy(&payload).into_owned();
            let _ = events.send(ClientEvent::Notice(line));
        }

        if !outgoing.is_empty() {
            log::debug!("[client] → {} frame(s)", outgoing.len());
        }
        for datagram in outgoing {
            socket.send_to(&datagram, server).await?;
        }
    }
    Ok(())
}
