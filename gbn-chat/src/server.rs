//! Relay server runtime.
//!
//! A single task owns the socket and drives the [`RelayRouter`]: every poll
//! interval it either feeds one datagram to the router or times out, then
//! ticks every outbound retransmission timer and flushes what the router
//! produced.  Sends are per destination; a peer that cannot be reached does
//! not stop the others.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::ProtocolConfig;
use crate::error::Error;
use crate::relay::{Outgoing, RelayRouter};
use crate::socket::Socket;

pub struct Server {
    socket: Socket,
    router: Arc<RelayRouter>,
}

impl Server {
    pub async fn bind(addr: SocketAddr, config: ProtocolConfig) -> Result<Self, Error> {
        let socket = Socket::bind(addr).await?;
        log::info!("[server] listening on {}", socket.local_addr);
        Ok(Self {
            socket,
            router: Arc::new(RelayRouter::new(config)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn router(&self) -> Arc<RelayRouter> {
        Arc::clone(&self.router)
    }

    /// Serve until `shutdown` fires (or its sender is dropped).
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) -> Result<(), Error> {
        let poll = self.router.config().poll_interval();
        loop {
            let received = tokio::select! {
                _ = &mut shutdown => break,
                result = self.socket.recv_timeout(poll) => result?,
            };

            let now = Instant::now();
            let mut outgoing = match received {
                Some((datagram, from)) => self.router.on_datagram(from, &datagram, now),
                None => Vec::new(),
            };
            outgoing.extend(self.router.tick(now));

            self.flush(outgoing).await;
        }
        log::info!("[server] stopped");
        Ok(())
    }

    /// Send everything the router produced.
    ///
    /// A failed send only affects its destination: the frame stays in that
    /// peer's window and is retried on the next timeout.  Only receive
    /// errors end the loop.
    async fn flush(&self, outgoing: Vec<Outgoing>) {
        for Outgoing { dest, datagram } in outgoing {
            if let Err(e) = self.socket.send_to(&datagram, dest).await {
                log::warn!("[server] send to {dest} failed: {e}");
            }
        }
    }

    /// Run on a background task.
    pub fn spawn(self) -> ServerHandle {
        let local_addr = self.local_addr();
        let router = self.router();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(self.run(rx));
        ServerHandle {
            local_addr,
            router,
            shutdown: Some(tx),
            handle,
        }
    }
}

/// Handle to a server started with [`Server::spawn`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    router: Arc<RelayRouter>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), Error>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn router(&self) -> &RelayRouter {
        &self.router
    }

    /// Stop the server loop and wait for it to exit.
    pub async fn shutdown(mut self) -> Result<(), Error> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.handle).await.map_err(|_| Error::Closed)?
    }
}
