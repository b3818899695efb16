//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that moves raw
//! datagrams.  Decoding is left to the protocol core so that a malformed
//! datagram is just another input to drop, not a socket error.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::packet::MAX_DATAGRAM;

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Returns true if the error is likely transient (the next receive may succeed).
fn is_transient_io_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}

/// An async, datagram-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Send `datagram` as a single UDP datagram to `dest`.
    pub async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(datagram, dest).await?;
        Ok(())
    }

    /// Receive the next datagram.
    ///
    /// Returns `(bytes, sender_address)`.  Datagrams larger than
    /// [`MAX_DATAGRAM`] are truncated by the OS and will fail to decode.
    pub async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }

    /// Receive with an upper bound on the wait.
    ///
    /// Returns `Ok(None)` when `timeout` elapses without a datagram, or when
    /// the OS reports a transient error (e.g. an ICMP port-unreachable
    /// surfacing as `ConnectionReset`), so the caller's poll loop keeps
    /// running.  Any other error is returned.
    pub async fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<(Vec<u8>, SocketAddr)>, SocketError> {
        match tokio::time::timeout(timeout, self.recv_from()).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(received)) => Ok(Some(received)),
            Ok(Err(SocketError::Io(e))) if is_transient_io_error(&e) => {
                log::warn!("transient receive error: {e}");
                Ok(None)
            }
            Ok(Err(e)) => Err(e),
        }
    }
}
