//! Top-level error type for the client and server runtimes.

use thiserror::Error;

use crate::gbn_sender::SendError;
use crate::socket::SocketError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// The send window refused the payload; retry after an ACK.
    #[error(transparent)]
    Send(#[from] SendError),

    /// The receive loop has stopped.
    #[error("session closed")]
    Closed,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Socket(SocketError::Io(e))
    }
}
