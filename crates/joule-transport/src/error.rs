//! Transport error types.

use std::io;
use thiserror::Error;

/// Errors raised by a transport link.
#[derive(Error, Debug)]
pub enum TransportError {
    /// An operation needed a connection and there is none.
    #[error("not connected")]
    NotConnected,

    /// The connection handshake failed or was refused.
    #[error("failed to connect to {target}: {source}")]
    ConnectFailed {
        /// What we tried to reach.
        target: String,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// No data arrived in time.
    #[error("timed out")]
    Timeout,

    /// The link was closed by the peer.
    #[error("connection closed")]
    Closed,

    /// Payload does not fit in one bridge frame.
    #[error("frame of {0} bytes exceeds maximum")]
    FrameTooLarge(usize),

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// True when the connection should be considered lost.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            TransportError::NotConnected | TransportError::Closed | TransportError::Io(_)
        )
    }
}
