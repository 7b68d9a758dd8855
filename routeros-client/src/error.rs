use std::io;

use routeros_proto::{ProtocolError, StreamError};
use thiserror::Error;

/// Result type alias for connection operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by a [`Connection`](crate::Connection).
#[derive(Error, Debug)]
pub enum Error {
    /// The transport failed.
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    /// The peer closed the connection, possibly in the middle of a frame.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// A sentence could not be written completely.
    ///
    /// The peer's parser is now at an unknown position; the connection is unusable.
    #[error("short write: {written} of {expected} bytes sent")]
    WriteFailed {
        /// Bytes handed to the transport before the failure.
        written: usize,
        /// Size of the encoded sentence.
        expected: usize,
        /// The transport error, if one was reported.
        #[source]
        source: Option<io::Error>,
    },
    /// The received data, or the data to send, violates the protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// A sentence passed to a tagged send already carries a `.tag=` word.
    #[error("sentence already carries tag {0:?}")]
    AlreadyTagged(String),
    /// An earlier failure left the connection in an undefined state.
    #[error("connection is unusable after an earlier failure")]
    Poisoned,
    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Closed => Error::ConnectionClosed,
            StreamError::Io(e) => Error::Io(e),
            StreamError::Protocol(e) => Error::Protocol(e),
        }
    }
}
