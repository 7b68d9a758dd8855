use std::{collections::TryReserveError, io};

use hex::FromHexError;
use thiserror::Error;

use crate::reply::ReplyKind;

/// Possible errors while encoding or decoding RouterOS API data.
///
/// Every variant describes a protocol-level problem. None of them are fatal to the
/// process; the caller decides whether the connection is still usable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A word length that does not fit the 4-byte length classes (`>= 0x1000_0000`),
    /// or that exceeds the configured word limit.
    #[error("frame of {len} bytes exceeds the supported length of {limit} bytes")]
    FrameTooLarge {
        /// The offending length.
        len: u64,
        /// The maximum length accepted.
        limit: u32,
    },
    /// The first byte of a length header is one of the reserved control bytes (`0xF8..=0xFF`).
    #[error("reserved control byte {0:#04x} in length header")]
    ControlByte(u8),
    /// A word to be sent is empty. Its zero length would read as a sentence terminator.
    #[error("empty word")]
    EmptyWord,
    /// A word to be sent contains a NUL byte.
    #[error("word contains an embedded NUL byte at position {0}")]
    EmbeddedNul(usize),
    /// A word to be sent contains a character that can not be encoded as Latin-1.
    #[error("word contains non Latin-1 character {0:?}")]
    NonLatin1(char),
    /// The `/login` reply carried no `=ret=` challenge.
    #[error("login reply carries no challenge")]
    MissingChallenge,
    /// The `=ret=` challenge is not 32 hexadecimal characters.
    #[error("invalid login challenge: {0}")]
    InvalidChallenge(FromHexError),
    /// A buffer for an incoming word could not be allocated.
    #[error("could not allocate {requested} bytes for an incoming word")]
    Allocation {
        /// Number of bytes requested.
        requested: usize,
    },
    /// A sentence without any word was encountered where one was required.
    #[error("empty sentence")]
    EmptySentence,
    /// A reply of an unexpected kind was received.
    #[error("unexpected reply: found {found}, expected {expected}")]
    UnexpectedReply {
        /// The kind that was received.
        found: ReplyKind,
        /// The kind that was expected.
        expected: ReplyKind,
    },
}

impl ProtocolError {
    pub(crate) fn allocation(requested: usize, _: TryReserveError) -> Self {
        ProtocolError::Allocation { requested }
    }
}

/// Errors raised while decoding from a blocking byte stream.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The peer closed the stream before a complete frame arrived.
    #[error("connection closed by peer")]
    Closed,
    /// The underlying stream failed.
    #[error(transparent)]
    Io(io::Error),
    /// The received bytes violate the protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => StreamError::Closed,
            _ => StreamError::Io(e),
        }
    }
}
