#![warn(missing_docs)]
//! # routeros-proto
//!
//! Sans-IO implementation of the MikroTik RouterOS API protocol.
//!
//! The crate knows how to encode and decode words and sentences, classify replies,
//! compute the challenge-response login token and keep track of tagged requests.
//! It never touches a socket: the `routeros-client` crate drives it over a byte stream.
//!
//! ## Examples
//!
//! ```rust
//! use routeros_proto::{Sentence, SentenceDecoder, Progress, ReplyKind, Reply};
//!
//! let command = Sentence::command("/interface/print")?.with_word(".tag=1")?;
//! let bytes = command.encode()?;
//!
//! let mut decoder = SentenceDecoder::new();
//! let sentences = decoder.feed(&bytes)?;
//! assert_eq!(sentences[0], command);
//! assert_eq!(Reply::from(sentences[0].clone()).kind(), ReplyKind::Unclassified);
//! # Ok::<(), routeros_proto::ProtocolError>(())
//! ```

#[cfg(target_pointer_width = "16")]
compile_error!("This library supports 32-bit architectures or higher.");

/// Challenge-response login helpers.
pub mod auth;
/// Word length prefix codec.
pub mod codec;
/// Incremental decoder for partially received sentences.
pub mod decoder;
/// Error types.
pub mod error;
/// Table of tagged requests awaiting a reply.
pub mod pending;
/// Reply classification.
pub mod reply;
/// Sentences: ordered lists of words.
pub mod sentence;
/// Words: the unit of the protocol.
pub mod word;

pub use decoder::{FrameState, Progress, SentenceDecoder};
pub use error::{ProtocolError, StreamError};
pub use pending::{PendingRequests, Tag};
pub use reply::{Reply, ReplyKind};
pub use sentence::Sentence;
pub use word::Word;
