use std::{
    borrow::Cow,
    fmt::{self, Display, Formatter},
};

use crate::{error::ProtocolError, sentence::Sentence};

/// The type of a reply, derived from the first word of a received [`Sentence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    /// `!re`: one row of a multi-row reply.
    Data,
    /// `!done`: end of a command's reply stream. May carry attributes of its own.
    Done,
    /// `!trap`: an error or warning while executing a command.
    Trap,
    /// `!fatal`: the router is about to close the connection.
    Fatal,
    /// Any other first word, or an empty sentence.
    Unclassified,
}

impl ReplyKind {
    /// Classifies a sentence by its first word.
    pub fn of(sentence: &Sentence) -> Self {
        sentence
            .first()
            .map_or(ReplyKind::Unclassified, |word| ReplyKind::from(word.as_bytes()))
    }

    /// Whether no more replies follow for the same tag.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReplyKind::Done | ReplyKind::Fatal)
    }
}

impl From<&[u8]> for ReplyKind {
    fn from(value: &[u8]) -> Self {
        match value {
            b"!re" => ReplyKind::Data,
            b"!done" => ReplyKind::Done,
            b"!trap" => ReplyKind::Trap,
            b"!fatal" => ReplyKind::Fatal,
            _ => ReplyKind::Unclassified,
        }
    }
}

impl Display for ReplyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ReplyKind::Data => write!(f, "!re"),
            ReplyKind::Done => write!(f, "!done"),
            ReplyKind::Trap => write!(f, "!trap"),
            ReplyKind::Fatal => write!(f, "!fatal"),
            ReplyKind::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// A received sentence together with its classification.
///
/// The kind and tag are computed once, when the sentence is complete.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    kind: ReplyKind,
    tag: Option<String>,
    sentence: Sentence,
}

impl Reply {
    /// The reply kind.
    pub fn kind(&self) -> ReplyKind {
        self.kind
    }

    /// The correlation tag, if the reply carries a `.tag=` word.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The underlying sentence.
    pub fn sentence(&self) -> &Sentence {
        &self.sentence
    }

    /// Consumes the reply, returning the underlying sentence.
    pub fn into_sentence(self) -> Sentence {
        self.sentence
    }

    /// Shorthand for [`Sentence::get`].
    pub fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.sentence.get(key)
    }

    /// Whether no more replies follow for the same tag.
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// The human readable reason carried by a `!trap` or `!fatal` reply.
    ///
    /// Traps carry a `=message=` attribute; `!fatal` is followed by a bare reason word.
    pub fn message(&self) -> Option<Cow<'_, str>> {
        match self.kind {
            ReplyKind::Trap => self.sentence.get("message"),
            ReplyKind::Fatal => self.sentence.words().get(1).map(|w| w.to_str_lossy()),
            _ => None,
        }
    }

    /// Returns the reply if it has the `expected` kind.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedReply`] otherwise, and
    /// [`ProtocolError::EmptySentence`] if the reply holds no word at all.
    pub fn expect_kind(self, expected: ReplyKind) -> Result<Self, ProtocolError> {
        if self.sentence.is_empty() {
            return Err(ProtocolError::EmptySentence);
        }
        if self.kind != expected {
            return Err(ProtocolError::UnexpectedReply {
                found: self.kind,
                expected,
            });
        }
        Ok(self)
    }
}

impl From<Sentence> for Reply {
    fn from(sentence: Sentence) -> Self {
        let kind = ReplyKind::of(&sentence);
        let tag = sentence.get_tag().map(Cow::into_owned);
        Self {
            kind,
            tag,
            sentence,
        }
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sentence)
    }
}
