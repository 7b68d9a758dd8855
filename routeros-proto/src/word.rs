use std::{
    borrow::Cow,
    fmt::{self, Debug, Display, Formatter, Write},
    ops::Deref,
};

use encoding_rs::mem::{decode_latin1, encode_latin1_lossy, str_latin1_up_to};

use crate::error::ProtocolError;

/// One length-prefixed unit of a [`Sentence`](crate::sentence::Sentence).
///
/// Words are opaque byte strings. By convention they are either a command path
/// (`/interface/print`), an attribute (`=name=ether1`), a meta attribute (`.tag=42`)
/// or a reply marker (`!done`). The router speaks Latin-1, so words built from Rust
/// strings are encoded to Latin-1 before they are sent.
///
/// # Examples
///
/// ```
/// use routeros_proto::word::Word;
///
/// let word = Word::new("=name=ether1").unwrap();
/// assert_eq!(word.attribute(), Some((b"name" as &[u8], b"ether1" as &[u8])));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Word(Box<[u8]>);

impl Word {
    /// Builds a word from a string, encoding it to Latin-1.
    ///
    /// # Errors
    ///
    /// Fails if `value` is empty, or holds a NUL or a character outside Latin-1.
    pub fn new(value: &str) -> Result<Self, ProtocolError> {
        Self::from_bytes(encode_latin1(value)?.into_owned())
    }

    /// Builds a word from raw bytes.
    ///
    /// # Errors
    ///
    /// Fails if `bytes` is empty or contains a NUL. An empty word would read as the
    /// sentence terminator.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, ProtocolError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ProtocolError::EmptyWord);
        }
        if let Some(pos) = bytes.iter().position(|b| *b == 0) {
            return Err(ProtocolError::EmbeddedNul(pos));
        }
        Ok(Self(bytes.into_boxed_slice()))
    }

    /// Wraps bytes received from the wire without validation.
    pub(crate) fn from_wire(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }

    /// The raw bytes of the word.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decodes the word from Latin-1.
    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        decode_latin1(&self.0)
    }

    /// Splits an attribute word `=key=value` into its key and value.
    ///
    /// A word such as `=disabled=` yields an empty value. Returns [`None`] for any word
    /// not starting with `=`.
    pub fn attribute(&self) -> Option<(&[u8], &[u8])> {
        let rest = self.0.strip_prefix(b"=")?;
        let mut parts = rest.splitn(2, |b| *b == b'=');
        let key = parts.next()?;
        let value = parts.next().unwrap_or_default();
        Some((key, value))
    }

    /// Returns the rest of the word if it starts with `prefix`.
    pub fn strip_prefix(&self, prefix: &[u8]) -> Option<&[u8]> {
        self.0.strip_prefix(prefix)
    }
}

impl Deref for Word {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Word {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&str> for Word {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Word::new(value)
    }
}

impl TryFrom<String> for Word {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Word::new(&value)
    }
}

impl TryFrom<&[u8]> for Word {
    type Error = ProtocolError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Word::from_bytes(value)
    }
}

impl<const N: usize> TryFrom<&[u8; N]> for Word {
    type Error = ProtocolError;

    fn try_from(value: &[u8; N]) -> Result<Self, Self::Error> {
        Word::from_bytes(&value[..])
    }
}

fn format_escaped(f: &mut Formatter, bytes: &[u8]) -> fmt::Result {
    for byte in bytes {
        if byte.is_ascii() {
            f.write_char(*byte as char)?
        } else {
            write!(f, "\\x{byte:02x}")?
        }
    }
    Ok(())
}

impl Debug for Word {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_char('"')?;
        format_escaped(f, &self.0)?;
        f.write_char('"')
    }
}

impl Display for Word {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        format_escaped(f, &self.0)
    }
}

/// Encodes `value` to Latin-1, the character set spoken by the router.
///
/// # Errors
///
/// Returns [`ProtocolError::NonLatin1`] for the first character outside Latin-1.
pub fn encode_latin1(value: &str) -> Result<Cow<'_, [u8]>, ProtocolError> {
    let up_to = str_latin1_up_to(value);
    if let Some(ch) = value[up_to..].chars().next() {
        return Err(ProtocolError::NonLatin1(ch));
    }
    Ok(encode_latin1_lossy(value))
}
