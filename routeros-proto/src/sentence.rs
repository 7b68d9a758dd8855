use std::{borrow::Cow, fmt, io::Read};

use encoding_rs::mem::decode_latin1;

use crate::{
    codec::encode_length,
    decoder::SentenceDecoder,
    error::{ProtocolError, StreamError},
    word::Word,
};

/// An ordered list of [`Word`]s: one command, or one reply unit.
///
/// On the wire every word is preceded by its length (see [`codec`](crate::codec)) and the
/// sentence is terminated by a zero-length word. The terminator is never stored.
///
/// # Examples
///
/// ```
/// use routeros_proto::sentence::Sentence;
///
/// let sentence = Sentence::command("/interface/print")?
///     .with_attribute("stats", "")?
///     .with_word("=.proplist=name,type")?;
/// assert_eq!(sentence.len(), 3);
/// # Ok::<(), routeros_proto::ProtocolError>(())
/// ```
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Sentence {
    words: Vec<Word>,
}

impl Sentence {
    /// Creates an empty sentence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sentence whose first word is the command `path`.
    pub fn command(path: &str) -> Result<Self, ProtocolError> {
        Self::new().with_word(path)
    }

    /// Appends a word.
    pub fn add(&mut self, word: Word) {
        self.words.push(word);
    }

    /// Appends a word built from a string.
    pub fn push(&mut self, word: &str) -> Result<(), ProtocolError> {
        self.words.push(Word::new(word)?);
        Ok(())
    }

    /// Appends a word built from a string, returning the sentence for chaining.
    pub fn with_word(mut self, word: &str) -> Result<Self, ProtocolError> {
        self.push(word)?;
        Ok(self)
    }

    /// Appends the attribute word `=key=value`.
    pub fn with_attribute(self, key: &str, value: &str) -> Result<Self, ProtocolError> {
        self.with_word(&format!("={key}={value}"))
    }

    /// Appends the query word `?key=value`.
    pub fn with_query(self, key: &str, value: &str) -> Result<Self, ProtocolError> {
        self.with_word(&format!("?{key}={value}"))
    }

    /// Appends `=.proplist=` limiting the reply to the given properties.
    pub fn with_proplist<'a>(
        self,
        properties: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ProtocolError> {
        let list = properties.into_iter().collect::<Vec<_>>().join(",");
        self.with_attribute(".proplist", &list)
    }

    /// The words of the sentence, in order.
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// The first word: the command, or the reply marker.
    pub fn first(&self) -> Option<&Word> {
        self.words.first()
    }

    /// Number of words, terminator excluded.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the sentence holds no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns the raw value of the first word starting with `key=`.
    ///
    /// A `key` that does not start with `=` or `.` names an attribute, so `get_bytes("ret")`
    /// and `get_bytes("=ret")` both match the word `=ret=abc123`.
    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        let prefix = match key.as_bytes().first() {
            Some(b'=' | b'.') => format!("{key}="),
            _ => format!("={key}="),
        };
        self.words
            .iter()
            .find_map(|word| word.strip_prefix(prefix.as_bytes()))
    }

    /// Returns the value of the first word starting with `key=`, decoded from Latin-1.
    ///
    /// Absence is not an error: it means the attribute is not present.
    pub fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get_bytes(key).map(decode_latin1)
    }

    /// Returns the value of the `.tag=` word.
    pub fn get_tag(&self) -> Option<Cow<'_, str>> {
        self.get(".tag")
    }

    /// Encodes the sentence, terminator included.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let size = self.words.iter().map(|w| w.len() + 4).sum::<usize>() + 1;
        let mut buffer = Vec::with_capacity(size);
        self.encode_into(&mut buffer)?;
        Ok(buffer)
    }

    /// Appends the encoded sentence to `buffer`.
    ///
    /// On error `buffer` may hold a partially encoded sentence.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) -> Result<(), ProtocolError> {
        for word in &self.words {
            let len = u32::try_from(word.len()).map_err(|_| ProtocolError::FrameTooLarge {
                len: word.len() as u64,
                limit: crate::codec::MAX_WORD_LEN,
            })?;
            buffer.extend_from_slice(&encode_length(len)?);
            buffer.extend_from_slice(word);
        }
        buffer.extend_from_slice(&encode_length(0)?);
        Ok(())
    }

    /// Reads one sentence from a blocking stream, consuming its terminator and nothing more.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the stream ends before the terminator.
    pub fn decode_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, StreamError> {
        SentenceDecoder::new().read_sentence(reader)
    }
}

impl From<Vec<Word>> for Sentence {
    fn from(words: Vec<Word>) -> Self {
        Self { words }
    }
}

impl FromIterator<Word> for Sentence {
    fn from_iter<I: IntoIterator<Item = Word>>(iter: I) -> Self {
        Self {
            words: iter.into_iter().collect(),
        }
    }
}

impl Extend<Word> for Sentence {
    fn extend<I: IntoIterator<Item = Word>>(&mut self, iter: I) {
        self.words.extend(iter);
    }
}

impl IntoIterator for Sentence {
    type Item = Word;
    type IntoIter = std::vec::IntoIter<Word>;

    fn into_iter(self) -> Self::IntoIter {
        self.words.into_iter()
    }
}

impl<'a> IntoIterator for &'a Sentence {
    type Item = &'a Word;
    type IntoIter = std::slice::Iter<'a, Word>;

    fn into_iter(self) -> Self::IntoIter {
        self.words.iter()
    }
}

impl TryFrom<&[&str]> for Sentence {
    type Error = ProtocolError;

    fn try_from(words: &[&str]) -> Result<Self, Self::Error> {
        words.iter().map(|w| Word::new(w)).collect()
    }
}

impl<const N: usize> TryFrom<[&str; N]> for Sentence {
    type Error = ProtocolError;

    fn try_from(words: [&str; N]) -> Result<Self, Self::Error> {
        Sentence::try_from(&words[..])
    }
}

impl fmt::Debug for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.words).finish()
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{word}")?;
        }
        Ok(())
    }
}
