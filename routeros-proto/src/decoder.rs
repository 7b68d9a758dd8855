//! Incremental sentence decoding.
//!
//! [`SentenceDecoder`] is a pull parser: the caller asks for the slice the current frame
//! still needs ([`SentenceDecoder::unfilled`]), reads into it from wherever bytes come from,
//! and reports how many bytes arrived ([`SentenceDecoder::advance`]). The decoder never asks
//! for more than the current frame needs, so a reader driving it never consumes bytes
//! belonging to the next frame. A read returning fewer bytes than asked for is the normal
//! suspension point, not an error.

use std::{
    io::{self, Read},
    mem,
};

use crate::{
    codec::{MAX_HEADER_LEN, MAX_WORD_LEN, decode_length, header_len},
    error::{ProtocolError, StreamError},
    sentence::Sentence,
    word::Word,
};

/// Where the decoder is inside the current frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameState {
    /// No frame in flight, or part of a length header received.
    AwaitingLength {
        /// Header bytes received so far.
        header: [u8; MAX_HEADER_LEN],
        /// Number of valid bytes in `header`.
        filled: usize,
        /// Header length announced by the first byte, 1 until it is known.
        needed: usize,
    },
    /// Header decoded, body partially received.
    AwaitingBody {
        /// Length of the word.
        expected: usize,
        /// Body bytes received so far.
        received: usize,
        /// Word buffer, `expected` bytes long.
        buffer: Vec<u8>,
    },
}

impl FrameState {
    fn awaiting_length() -> Self {
        FrameState::AwaitingLength {
            header: [0; MAX_HEADER_LEN],
            filled: 0,
            needed: 1,
        }
    }
}

impl Default for FrameState {
    fn default() -> Self {
        Self::awaiting_length()
    }
}

/// Result of feeding bytes to a [`SentenceDecoder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// The current frame is still incomplete.
    Partial,
    /// A word was completed and appended to the sentence in progress.
    Word,
    /// A terminator was seen: the sentence is complete.
    Sentence(Sentence),
}

/// Assembles sentences from frames arriving in arbitrary chunks.
///
/// Holds exactly one sentence in progress, shared by all the frames composing it,
/// and reset to empty the moment its terminator is seen.
#[derive(Debug, Clone)]
pub struct SentenceDecoder {
    state: FrameState,
    words: Vec<Word>,
    max_word_len: u32,
}

impl Default for SentenceDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceDecoder {
    /// Creates a decoder accepting words up to [`MAX_WORD_LEN`] bytes.
    pub fn new() -> Self {
        Self::with_max_word_len(MAX_WORD_LEN)
    }

    /// Creates a decoder rejecting words longer than `max_word_len` bytes.
    ///
    /// The limit is capped at [`MAX_WORD_LEN`].
    pub fn with_max_word_len(max_word_len: u32) -> Self {
        Self {
            state: FrameState::default(),
            words: Vec::new(),
            max_word_len: max_word_len.min(MAX_WORD_LEN),
        }
    }

    /// The current frame state.
    pub fn state(&self) -> &FrameState {
        &self.state
    }

    /// Whether neither a frame nor a sentence is in progress.
    pub fn is_idle(&self) -> bool {
        self.words.is_empty()
            && matches!(self.state, FrameState::AwaitingLength { filled: 0, .. })
    }

    /// Number of words of the sentence in progress.
    pub fn pending_words(&self) -> usize {
        self.words.len()
    }

    /// Drops any partial frame and sentence.
    pub fn reset(&mut self) {
        self.state = FrameState::default();
        self.words.clear();
    }

    /// The bytes the current frame still needs. Never empty.
    pub fn unfilled(&mut self) -> &mut [u8] {
        match &mut self.state {
            FrameState::AwaitingLength {
                header,
                filled,
                needed,
            } => &mut header[*filled..*needed],
            FrameState::AwaitingBody {
                received, buffer, ..
            } => &mut buffer[*received..],
        }
    }

    /// Records that `n` bytes were written to the start of [`unfilled`](Self::unfilled).
    ///
    /// # Errors
    ///
    /// Fails on an invalid or oversized length header, or if the word buffer can not be
    /// allocated. The decoder is reset in both cases.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the length of the slice returned by `unfilled`.
    pub fn advance(&mut self, n: usize) -> Result<Progress, ProtocolError> {
        let result = self.advance_inner(n);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn advance_inner(&mut self, n: usize) -> Result<Progress, ProtocolError> {
        if n == 0 {
            return Ok(Progress::Partial);
        }
        match &mut self.state {
            FrameState::AwaitingLength {
                header,
                filled,
                needed,
            } => {
                assert!(*filled + n <= *needed, "advanced past the length header");
                if *filled == 0 {
                    *needed = header_len(header[0])?;
                }
                *filled += n;
                if *filled < *needed {
                    return Ok(Progress::Partial);
                }
                let Some((len, _)) = decode_length(&header[..*needed])? else {
                    return Ok(Progress::Partial);
                };
                self.begin_frame(len)
            }
            FrameState::AwaitingBody {
                expected,
                received,
                buffer,
            } => {
                assert!(*received + n <= *expected, "advanced past the word body");
                *received += n;
                if *received < *expected {
                    return Ok(Progress::Partial);
                }
                let word = Word::from_wire(mem::take(buffer));
                self.words.push(word);
                self.state = FrameState::default();
                Ok(Progress::Word)
            }
        }
    }

    fn begin_frame(&mut self, len: u32) -> Result<Progress, ProtocolError> {
        if len == 0 {
            self.state = FrameState::default();
            let sentence = Sentence::from(mem::take(&mut self.words));
            return Ok(Progress::Sentence(sentence));
        }
        if len > self.max_word_len {
            return Err(ProtocolError::FrameTooLarge {
                len: len.into(),
                limit: self.max_word_len,
            });
        }
        // Checked above: at most MAX_WORD_LEN, which fits any usize of 32 bits or more.
        let expected = len as usize;
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(expected)
            .map_err(|e| ProtocolError::allocation(expected, e))?;
        buffer.resize(expected, 0);
        self.state = FrameState::AwaitingBody {
            expected,
            received: 0,
            buffer,
        };
        Ok(Progress::Partial)
    }

    /// Feeds a chunk of bytes, returning every sentence it completes.
    ///
    /// Bytes after the last complete sentence are kept as the sentence in progress.
    pub fn feed(&mut self, mut data: &[u8]) -> Result<Vec<Sentence>, ProtocolError> {
        let mut sentences = Vec::new();
        while !data.is_empty() {
            let unfilled = self.unfilled();
            let n = unfilled.len().min(data.len());
            unfilled[..n].copy_from_slice(&data[..n]);
            data = &data[n..];
            if let Progress::Sentence(sentence) = self.advance(n)? {
                sentences.push(sentence);
            }
        }
        Ok(sentences)
    }

    /// Reads from a blocking stream until a sentence completes.
    ///
    /// Continues the sentence in progress, if any. Consumes nothing past the terminator.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the stream ends first.
    pub fn read_sentence<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
    ) -> Result<Sentence, StreamError> {
        loop {
            let n = match reader.read(self.unfilled()) {
                Ok(0) => return Err(StreamError::Closed),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if let Progress::Sentence(sentence) = self.advance(n)? {
                return Ok(sentence);
            }
        }
    }
}
