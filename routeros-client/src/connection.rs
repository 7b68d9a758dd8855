use std::{
    io,
    net::{TcpStream, ToSocketAddrs},
};

use routeros_proto::{
    FrameState, PendingRequests, Progress, ProtocolError, Reply, ReplyKind, Sentence,
    SentenceDecoder, Tag, Word,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    config::Config,
    error::{Error, Result},
    transport::Transport,
};

/// How replies are read from the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Blocking reads: every call waits for the data it needs.
    #[default]
    Simple,
    /// Non-blocking reads driven by [`Connection::step`] whenever the stream is readable.
    Event,
}

/// Outcome of a single [`Connection::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// No more data right now. Call `step` again once the stream is readable.
    WouldBlock,
    /// Part of a word body was received. The rest may already be waiting.
    Partial,
    /// A word was received. More data may already be waiting.
    Word,
    /// A sentence was completed and dispatched. More data may already be waiting.
    Delivered {
        /// Kind of the dispatched reply.
        kind: ReplyKind,
        /// Whether a registered callback received it.
        handled: bool,
    },
}

impl StepStatus {
    /// Whether `step` can be called again without waiting for readiness.
    pub fn more_pending(self) -> bool {
        !matches!(self, StepStatus::WouldBlock)
    }
}

type Callback = Box<dyn FnOnce(Reply) + Send>;
type Listener = Box<dyn FnMut(Reply) + Send>;

enum Handler {
    /// Consumes the first reply carrying the tag.
    Once(Callback),
    /// Receives every reply carrying the tag, up to the terminal one.
    Listener(Listener),
}

/// A connection to the RouterOS API.
///
/// Owns the byte stream and all protocol state: the requests waiting for a tagged
/// reply and the sentence being received. Replies are read either by blocking calls
/// ([`send_and_wait`](Self::send_and_wait), [`read_sentence`](Self::read_sentence)) or, in
/// [`Mode::Event`], by calling [`step`](Self::step) each time an external readiness
/// notifier (select, poll, epoll...) reports the stream as readable.
///
/// A connection is not thread-safe. Blocking calls and `step` touch the same stream and
/// the same state, so they must never run concurrently.
pub struct Connection<T: Transport = TcpStream> {
    transport: T,
    mode: Mode,
    pending: PendingRequests<Handler>,
    decoder: SentenceDecoder,
    unhandled: Option<Listener>,
    poisoned: bool,
}

impl Connection<TcpStream> {
    /// Connects to the API service at `addr` with the default [`Config`].
    ///
    /// # Examples
    /// ```no_run
    /// let mut conn = Connection::connect(("192.168.88.1", API_PORT))?;
    /// ```
    ///
    /// # Attention 🚨
    /// The connection is not encrypted (plaintext API connection over 8728/tcp port).
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::connect_with(addr, &Config::default())
    }

    /// Connects to the API service at `addr`.
    pub fn connect_with(addr: impl ToSocketAddrs, config: &Config) -> Result<Self> {
        let stream = match config.connect_timeout {
            Some(timeout) => connect_timeout(addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };
        stream.set_nodelay(config.nodelay)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        info!(peer = ?stream.peer_addr().ok(), "connected");

        Self::from_transport(stream, config)
    }
}

fn connect_timeout(addr: impl ToSocketAddrs, timeout: std::time::Duration) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address to connect to"))
        .into())
}

impl<T: Transport> Connection<T> {
    /// Wraps an already connected transport.
    pub fn from_transport(transport: T, config: &Config) -> Result<Self> {
        let mut conn = Self {
            transport,
            mode: Mode::Simple,
            pending: PendingRequests::new(),
            decoder: SentenceDecoder::with_max_word_len(config.max_word_len),
            unhandled: None,
            poisoned: false,
        };
        conn.transport.set_nonblocking(false)?;
        conn.set_mode(config.mode)?;
        Ok(conn)
    }

    /// The current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switches between blocking and event-driven reads.
    ///
    /// Entering [`Mode::Event`] drops any partially received sentence. Pending requests
    /// are kept.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.transport.set_nonblocking(mode == Mode::Event)?;
        if mode == Mode::Event && self.mode != Mode::Event {
            self.decoder.reset();
        }
        self.mode = mode;
        Ok(())
    }

    /// Number of requests waiting for a tagged reply.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether an earlier failure left the connection unusable.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// The underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// Sets the handler receiving replies that match no pending request, including
    /// untagged replies such as `!fatal`. Without one, such replies are logged and dropped.
    pub fn set_unhandled_handler<F>(&mut self, handler: F)
    where
        F: FnMut(Reply) + Send + 'static,
    {
        self.unhandled = Some(Box::new(handler));
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        Ok(())
    }

    /// Sends a sentence without waiting for a reply.
    ///
    /// # Errors
    ///
    /// If the sentence can not be written completely the connection is poisoned: the
    /// router's parser is left at an unknown position and every later call fails with
    /// [`Error::Poisoned`].
    pub fn send(&mut self, sentence: &Sentence) -> Result<()> {
        self.ensure_usable()?;
        let data = sentence.encode()?;
        debug!(%sentence, "sending");

        let mut written = 0;
        while written < data.len() {
            match self.transport.write(&data[written..]) {
                Ok(0) => return Err(self.write_failed(written, data.len(), None)),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.write_failed(written, data.len(), Some(e))),
            }
        }
        if let Err(e) = self.transport.flush() {
            return Err(self.write_failed(written, data.len(), Some(e)));
        }
        Ok(())
    }

    fn write_failed(&mut self, written: usize, expected: usize, source: Option<io::Error>) -> Error {
        error!(written, expected, error = ?source, "sentence not fully written");
        self.poisoned = true;
        Error::WriteFailed {
            written,
            expected,
            source,
        }
    }

    /// Blocks until the next sentence has been received.
    ///
    /// Returns the sentence as is, whatever its tag: a multi-row reply is read by calling
    /// this repeatedly until `!done` shows up. In [`Mode::Event`] the transport is made
    /// blocking for the duration of the call.
    pub fn read_sentence(&mut self) -> Result<Sentence> {
        self.ensure_usable()?;
        let event = self.mode == Mode::Event;
        if event {
            self.transport.set_nonblocking(false)?;
        }
        let result = self.decoder.read_sentence(&mut self.transport);
        if event {
            self.transport.set_nonblocking(true)?;
        }

        match result {
            Ok(sentence) => {
                debug!(%sentence, "received");
                Ok(sentence)
            }
            Err(e) => {
                let e = Error::from(e);
                if !matches!(e, Error::Io(_)) {
                    self.poisoned = true;
                }
                Err(e)
            }
        }
    }

    /// Sends a sentence and blocks until the next sentence has been received.
    ///
    /// Only one sentence is read: see [`read_sentence`](Self::read_sentence).
    pub fn send_and_wait(&mut self, sentence: &Sentence) -> Result<Sentence> {
        self.send(sentence)?;
        self.read_sentence()
    }

    /// Sends a sentence tagged with a fresh tag and registers `callback` for its reply.
    ///
    /// The callback runs exactly once, from [`step`](Self::step), with the first reply
    /// carrying the tag. Use [`send_with_listener`](Self::send_with_listener) to receive
    /// every row of a multi-row reply.
    pub fn send_with_callback<F>(&mut self, sentence: Sentence, callback: F) -> Result<Tag>
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        self.send_tagged(sentence, Handler::Once(Box::new(callback)))
    }

    /// Sends a sentence tagged with a fresh tag and registers `listener` for its replies.
    ///
    /// The listener receives every reply carrying the tag and is dropped after the
    /// terminal one (`!done` or `!fatal`).
    pub fn send_with_listener<F>(&mut self, sentence: Sentence, listener: F) -> Result<Tag>
    where
        F: FnMut(Reply) + Send + 'static,
    {
        self.send_tagged(sentence, Handler::Listener(Box::new(listener)))
    }

    fn send_tagged(&mut self, mut sentence: Sentence, handler: Handler) -> Result<Tag> {
        self.ensure_usable()?;
        if let Some(tag) = sentence.get_tag() {
            return Err(Error::AlreadyTagged(tag.into_owned()));
        }
        let tag = self.pending.register(handler);
        let result = Word::new(&format!(".tag={tag}"))
            .map_err(Error::from)
            .and_then(|word| {
                sentence.add(word);
                self.send(&sentence)
            });
        match result {
            Ok(()) => Ok(tag),
            Err(e) => {
                self.pending.remove(&tag);
                Err(e)
            }
        }
    }

    /// Cancels the request registered under `tag`.
    ///
    /// Sends `/cancel` to the router. The registered callback will not run; replies still
    /// in flight for the cancelled command are discarded when they arrive. Returns whether
    /// a request was pending under `tag`.
    pub fn cancel(&mut self, tag: &str) -> Result<bool> {
        self.ensure_usable()?;
        let was_pending = match self.pending.get_mut(tag) {
            Some(handler) => {
                *handler = Handler::Listener(Box::new(|_: Reply| {}));
                true
            }
            None => false,
        };
        let cancel = Sentence::command("/cancel")?.with_attribute("tag", tag)?;
        self.send_with_listener(cancel, |_| {})?;
        debug!(tag, was_pending, "cancel sent");
        Ok(was_pending)
    }

    /// Advances the non-blocking reader by at most one frame.
    ///
    /// Finishes the length header if one is in progress (it is at most five bytes), then
    /// makes a single read of the word body. A body that is still incomplete after that read
    /// yields [`StepStatus::Partial`]. When the zero-length terminator arrives the sentence
    /// is classified and dispatched: to the callback registered for its tag, else to the
    /// unhandled handler. Returns [`StepStatus::WouldBlock`] as soon as a read would block;
    /// the frame in progress is kept and completed by later calls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] when the router closed the connection, and
    /// [`ProtocolError::EmptySentence`](routeros_proto::ProtocolError::EmptySentence) for a
    /// sentence without words. The latter leaves the connection usable.
    pub fn step(&mut self) -> Result<StepStatus> {
        self.ensure_usable()?;
        loop {
            let reading_body = matches!(self.decoder.state(), FrameState::AwaitingBody { .. });
            let n = match self.transport.read(self.decoder.unfilled()) {
                Ok(0) => {
                    info!(
                        partial = !self.decoder.is_idle(),
                        "router closed the connection"
                    );
                    self.poisoned = true;
                    return Err(Error::ConnectionClosed);
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(StepStatus::WouldBlock);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.poisoned = true;
                    return Err(e.into());
                }
            };
            trace!(n, state = ?self.decoder.state(), "read");

            match self.decoder.advance(n) {
                Ok(Progress::Partial) if reading_body => return Ok(StepStatus::Partial),
                Ok(Progress::Partial) => continue,
                Ok(Progress::Word) => return Ok(StepStatus::Word),
                Ok(Progress::Sentence(sentence)) => return self.dispatch(sentence),
                Err(e) => {
                    error!(error = %e, "invalid data from router");
                    self.poisoned = true;
                    return Err(e.into());
                }
            }
        }
    }

    /// Calls [`step`](Self::step) until a read would block.
    ///
    /// Returns the number of sentences dispatched. Only meaningful in [`Mode::Event`]: in
    /// [`Mode::Simple`] this blocks until the router closes the connection.
    pub fn drain(&mut self) -> Result<usize> {
        let mut delivered = 0;
        loop {
            match self.step()? {
                StepStatus::WouldBlock => return Ok(delivered),
                StepStatus::Partial | StepStatus::Word => {}
                StepStatus::Delivered { .. } => delivered += 1,
            }
        }
    }

    fn dispatch(&mut self, sentence: Sentence) -> Result<StepStatus> {
        if sentence.is_empty() {
            warn!("router sent an empty sentence");
            return Err(ProtocolError::EmptySentence.into());
        }
        let reply = Reply::from(sentence);
        let kind = reply.kind();
        debug!(%reply, "received");
        if kind == ReplyKind::Fatal {
            error!(reason = ?reply.message(), "router sent !fatal");
        }

        let handled = match self.deliver(reply) {
            Ok(()) => true,
            Err(reply) => {
                match self.unhandled.as_mut() {
                    Some(handler) => handler(reply),
                    None => warn!(%reply, "unhandled event"),
                }
                false
            }
        };
        Ok(StepStatus::Delivered { kind, handled })
    }

    /// Hands `reply` to the handler registered for its tag, or gives it back.
    fn deliver(&mut self, reply: Reply) -> std::result::Result<(), Reply> {
        let Some(tag) = reply.tag().map(str::to_owned) else {
            return Err(reply);
        };
        let terminal = reply.is_terminal();
        match self.pending.get_mut(&tag) {
            Some(Handler::Listener(listener)) => {
                listener(reply);
                if terminal {
                    self.pending.remove(&tag);
                }
                Ok(())
            }
            Some(Handler::Once(_)) => {
                if let Some(Handler::Once(callback)) = self.pending.remove(&tag) {
                    callback(reply);
                }
                Ok(())
            }
            None => Err(reply),
        }
    }

    /// Closes the connection. Pending callbacks are dropped without being called.
    pub fn disconnect(mut self) -> Result<()> {
        let abandoned = self.pending.len();
        self.pending.clear();
        self.decoder.reset();
        self.transport.close()?;
        info!(abandoned, "disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::transport::mock::MockTransport;

    fn encoded(words: &[&str]) -> Vec<u8> {
        Sentence::try_from(words).unwrap().encode().unwrap()
    }

    fn decode_all(mut data: &[u8]) -> Vec<Sentence> {
        let mut sentences = Vec::new();
        while !data.is_empty() {
            sentences.push(Sentence::decode_from(&mut data).unwrap());
        }
        sentences
    }

    fn connection(mode: Mode) -> (Connection<MockTransport>, MockTransport) {
        let mock = MockTransport::default();
        let config = Config::builder().mode(mode).build().unwrap();
        let conn = Connection::from_transport(mock.clone(), &config).unwrap();
        (conn, mock)
    }

    #[test]
    fn test_send_encodes_sentence() {
        let (mut conn, mock) = connection(Mode::Simple);
        let sentence = Sentence::try_from(["/interface/print", "=stats="]).unwrap();

        conn.send(&sentence).unwrap();

        assert_eq!(mock.take_written(), sentence.encode().unwrap());
    }

    #[test]
    fn test_short_write_poisons_connection() {
        let (mut conn, mock) = connection(Mode::Simple);
        mock.0.borrow_mut().write_limit = Some(5);
        let sentence = Sentence::try_from(["/interface/print"]).unwrap();

        let err = conn.send(&sentence).unwrap_err();

        assert!(matches!(
            err,
            Error::WriteFailed {
                written: 5,
                expected: 18,
                ..
            }
        ));
        assert!(conn.is_poisoned());
        assert!(matches!(conn.send(&sentence), Err(Error::Poisoned)));
    }

    #[test]
    fn test_send_and_wait_reads_one_sentence() {
        let (mut conn, mock) = connection(Mode::Simple);
        let mut replies = encoded(&["!re", "=name=ether1"]);
        replies.extend(encoded(&["!done"]));
        mock.push(replies);

        let reply = conn
            .send_and_wait(&Sentence::try_from(["/interface/print"]).unwrap())
            .unwrap();
        assert_eq!(reply.get("name").as_deref(), Some("ether1"));

        let done = conn.read_sentence().unwrap();
        assert_eq!(ReplyKind::of(&done), ReplyKind::Done);
    }

    #[test]
    fn test_read_sentence_closed_mid_frame() {
        let (mut conn, mock) = connection(Mode::Simple);
        mock.push(vec![0x05, b'!', b'd']);

        assert!(matches!(conn.read_sentence(), Err(Error::ConnectionClosed)));
        assert!(conn.is_poisoned());
    }

    #[test]
    fn test_read_sentence_in_event_mode_blocks_temporarily() {
        let (mut conn, mock) = connection(Mode::Event);
        assert!(mock.is_nonblocking());
        mock.push(encoded(&["!done"]));

        let sentence = conn.read_sentence().unwrap();

        assert_eq!(ReplyKind::of(&sentence), ReplyKind::Done);
        assert!(mock.is_nonblocking());
    }

    #[test]
    fn test_send_with_callback_appends_tag() {
        let (mut conn, mock) = connection(Mode::Event);

        let tag = conn
            .send_with_callback(
                Sentence::try_from(["/system/resource/print"]).unwrap(),
                |_| {},
            )
            .unwrap();

        let sent = decode_all(&mock.take_written());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].words()[0].as_bytes(), b"/system/resource/print");
        assert_eq!(sent[0].get_tag().as_deref(), Some(tag.as_str()));
        assert_eq!(conn.pending_len(), 1);
    }

    #[test]
    fn test_callback_invoked_once_per_registration() {
        let (mut conn, mock) = connection(Mode::Event);
        let (tx, rx) = mpsc::channel();

        let tag = conn
            .send_with_callback(Sentence::try_from(["/interface/print"]).unwrap(), move |r| {
                tx.send(r).unwrap();
            })
            .unwrap();
        let tag_word = format!(".tag={tag}");
        mock.push(encoded(&["!re", "=name=ether1", &tag_word]));
        mock.push(encoded(&["!done", &tag_word]));

        assert_eq!(conn.drain().unwrap(), 2);

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.kind(), ReplyKind::Data);
        assert_eq!(reply.get("name").as_deref(), Some("ether1"));
        assert!(rx.try_recv().is_err());
        assert_eq!(conn.pending_len(), 0);
    }

    #[test]
    fn test_tag_correlation_out_of_order() {
        let (mut conn, mock) = connection(Mode::Event);
        let (tx, rx) = mpsc::channel();

        let tx_a = tx.clone();
        let a = conn
            .send_with_callback(Sentence::try_from(["/a"]).unwrap(), move |r| {
                tx_a.send(("a", r)).unwrap();
            })
            .unwrap();
        let b = conn
            .send_with_callback(Sentence::try_from(["/b"]).unwrap(), move |r| {
                tx.send(("b", r)).unwrap();
            })
            .unwrap();
        assert_ne!(a, b);

        mock.push(encoded(&["!done", &format!(".tag={b}"), "=ret=from-b"]));
        mock.push(encoded(&["!done", &format!(".tag={a}"), "=ret=from-a"]));
        mock.push(encoded(&["!done", ".tag=unknown"]));

        assert_eq!(conn.step().unwrap(), StepStatus::Word);
        conn.drain().unwrap();

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].0, "b");
        assert_eq!(received[0].1.get("ret").as_deref(), Some("from-b"));
        assert_eq!(received[1].0, "a");
        assert_eq!(received[1].1.get("ret").as_deref(), Some("from-a"));
        assert_eq!(conn.pending_len(), 0);
        assert!(!conn.is_poisoned());
    }

    #[test]
    fn test_unregistered_tag_goes_to_unhandled_handler() {
        let (mut conn, mock) = connection(Mode::Event);
        let (tx, rx) = mpsc::channel();
        conn.set_unhandled_handler(move |r| tx.send(r).unwrap());

        mock.push(encoded(&["!re", ".tag=99", "=x=1"]));
        mock.push(encoded(&["!fatal", "session terminated"]));

        let mut statuses = Vec::new();
        loop {
            match conn.step().unwrap() {
                StepStatus::WouldBlock => break,
                StepStatus::Partial | StepStatus::Word => {}
                status => statuses.push(status),
            }
        }

        assert_eq!(
            statuses,
            vec![
                StepStatus::Delivered {
                    kind: ReplyKind::Data,
                    handled: false
                },
                StepStatus::Delivered {
                    kind: ReplyKind::Fatal,
                    handled: false
                },
            ]
        );
        let unhandled: Vec<_> = rx.try_iter().collect();
        assert_eq!(unhandled.len(), 2);
        assert_eq!(unhandled[1].message().as_deref(), Some("session terminated"));
    }

    #[test]
    fn test_step_partial_reads_match_single_chunk() {
        fn run(feed: impl Fn(&MockTransport, &[u8])) -> (Vec<Reply>, Vec<StepStatus>) {
            let (mut conn, mock) = connection(Mode::Event);
            let (tx, rx) = mpsc::channel();
            let tag = conn
                .send_with_listener(Sentence::try_from(["/log/print"]).unwrap(), move |r| {
                    tx.send(r).unwrap();
                })
                .unwrap();
            let tag_word = format!(".tag={tag}");
            let long = format!("=message={}", "y".repeat(300));
            let mut data = encoded(&["!re", &long, &tag_word]);
            data.extend(encoded(&["!done", &tag_word]));
            feed(&mock, &data);

            let mut statuses = Vec::new();
            for _ in 0..10_000 {
                match conn.step().unwrap() {
                    StepStatus::Partial | StepStatus::Word => {}
                    status => statuses.push(status),
                }
                if conn.pending_len() == 0 {
                    break;
                }
            }
            statuses.retain(|s| *s != StepStatus::WouldBlock);
            (rx.try_iter().collect(), statuses)
        }

        let whole = run(|mock, data| mock.push(data.to_vec()));
        let trickled = run(|mock, data| {
            for byte in data {
                mock.push(vec![*byte]);
                mock.push_would_block();
            }
        });

        assert_eq!(whole.0.len(), 2);
        assert_eq!(whole, trickled);
        assert_eq!(whole.0[0].kind(), ReplyKind::Data);
        assert_eq!(whole.0[1].kind(), ReplyKind::Done);
    }

    #[test]
    fn test_step_would_block_keeps_partial_frame() {
        let (mut conn, mock) = connection(Mode::Event);
        mock.push(vec![0x03, b'!']);

        assert_eq!(conn.step().unwrap(), StepStatus::Partial);
        assert_eq!(conn.step().unwrap(), StepStatus::WouldBlock);

        mock.push(vec![b'r', b'e', 0x00]);
        assert_eq!(conn.step().unwrap(), StepStatus::Word);
        assert_eq!(
            conn.step().unwrap(),
            StepStatus::Delivered {
                kind: ReplyKind::Data,
                handled: false
            }
        );
        assert_eq!(conn.step().unwrap(), StepStatus::WouldBlock);
    }

    #[test]
    fn test_step_makes_one_body_read() {
        let (mut conn, mock) = connection(Mode::Event);
        mock.push(vec![0x05, b'!']);
        for byte in b"done" {
            mock.push(vec![*byte]);
        }

        assert_eq!(conn.step().unwrap(), StepStatus::Partial);
        assert_eq!(mock.0.borrow().reads.len(), 4);
        assert_eq!(conn.step().unwrap(), StepStatus::Partial);
        assert_eq!(mock.0.borrow().reads.len(), 3);

        assert_eq!(conn.drain().unwrap(), 0);
        assert!(mock.0.borrow().reads.is_empty());
        mock.push(vec![0x00]);
        assert_eq!(
            conn.step().unwrap(),
            StepStatus::Delivered {
                kind: ReplyKind::Done,
                handled: false
            }
        );
    }

    #[test]
    fn test_empty_sentence_is_an_error() {
        let (mut conn, mock) = connection(Mode::Event);
        mock.push(vec![0x00]);

        assert!(matches!(
            conn.step(),
            Err(Error::Protocol(ProtocolError::EmptySentence))
        ));
        assert!(!conn.is_poisoned());

        mock.push(encoded(&["!done"]));
        assert_eq!(conn.step().unwrap(), StepStatus::Word);
        assert_eq!(
            conn.step().unwrap(),
            StepStatus::Delivered {
                kind: ReplyKind::Done,
                handled: false
            }
        );
    }

    #[test]
    fn test_tagged_send_rejects_existing_tag() {
        let (mut conn, mock) = connection(Mode::Event);

        let err = conn
            .send_with_callback(Sentence::try_from(["/a", ".tag=7"]).unwrap(), |_| {})
            .unwrap_err();

        assert!(matches!(err, Error::AlreadyTagged(tag) if tag == "7"));
        assert_eq!(conn.pending_len(), 0);
        assert!(mock.take_written().is_empty());
        assert!(!conn.is_poisoned());
    }

    #[test]
    fn test_step_peer_closed() {
        let (mut conn, mock) = connection(Mode::Event);
        mock.push(vec![0x03, b'!']);
        assert_eq!(conn.step().unwrap(), StepStatus::Partial);

        mock.0.borrow_mut().nonblocking = false;
        assert!(matches!(conn.step(), Err(Error::ConnectionClosed)));
        assert!(matches!(conn.step(), Err(Error::Poisoned)));
    }

    #[test]
    fn test_step_invalid_header_poisons() {
        let (mut conn, mock) = connection(Mode::Event);
        mock.push(vec![0xF8]);

        assert!(matches!(
            conn.step(),
            Err(Error::Protocol(ProtocolError::ControlByte(0xF8)))
        ));
        assert!(conn.is_poisoned());
    }

    #[test]
    fn test_set_mode_event_resets_partial_sentence() {
        let (mut conn, mock) = connection(Mode::Event);
        let (tx, rx) = mpsc::channel();
        conn.set_unhandled_handler(move |r| tx.send(r).unwrap());
        mock.push(vec![0x03, b'!', b'r', b'e', 0x02, b'=']);
        assert_eq!(conn.step().unwrap(), StepStatus::Word);
        assert_eq!(conn.step().unwrap(), StepStatus::Partial);
        assert_eq!(conn.step().unwrap(), StepStatus::WouldBlock);

        conn.set_mode(Mode::Simple).unwrap();
        assert!(!mock.is_nonblocking());
        conn.set_mode(Mode::Event).unwrap();
        assert!(mock.is_nonblocking());

        mock.push(encoded(&["!done"]));
        assert_eq!(conn.drain().unwrap(), 1);

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.kind(), ReplyKind::Done);
        assert_eq!(reply.sentence().len(), 1);
    }

    #[test]
    fn test_listener_receives_rows_until_done() {
        let (mut conn, mock) = connection(Mode::Event);
        let (tx, rx) = mpsc::channel();
        let tag = conn
            .send_with_listener(Sentence::try_from(["/interface/print"]).unwrap(), move |r| {
                tx.send(r.kind()).unwrap();
            })
            .unwrap();
        let tag_word = format!(".tag={tag}");
        mock.push(encoded(&["!re", "=name=ether1", &tag_word]));
        mock.push(encoded(&["!re", "=name=ether2", &tag_word]));
        mock.push(encoded(&["!done", &tag_word]));

        assert_eq!(conn.drain().unwrap(), 3);

        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![ReplyKind::Data, ReplyKind::Data, ReplyKind::Done]
        );
        assert_eq!(conn.pending_len(), 0);
    }

    #[test]
    fn test_cancel_sends_cancel_and_discards_late_replies() {
        let (mut conn, mock) = connection(Mode::Event);
        let (tx, rx) = mpsc::channel();
        let tag = conn
            .send_with_callback(
                Sentence::try_from(["/interface/monitor-traffic", "=interface=ether1"]).unwrap(),
                move |r| tx.send(r).unwrap(),
            )
            .unwrap();
        mock.take_written();

        assert!(conn.cancel(&tag).unwrap());

        let sent = decode_all(&mock.take_written());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].words()[0].as_bytes(), b"/cancel");
        assert_eq!(sent[0].get("tag").as_deref(), Some(tag.as_str()));
        let cancel_tag = sent[0].get_tag().unwrap().into_owned();

        let tag_word = format!(".tag={tag}");
        mock.push(encoded(&["!trap", "=category=2", "=message=interrupted", &tag_word]));
        mock.push(encoded(&["!done", &tag_word]));
        mock.push(encoded(&["!done", &format!(".tag={cancel_tag}")]));
        conn.drain().unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(conn.pending_len(), 0);
        assert!(!conn.cancel("12345").unwrap());
    }

    #[test]
    fn test_disconnect_drops_callbacks() {
        let (mut conn, mock) = connection(Mode::Event);
        let (tx, rx) = mpsc::channel::<Reply>();
        conn.send_with_callback(Sentence::try_from(["/a"]).unwrap(), move |r| {
            tx.send(r).unwrap();
        })
        .unwrap();

        conn.disconnect().unwrap();

        assert!(mock.is_closed());
        // The callback (and its sender) was dropped without running.
        assert!(matches!(rx.recv(), Err(mpsc::RecvError)));
    }

    #[test]
    fn test_failed_tagged_send_rolls_back_registration() {
        let (mut conn, mock) = connection(Mode::Event);
        mock.0.borrow_mut().write_limit = Some(0);

        assert!(conn
            .send_with_callback(Sentence::try_from(["/a"]).unwrap(), |_| {})
            .is_err());
        assert_eq!(conn.pending_len(), 0);
    }
}
