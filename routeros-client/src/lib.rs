#![warn(missing_docs)]
//! # routeros-client
//!
//! Synchronous client for the MikroTik RouterOS API.
//!
//! A [`Connection`] is used in one of two ways:
//!
//! - **Blocking**: [`Connection::send_and_wait`] and [`Connection::read_sentence`] wait for
//!   the router's answer.
//! - **Event-driven**: after [`Connection::set_mode`] with [`Mode::Event`], requests are sent
//!   with [`Connection::send_with_callback`] and the application calls
//!   [`Connection::step`] every time its own readiness loop reports the socket as readable.
//!   Callbacks run from inside `step`.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use routeros_client::{Connection, Mode, Sentence, API_PORT};
//!
//! let mut conn = Connection::connect(("192.168.88.1", API_PORT))?;
//! if !conn.login("admin", "password")? {
//!     panic!("invalid credentials");
//! }
//!
//! let reply = conn.send_and_wait(&Sentence::command("/system/identity/print")?)?;
//! println!("{:?}", reply.get("name"));
//!
//! conn.set_mode(Mode::Event)?;
//! conn.send_with_listener(Sentence::command("/interface/print")?, |reply| {
//!     println!("{reply}");
//! })?;
//! // In the application's readiness loop, whenever the socket is readable:
//! conn.drain()?;
//! # Ok::<(), routeros_client::Error>(())
//! ```

mod auth;
/// Connection settings.
pub mod config;
/// The connection and its event loop.
pub mod connection;
/// Error types.
pub mod error;
/// Byte stream abstraction.
pub mod transport;

pub use config::{API_PORT, Config, ConfigBuilder};
pub use connection::{Connection, Mode, StepStatus};
pub use error::{Error, Result};
pub use routeros_proto::{ProtocolError, Reply, ReplyKind, Sentence, Tag, Word};
pub use transport::Transport;
