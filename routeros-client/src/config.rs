//! Connection settings.

use std::time::Duration;

use routeros_proto::codec::MAX_WORD_LEN;

use crate::{
    connection::Mode,
    error::{Error, Result},
};

/// Default port of the plaintext API service.
pub const API_PORT: u16 = 8728;

/// Settings applied when a [`Connection`](crate::Connection) is opened.
#[derive(Debug, Clone)]
pub struct Config {
    /// Timeout for establishing the TCP connection. `None` waits for the OS.
    pub connect_timeout: Option<Duration>,
    /// Timeout for blocking reads. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    /// Timeout for blocking writes. `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
    /// Disable Nagle's algorithm.
    pub nodelay: bool,
    /// Mode the connection starts in.
    pub mode: Mode,
    /// Longest word accepted from the router.
    pub max_word_len: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            read_timeout: None,
            write_timeout: Some(Duration::from_secs(10)),
            nodelay: true,
            mode: Mode::Simple,
            max_word_len: MAX_WORD_LEN,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for [`Config`]
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the blocking read timeout
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the blocking write timeout
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Enable or disable `TCP_NODELAY`
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Set the initial mode
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the longest word accepted from the router
    pub fn max_word_len(mut self, len: u32) -> Self {
        self.config.max_word_len = len;
        self
    }

    /// Validate and build the config
    pub fn build(self) -> Result<Config> {
        let config = self.config;
        let zero = Some(Duration::ZERO);
        if config.connect_timeout == zero
            || config.read_timeout == zero
            || config.write_timeout == zero
        {
            return Err(Error::Config("timeouts must be non-zero".into()));
        }
        if config.max_word_len == 0 || config.max_word_len > MAX_WORD_LEN {
            return Err(Error::Config(format!(
                "max_word_len must be between 1 and {MAX_WORD_LEN:#x}"
            )));
        }
        Ok(config)
    }
}
