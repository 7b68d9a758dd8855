//! The byte stream a [`Connection`](crate::Connection) runs over.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
};

/// A bidirectional byte stream that can switch between blocking and non-blocking reads.
///
/// In non-blocking mode `read` must fail with [`io::ErrorKind::WouldBlock`] when no data
/// is available, and return `Ok(0)` only when the peer closed the stream.
pub trait Transport: Read + Write {
    /// Switches the stream between blocking and non-blocking operation.
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()>;

    /// Closes the stream.
    fn close(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }

    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}
