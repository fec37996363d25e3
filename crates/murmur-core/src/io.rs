//! The non-blocking I/O contract.
//!
//! Every operation on a [`Stream`] or [`Listener`] returns immediately. When
//! the kernel has nothing to offer (no bytes, no buffer space, no pending
//! connection) the call reports `NotReady` as an ordinary value; only hard
//! failures travel through `Err`. Callers pair these operations with a
//! readiness wait so they never busy-poll.
//!
//! | Operation | Progress | Nothing now | Terminal |
//! |-----------|----------|-------------|----------|
//! | read      | `Data(n)`, `n >= 1` | `NotReady` | `Eof` (orderly close) |
//! | write     | `Accepted(n)`, `n` may be short | `NotReady` (buffer full) | `Err` |
//! | accept    | `Accepted { stream, peer }` | `NotReady` | `Err` |

use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use crate::readiness::Handle;
use crate::sys::nonblock;

/// Result of a non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were placed at the front of the buffer.
    Data(usize),
    /// The peer closed its sending side.
    Eof,
    /// No bytes are available right now.
    NotReady,
}

/// Result of a non-blocking write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// This many bytes were accepted into the outbound buffer.
    Accepted(usize),
    /// The outbound buffer is full.
    NotReady,
}

impl WriteOutcome {
    /// Whether all `len` bytes were accepted.
    pub fn is_complete(self, len: usize) -> bool {
        matches!(self, Self::Accepted(n) if n == len)
    }
}

/// Result of a non-blocking accept.
#[derive(Debug)]
pub enum AcceptOutcome<S> {
    /// A connection was accepted; `stream` is already in non-blocking mode.
    Accepted {
        /// The new connection.
        stream: S,
        /// Remote address of the connection.
        peer: SocketAddr,
    },
    /// No connection is pending.
    NotReady,
}

/// A connected byte stream honouring the non-blocking contract.
pub trait Stream {
    /// Read into `buf` (which must not be empty).
    fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome>;

    /// Attempt a single write of `buf`.
    fn write(&mut self, buf: &[u8]) -> io::Result<WriteOutcome>;

    /// Identity of the underlying descriptor.
    fn handle(&self) -> Handle;
}

/// An accept-capable endpoint honouring the non-blocking contract.
pub trait Listener {
    /// Type of the accepted connections.
    type Stream: Stream;

    /// Accept one pending connection, if any.
    fn accept(&mut self) -> io::Result<AcceptOutcome<Self::Stream>>;

    /// Identity of the underlying descriptor.
    fn handle(&self) -> Handle;
}

/// `WouldBlock` and `Interrupted` both mean "try again after the next wait".
pub fn is_not_ready(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// Map a raw `read(2)` result onto [`ReadOutcome`].
pub fn read_outcome(result: io::Result<usize>) -> io::Result<ReadOutcome> {
    match result {
        Ok(0) => Ok(ReadOutcome::Eof),
        Ok(n) => Ok(ReadOutcome::Data(n)),
        Err(e) if is_not_ready(&e) => Ok(ReadOutcome::NotReady),
        Err(e) => Err(e),
    }
}

/// Map a raw `write(2)` result onto [`WriteOutcome`].
pub fn write_outcome(result: io::Result<usize>) -> io::Result<WriteOutcome> {
    match result {
        Ok(n) => Ok(WriteOutcome::Accepted(n)),
        Err(e) if is_not_ready(&e) => Ok(WriteOutcome::NotReady),
        Err(e) => Err(e),
    }
}

impl Stream for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        debug_assert!(!buf.is_empty(), "zero-length read is indistinguishable from EOF");
        read_outcome(Read::read(self, buf))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<WriteOutcome> {
        write_outcome(Write::write(self, buf))
    }

    fn handle(&self) -> Handle {
        Handle::of(self)
    }
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    fn accept(&mut self) -> io::Result<AcceptOutcome<TcpStream>> {
        match TcpListener::accept(self) {
            Ok((stream, peer)) => {
                // Accepted sockets do not inherit O_NONBLOCK on Linux.
                let _ = nonblock::set_nonblocking(&stream, true)?;
                Ok(AcceptOutcome::Accepted { stream, peer })
            }
            // A connection reset while still queued leaves the listener healthy.
            Err(e) if is_not_ready(&e) || e.kind() == ErrorKind::ConnectionAborted => {
                Ok(AcceptOutcome::NotReady)
            }
            Err(e) => Err(e),
        }
    }

    fn handle(&self) -> Handle {
        Handle::of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    use crate::sys::net::bind_listener;

    fn loopback_pair() -> (TcpListener, TcpStream, TcpStream) {
        let mut listener = bind_listener("127.0.0.1:0".parse().unwrap(), 8).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let server = loop {
            match Listener::accept(&mut listener).unwrap() {
                AcceptOutcome::Accepted { stream, .. } => break stream,
                AcceptOutcome::NotReady => std::thread::yield_now(),
            }
        };
        (listener, client, server)
    }

    #[test]
    fn read_outcome_mapping() {
        assert_eq!(read_outcome(Ok(0)).unwrap(), ReadOutcome::Eof);
        assert_eq!(read_outcome(Ok(5)).unwrap(), ReadOutcome::Data(5));
        let would_block = io::Error::from(ErrorKind::WouldBlock);
        assert_eq!(read_outcome(Err(would_block)).unwrap(), ReadOutcome::NotReady);
        let reset = io::Error::from(ErrorKind::ConnectionReset);
        assert!(read_outcome(Err(reset)).is_err());
    }

    #[test]
    fn write_outcome_mapping() {
        assert_eq!(write_outcome(Ok(3)).unwrap(), WriteOutcome::Accepted(3));
        let interrupted = io::Error::from(ErrorKind::Interrupted);
        assert_eq!(write_outcome(Err(interrupted)).unwrap(), WriteOutcome::NotReady);
        let pipe = io::Error::from(ErrorKind::BrokenPipe);
        assert!(write_outcome(Err(pipe)).is_err());
    }

    #[test]
    fn write_outcome_completeness() {
        assert!(WriteOutcome::Accepted(4).is_complete(4));
        assert!(!WriteOutcome::Accepted(2).is_complete(4));
        assert!(!WriteOutcome::NotReady.is_complete(4));
    }

    #[test]
    fn accept_without_pending_connection_is_not_ready() {
        let mut listener = bind_listener("127.0.0.1:0".parse().unwrap(), 8).unwrap();
        assert_matches!(Listener::accept(&mut listener).unwrap(), AcceptOutcome::NotReady);
    }

    #[test]
    fn accepted_stream_is_non_blocking() {
        let (_listener, _client, server) = loopback_pair();
        assert!(nonblock::is_nonblocking(&server).unwrap());
    }

    #[test]
    fn read_without_data_is_not_ready() {
        let (_listener, _client, mut server) = loopback_pair();
        let mut buf = [0u8; 16];
        assert_eq!(Stream::read(&mut server, &mut buf).unwrap(), ReadOutcome::NotReady);
    }

    #[test]
    fn read_after_peer_close_is_eof() {
        let (_listener, client, mut server) = loopback_pair();
        drop(client);
        let mut buf = [0u8; 16];
        let outcome = loop {
            match Stream::read(&mut server, &mut buf).unwrap() {
                ReadOutcome::NotReady => std::thread::yield_now(),
                other => break other,
            }
        };
        assert_eq!(outcome, ReadOutcome::Eof);
    }

    #[test]
    fn data_flows_both_ways() {
        let (_listener, mut client, mut server) = loopback_pair();
        Write::write_all(&mut client, b"ping\n").unwrap();
        let mut buf = [0u8; 16];
        let n = loop {
            match Stream::read(&mut server, &mut buf).unwrap() {
                ReadOutcome::Data(n) => break n,
                ReadOutcome::NotReady => std::thread::yield_now(),
                ReadOutcome::Eof => panic!("unexpected eof"),
            }
        };
        assert_eq!(&buf[..n], b"ping\n");

        assert_eq!(
            Stream::write(&mut server, b"pong\n").unwrap(),
            WriteOutcome::Accepted(5)
        );
        let mut reply = [0u8; 5];
        Read::read_exact(&mut client, &mut reply).unwrap();
        assert_eq!(&reply, b"pong\n");
    }

    #[test]
    fn handle_matches_descriptor() {
        let (listener, _client, server) = loopback_pair();
        assert_ne!(Listener::handle(&listener), Stream::handle(&server));
    }
}
