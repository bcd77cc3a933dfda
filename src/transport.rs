//! Reliable blocking transport over a byte-stream connection.
//!
//! TCP gives no message boundaries and no guarantee that one `read` or
//! `write` moves the requested amount, so every transfer here loops until
//! the full amount is done. An interrupted call is retried; any other
//! failure closes the connection and nothing is resent.

use crate::error::TransportError;
use bytes::{Buf, Bytes, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use tracing::{debug, trace};

/// Longest ASCII length header accepted before the delimiter.
const MAX_LENGTH_HEADER: usize = 20;

/// A byte-stream the transport can drive and close.
pub trait Connection: Read + Write {
    /// Close both directions of the stream.
    fn close(&mut self) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            // Peer already gone
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Open a TCP connection to `address` with Nagle disabled.
pub fn connect(address: &str) -> io::Result<TcpStream> {
    let addr = address.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("could not resolve {address}"),
        )
    })?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(true)?;
    socket.connect(&addr.into())?;

    Ok(socket.into())
}

/// Loop-based send/receive over a single connection.
#[derive(Debug)]
pub struct Transport<C: Connection> {
    conn: C,
    /// Upper bound on the bytes handed to a single write or read call.
    max_segment: usize,
    closed: bool,
}

impl<C: Connection> Transport<C> {
    pub fn new(conn: C, max_segment: usize) -> Self {
        Self {
            conn,
            max_segment: max_segment.max(1),
            closed: false,
        }
    }

    /// Write all of `data`, at most `max_segment` bytes per call.
    pub fn send_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;

        let mut offset = 0;
        while offset < data.len() {
            let end = data.len().min(offset.saturating_add(self.max_segment));
            match self.conn.write(&data[offset..end]) {
                Ok(0) => {
                    return Err(self.fail(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection accepted no bytes",
                    )))
                }
                Ok(n) => {
                    trace!(written = n, offset, total = data.len(), "Partial write");
                    offset += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(e)),
            }
        }

        if let Err(e) = self.conn.flush() {
            return Err(self.fail(e));
        }

        debug!(bytes = data.len(), "Sent");
        Ok(())
    }

    /// Read exactly `n` bytes.
    pub fn recv_exact(&mut self, n: usize) -> Result<BytesMut, TransportError> {
        self.ensure_open()?;

        let mut buf = BytesMut::with_capacity(n);
        self.fill(&mut buf, n)?;

        debug!(bytes = n, "Received");
        Ok(buf)
    }

    /// Read an ASCII decimal length terminated by `delimiter`, then exactly
    /// that many payload bytes. Returns the payload.
    pub fn recv_until_delimiter(&mut self, delimiter: u8) -> Result<Bytes, TransportError> {
        self.ensure_open()?;

        let mut buf = BytesMut::with_capacity(MAX_LENGTH_HEADER);
        let header_end = loop {
            if let Some(pos) = buf.iter().position(|&b| b == delimiter) {
                break pos;
            }
            if buf.len() > MAX_LENGTH_HEADER {
                return Err(self.fail_protocol(TransportError::LengthHeaderTooLong(
                    MAX_LENGTH_HEADER,
                )));
            }
            let window = self.max_segment.min(MAX_LENGTH_HEADER + 1);
            self.read_some(&mut buf, window)?;
        };

        let header = buf.split_to(header_end);
        buf.advance(1);

        let len = match parse_length(&header) {
            Some(len) => len,
            None => {
                let text = String::from_utf8_lossy(&header).into_owned();
                return Err(self.fail_protocol(TransportError::InvalidLength(text)));
            }
        };

        if buf.len() > len {
            let extra = buf.len() - len;
            return Err(self.fail_protocol(TransportError::TrailingBytes(extra)));
        }

        self.fill(&mut buf, len)?;

        debug!(bytes = len, "Received delimited payload");
        Ok(buf.freeze())
    }

    /// Close the connection. Only the first call reaches the stream.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.conn.close() {
            debug!(error = %e, "Error while closing connection");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The underlying connection.
    #[cfg(test)]
    pub fn connection(&self) -> &C {
        &self.conn
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    /// Read until `buf` holds `target` bytes, never past it.
    fn fill(&mut self, buf: &mut BytesMut, target: usize) -> Result<(), TransportError> {
        while buf.len() < target {
            let want = (target - buf.len()).min(self.max_segment);
            self.read_some(buf, want)?;
        }
        Ok(())
    }

    /// One successful read of at most `max` bytes appended to `buf`.
    fn read_some(&mut self, buf: &mut BytesMut, max: usize) -> Result<usize, TransportError> {
        let start = buf.len();
        buf.resize(start + max, 0);
        loop {
            match self.conn.read(&mut buf[start..]) {
                Ok(0) => {
                    buf.truncate(start);
                    return Err(self.fail(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by peer",
                    )));
                }
                Ok(n) => {
                    buf.truncate(start + n);
                    trace!(read = n, "Partial read");
                    return Ok(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    buf.truncate(start);
                    return Err(self.fail(e));
                }
            }
        }
    }

    fn fail(&mut self, e: io::Error) -> TransportError {
        self.close();
        TransportError::Io(e)
    }

    fn fail_protocol(&mut self, e: TransportError) -> TransportError {
        self.close();
        e
    }
}

fn parse_length(header: &[u8]) -> Option<usize> {
    if header.is_empty() || !header.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(header).ok()?.parse().ok()
}
