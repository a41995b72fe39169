//! The per-connection state machine: buffering, HTTP/1.1 parsing, and response draining for one
//! accepted socket.
//!
//! A [`Connection`] is keyed by its `mio` [`Token`], which a shard's connection table derives
//! directly from the raw file descriptor rather than handing out an arena index — see
//! [`crate::worker::Worker`]. Everything here is agnostic to whether the underlying transport is
//! plaintext or TLS; that distinction is fully absorbed by [`Netio`].

use std::{
    borrow::{Borrow, BorrowMut},
    fmt,
    io::{self, ErrorKind},
    net::SocketAddr,
    time::Instant,
};

use mio::{event::Source, Interest, Registry, Token};

use crate::{
    buffer::Buffer,
    net::Netio,
    parser::{request::Request, ParseError},
};

/// Where a connection sits in its request/response lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted but not yet registered with the poller.
    New,
    /// Registered and idle, waiting for the next request (or the first one).
    Active,
    /// Bytes have arrived and are being accumulated into a complete request.
    ReadingRequest,
    /// A full request has been parsed and handed to the response pipeline.
    Dispatched,
    /// A response is queued and being drained to the socket.
    WritingResponse,
    /// The response finished but the connection is closing (protocol error, `Connection: close`,
    /// or the keep-alive request limit was reached) rather than returning to `Active`.
    Draining,
    /// Fully closed; the worker will drop this connection from its shard table.
    Closed,
}

/// One accepted connection: its transport, read/write staging buffers, and lifecycle state.
pub struct Connection {
    token: Token,
    peer_addr: SocketAddr,
    netio: Box<dyn Netio>,
    read_buf: Buffer,
    write_buf: Buffer,
    state: ConnectionState,
    requests_served: u32,
    bytes_in: u64,
    bytes_out: u64,
    last_activity: Instant,
    last_status: u16,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("token", &self.token)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state)
            .field("requests_served", &self.requests_served)
            .finish()
    }
}

impl Connection {
    pub fn new(
        token: Token,
        netio: Box<dyn Netio>,
        peer_addr: SocketAddr,
        read_capacity: usize,
        write_capacity: usize,
    ) -> Self {
        Self {
            token,
            peer_addr,
            netio,
            read_buf: Buffer::new(read_capacity),
            write_buf: Buffer::new(write_capacity),
            state: ConnectionState::New,
            requests_served: 0,
            bytes_in: 0,
            bytes_out: 0,
            last_activity: Instant::now(),
            last_status: 0,
        }
    }

    pub fn last_status(&self) -> u16 {
        self.last_status
    }

    pub fn set_last_status(&mut self, status: u16) {
        self.last_status = status;
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn requests_served(&self) -> u32 {
        self.requests_served
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn write_buf(&mut self) -> &mut Buffer {
        &mut self.write_buf
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Advances bookkeeping for the next keep-alive request. The read buffer already had its
    /// consumed header bytes released by [`Self::consume_request_head`] (any pipelined bytes past
    /// it are left intact), and the write buffer keeps whatever response(s) are still queued for
    /// `flush` to drain — clearing either here would discard data the caller has not sent yet.
    pub fn reset_for_next_request(&mut self) {
        self.requests_served += 1;
        self.state = ConnectionState::Active;
    }

    /// Reads as many bytes as the transport currently has available into the read buffer.
    /// Returns `Ok(0)` on a clean peer shutdown.
    pub fn fill(&mut self) -> io::Result<usize> {
        let mut total = 0;
        loop {
            if self.read_buf.remaining_mut() == 0 {
                self.read_buf.reserve(4096);
            }
            let dst: &mut [u8] = self.read_buf.borrow_mut();
            match self.netio.read(dst) {
                Ok(0) => {
                    if total == 0 {
                        return Ok(0);
                    }
                    break;
                }
                Ok(n) => {
                    self.read_buf.mark_written(n);
                    self.bytes_in += n as u64;
                    total += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.touch();
        Ok(total)
    }

    /// Attempts to parse a complete request line and header block out of the bytes accumulated so
    /// far. `Ok(None)` means more bytes are needed; the caller should keep reading.
    pub fn try_parse(&self, max_header_bytes: usize) -> Result<Option<(Request, usize)>, ParseError> {
        let readable: &[u8] = self.read_buf.borrow();
        match crate::parser::request::parse(readable, max_header_bytes) {
            Ok((request, consumed)) => Ok(Some((request, consumed))),
            Err(ParseError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The bytes backing a [`Request`] previously returned by [`Self::try_parse`].
    pub fn request_bytes(&self) -> &[u8] {
        self.read_buf.borrow()
    }

    /// Marks the request-line-plus-headers bytes as consumed. The request body, if any, is left
    /// in the buffer for the pipeline to read directly.
    pub fn consume_request_head(&mut self, consumed: usize) {
        self.read_buf.mark_read(consumed);
    }

    /// Drains as much of the write buffer as the transport will currently accept.
    pub fn flush(&mut self) -> io::Result<usize> {
        let mut total = 0;
        while self.write_buf.remaining() > 0 {
            let src: &[u8] = self.write_buf.borrow();
            match self.netio.write(src) {
                Ok(0) => break,
                Ok(n) => {
                    self.write_buf.mark_read(n);
                    self.bytes_out += n as u64;
                    total += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if self.write_buf.remaining() == 0 {
            let _ = self.netio.flush();
        }
        self.touch();
        Ok(total)
    }

    pub fn has_pending_write(&self) -> bool {
        self.write_buf.remaining() > 0
    }

    pub fn transport_ready(&self) -> bool {
        self.netio.is_ready()
    }

    pub fn interest(&self) -> Interest {
        let transport = self.netio.transport_interest();
        if self.has_pending_write() {
            transport | Interest::WRITABLE
        } else {
            transport
        }
    }

    pub fn shutdown(&mut self) {
        let _ = self.netio.shutdown();
        self.state = ConnectionState::Closed;
    }
}

impl Source for Connection {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.netio.register(registry, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.netio.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.netio.deregister(registry)
    }
}
