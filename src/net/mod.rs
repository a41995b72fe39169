//! Pluggable transport layer.
//!
//! Monkey's networking was a deployment-time choice between `liana.so` (plaintext) and
//! `liana_ssl.so` (OpenSSL), loaded with `dlopen` per the `Transport` configuration directive.
//! [`Netio`] is the compile-time equivalent: one trait, two implementations
//! ([`PlaintextNetio`] and [`TlsNetio`]) selected by [`NetioBuilder`] when a connection is
//! accepted, with no further branching in the connection state machine afterward.

use std::{
    io::{self, ErrorKind, Read, Write},
    net::SocketAddr,
    sync::Arc,
};

use mio::{event::Source, net::TcpStream, Interest, Registry, Token};
use rustls::{ServerConfig, ServerConnection};

/// A byte-stream transport a connection reads from and writes to, abstracting over plaintext TCP
/// and TLS so the connection state machine in [`crate::connection`] never has to branch on which
/// one it holds.
pub trait Netio: Source + std::fmt::Debug + Send {
    /// Reads as many bytes as are immediately available into `buf`. Returns `Ok(0)` on a clean
    /// shutdown by the peer, `Err(WouldBlock)` when no more bytes are available right now.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes `buf`, returning the number of bytes actually accepted (which may be less than
    /// `buf.len()` under backpressure).
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn flush(&mut self) -> io::Result<()>;

    fn shutdown(&mut self) -> io::Result<()>;

    /// Interest the poller should register for this transport's own housekeeping (TLS handshake
    /// progress). The connection state machine ORs this with `WRITABLE` whenever it has
    /// application bytes queued to send.
    fn transport_interest(&self) -> Interest;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// `true` once the transport has completed whatever negotiation it needs (a no-op for
    /// plaintext, the TLS handshake for [`TlsNetio`]) and application bytes can flow.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Plain TCP, no framing beyond HTTP/1.1 itself.
#[derive(Debug)]
pub struct PlaintextNetio {
    stream: TcpStream,
}

impl PlaintextNetio {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Netio for PlaintextNetio {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown(std::net::Shutdown::Both)
    }

    fn transport_interest(&self) -> Interest {
        Interest::READABLE
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl Source for PlaintextNetio {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.stream.register(registry, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.stream.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.stream.deregister(registry)
    }
}

/// TLS over TCP via `rustls`. Handshake bytes and application bytes share the same underlying
/// `TcpStream`; `rustls::ServerConnection` multiplexes them.
#[derive(Debug)]
pub struct TlsNetio {
    stream: TcpStream,
    tls: Box<ServerConnection>,
}

impl TlsNetio {
    pub fn new(stream: TcpStream, config: Arc<ServerConfig>) -> Result<Self, rustls::Error> {
        let tls = ServerConnection::new(config)?;
        Ok(Self {
            stream,
            tls: Box::new(tls),
        })
    }

    /// The negotiated ALPN protocol, if any. Used to detect an HTTP/2 client immediately after
    /// the handshake completes so the connection can be rejected before any H1 parsing is
    /// attempted (this server speaks HTTP/1.1 only).
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.tls.alpn_protocol()
    }

    fn pump_handshake(&mut self) -> io::Result<()> {
        if self.tls.wants_read() {
            match self.tls.read_tls(&mut self.stream) {
                Ok(0) => return Err(io::Error::new(ErrorKind::UnexpectedEof, "tls eof")),
                Ok(_) => {
                    self.tls
                        .process_new_packets()
                        .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }
        if self.tls.wants_write() {
            self.tls.write_tls(&mut self.stream)?;
        }
        Ok(())
    }
}

impl Netio for TlsNetio {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.pump_handshake()?;
        self.tls.reader().read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.tls.writer().write(buf)?;
        self.tls.write_tls(&mut self.stream)?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        while self.tls.wants_write() {
            self.tls.write_tls(&mut self.stream)?;
        }
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.tls.send_close_notify();
        let _ = self.flush();
        self.stream.shutdown(std::net::Shutdown::Both)
    }

    fn transport_interest(&self) -> Interest {
        if self.tls.wants_write() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    fn is_ready(&self) -> bool {
        !self.tls.is_handshaking()
    }
}

impl Source for TlsNetio {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.stream.register(registry, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.stream.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.stream.deregister(registry)
    }
}

/// Chooses plaintext or TLS for a freshly accepted stream, mirroring the per-listening-socket
/// `Transport` choice Monkey resolved via `load_networking` at startup.
#[derive(Clone)]
pub enum NetioBuilder {
    Plaintext,
    Tls(Arc<ServerConfig>),
}

impl NetioBuilder {
    pub fn build(&self, stream: TcpStream) -> io::Result<Box<dyn Netio>> {
        match self {
            NetioBuilder::Plaintext => Ok(Box::new(PlaintextNetio::new(stream))),
            NetioBuilder::Tls(config) => TlsNetio::new(stream, config.clone())
                .map(|netio| Box::new(netio) as Box<dyn Netio>)
                .map_err(|e| io::Error::new(ErrorKind::Other, e)),
        }
    }
}
