//! The acceptor: a single thread owning the listening socket(s) and nothing else.
//!
//! Grounded on the teacher's [`crate::listener`] poll loop (one `mio::Poll`, a sentinel
//! `Token` for the listening socket, `accept()` in a loop until `WouldBlock`), but the accepted
//! stream is handed off to a worker shard over a channel instead of being retained here — the
//! acceptor holds no per-connection state at all, matching Monkey's `mklib_run`, which does
//! nothing but `accept()` and dispatch to `mk_sched_add_client`.

use std::{io::ErrorKind, net::SocketAddr, os::fd::AsRawFd, sync::Arc};

use crossbeam_channel::Sender;
use mio::{net::TcpListener, Events, Interest, Poll, Token, Waker};
use tracing::{debug, warn};

use crate::net::NetioBuilder;

const LISTEN_TOKEN: Token = Token(usize::MAX);

/// A freshly accepted socket, not yet wrapped in a [`crate::connection::Connection`] — that
/// happens on the shard that receives it, so the shard thread (not the acceptor) pays for the TLS
/// handshake object allocation.
pub struct Accepted {
    pub stream: mio::net::TcpStream,
    pub peer_addr: SocketAddr,
    pub netio: NetioBuilder,
}

/// Assigns each accepted connection to a worker shard. The acceptor calls this once per
/// connection; implementations should be cheap (an atomic load and increment, not a lock).
pub trait ShardRouter: Send {
    fn route(&mut self) -> usize;
}

/// Routes connections to shards in round-robin order. Simpler than least-loaded tracking and,
/// since every shard runs an identical event loop, close enough to balanced in practice.
pub struct RoundRobinRouter {
    next: usize,
    shard_count: usize,
}

impl RoundRobinRouter {
    pub fn new(shard_count: usize) -> Self {
        Self {
            next: 0,
            shard_count,
        }
    }
}

impl ShardRouter for RoundRobinRouter {
    fn route(&mut self) -> usize {
        let shard = self.next;
        self.next = (self.next + 1) % self.shard_count;
        shard
    }
}

/// Owns the bound listening socket and forwards every accepted connection to a worker shard.
pub struct Acceptor {
    listener: TcpListener,
    poll: Poll,
    netio: NetioBuilder,
    shard_senders: Vec<Sender<Accepted>>,
    shard_wakers: Vec<Arc<Waker>>,
    router: Box<dyn ShardRouter>,
}

impl Acceptor {
    pub fn bind(
        addr: SocketAddr,
        netio: NetioBuilder,
        shard_senders: Vec<Sender<Accepted>>,
        shard_wakers: Vec<Arc<Waker>>,
        router: Box<dyn ShardRouter>,
    ) -> std::io::Result<Self> {
        let mut listener = TcpListener::bind(addr)?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTEN_TOKEN, Interest::READABLE)?;

        Ok(Self {
            listener,
            poll,
            netio,
            shard_senders,
            shard_wakers,
            router,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    debug!(fd = stream.as_raw_fd(), %peer_addr, "accepted connection");
                    let shard = self.router.route();
                    let accepted = Accepted {
                        stream,
                        peer_addr,
                        netio: self.netio.clone(),
                    };
                    if self.shard_senders[shard].send(accepted).is_ok() {
                        let _ = self.shard_wakers[shard].wake();
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    /// Runs the acceptor loop until `running` reports the server has been asked to stop.
    pub fn run(&mut self, running: &std::sync::atomic::AtomicBool) {
        use std::sync::atomic::Ordering;

        let mut events = Events::with_capacity(16);
        while running.load(Ordering::Acquire) {
            match self.poll.poll(&mut events, Some(std::time::Duration::from_millis(250))) {
                Ok(()) => {
                    for event in events.iter() {
                        if event.token() == LISTEN_TOKEN {
                            self.accept_all();
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "acceptor poll failed");
                    return;
                }
            }
        }
    }
}
