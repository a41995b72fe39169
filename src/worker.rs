//! A worker shard: one OS thread, one `mio::Poll`, one fd-keyed connection table.
//!
//! Grounded on the teacher's `Worker::run` dispatch loop (`event.is_readable()` /
//! `event.is_writable()` driving `read()`/`parse()`/`write()`), but with the mutex-per-connection
//! contention the teacher's own TODO comment in that file worried about designed away entirely:
//! each shard owns its connections exclusively, so there is nothing to lock. A connection's
//! `mio::Token` is its raw file descriptor, so the shard's `HashMap<Token, Connection>` key is
//! never self-assigned the way `slab::Slab`'s would be — the "slot = fd" invariant is structural,
//! not just documented.

use std::{
    collections::HashMap,
    os::fd::AsRawFd,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{atomic::AtomicBool, Arc, Barrier, Mutex},
    time::Duration,
};

use crossbeam_channel::Receiver;
use mio::{event::Source, Events, Poll, Token, Waker};
use tracing::{error, warn};

use crate::{
    clock::Clock,
    config::Config,
    connection::{Connection, ConnectionState},
    listener::Accepted,
    pipeline::Pipeline,
};

const NEW_CONNECTION_TOKEN: Token = Token(usize::MAX - 1);

/// Point-in-time counters for one shard, surfaced through the embedding API's worker-info call.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    pub active_connections: usize,
    pub requests_served: u64,
}

/// One worker shard's event loop and exclusively-owned connection table.
pub struct Worker {
    id: usize,
    poll: Poll,
    new_connections: Receiver<Accepted>,
    connections: HashMap<Token, Connection>,
    config: Arc<Config>,
    pipeline: Pipeline,
    clock: Arc<Clock>,
    requests_served: u64,
}

impl Worker {
    pub fn new(
        id: usize,
        new_connections: Receiver<Accepted>,
        config: Arc<Config>,
        pipeline: Pipeline,
        clock: Arc<Clock>,
    ) -> std::io::Result<(Self, Arc<Waker>)> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), NEW_CONNECTION_TOKEN)?);

        let worker = Self {
            id,
            poll,
            new_connections,
            connections: HashMap::new(),
            pipeline,
            config,
            clock,
            requests_served: 0,
        };
        Ok((worker, waker))
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            active_connections: self.connections.len(),
            requests_served: self.requests_served,
        }
    }

    fn accept_pending(&mut self) {
        while let Ok(accepted) = self.new_connections.try_recv() {
            let fd = accepted.stream.as_raw_fd();
            let token = Token(fd as usize);

            let netio = match accepted.netio.build(accepted.stream) {
                Ok(n) => n,
                Err(e) => {
                    warn!(worker = self.id, error = %e, "failed to build transport for accepted connection");
                    continue;
                }
            };

            let mut connection = Connection::new(
                token,
                netio,
                accepted.peer_addr,
                self.config.read_buffer_size,
                self.config.write_buffer_size,
            );
            connection.set_state(ConnectionState::Active);

            if let Err(e) = connection.register(self.poll.registry(), token, connection.interest()) {
                warn!(worker = self.id, error = %e, "failed to register accepted connection");
                continue;
            }

            self.connections.insert(token, connection);
        }
    }

    fn close(&mut self, token: Token) {
        if let Some(mut connection) = self.connections.remove(&token) {
            let _ = connection.deregister(self.poll.registry());
            connection.shutdown();
            self.pipeline.on_close(&connection);
        }
    }

    fn service(&mut self, token: Token, readable: bool, writable: bool) {
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.service_inner(token, readable, writable)
        }));

        match result {
            Ok(Some(requests)) => self.requests_served += requests,
            Ok(None) => {}
            Err(panic) => {
                error!(worker = self.id, ?token, "connection handler panicked, closing connection");
                drop(panic);
                self.close(token);
            }
        }
    }

    /// Returns the number of complete requests serviced on this connection during this call, or
    /// `None` if the connection was not found (already closed).
    fn service_inner(&mut self, token: Token, readable: bool, writable: bool) -> Option<u64> {
        let mut requests = 0u64;
        let mut should_close = false;

        {
            let connection = self.connections.get_mut(&token)?;

            if readable {
                connection.set_state(ConnectionState::ReadingRequest);
                match connection.fill() {
                    Ok(0) => should_close = true,
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(_) => should_close = true,
                }
            }

            while !should_close {
                match connection.try_parse(self.config.max_header_bytes) {
                    Ok(Some((request, consumed))) => {
                        connection.set_state(ConnectionState::Dispatched);
                        let keep_alive = self.pipeline.dispatch(connection, &request, self.clock.as_ref());
                        connection.consume_request_head(consumed);
                        requests += 1;

                        should_close = !keep_alive
                            || connection.requests_served() + 1 >= self.config.max_keep_alive_requests;
                        connection.reset_for_next_request();
                        connection.set_state(ConnectionState::WritingResponse);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.pipeline.dispatch_error(connection, e, self.clock.as_ref());
                        should_close = true;
                        break;
                    }
                }
            }

            if writable || connection.has_pending_write() {
                if let Err(e) = connection.flush() {
                    if e.kind() != std::io::ErrorKind::WouldBlock {
                        should_close = true;
                    }
                }
            }

            if should_close && !connection.has_pending_write() {
                connection.set_state(ConnectionState::Draining);
            }

            if !should_close || connection.has_pending_write() {
                let interest = connection.interest();
                if connection.reregister(self.poll.registry(), token, interest).is_err() {
                    should_close = true;
                }
            }
        }

        if should_close {
            let still_pending = self
                .connections
                .get(&token)
                .map(|c| c.has_pending_write())
                .unwrap_or(false);
            if !still_pending {
                self.close(token);
            }
        }

        Some(requests)
    }

    fn sweep_timeouts(&mut self) {
        let now = std::time::Instant::now();
        let header_timeout = self.config.timeout;
        let idle_timeout = self.config.keep_alive_timeout;

        let expired: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, c)| {
                let elapsed = now.duration_since(c.last_activity());
                let limit = match c.state() {
                    ConnectionState::ReadingRequest | ConnectionState::New => header_timeout,
                    _ => idle_timeout,
                };
                elapsed > limit
            })
            .map(|(token, _)| *token)
            .collect();

        for token in expired {
            self.close(token);
        }
    }

    /// Runs this shard's event loop until `running` is cleared. `ready` is signaled once this
    /// shard's poller is registered, so the acceptor thread never races a worker that has not
    /// started listening yet. `stats` is updated once per poll wakeup for
    /// [`crate::server::RunningServer::scheduler_worker_info`].
    pub fn run(
        mut self,
        running: Arc<AtomicBool>,
        ready: Arc<Barrier>,
        stats: Arc<Mutex<HashMap<usize, WorkerStats>>>,
    ) {
        use std::sync::atomic::Ordering;

        let id = self.id;
        ready.wait();

        let mut events = Events::with_capacity(1024);
        while running.load(Ordering::Acquire) {
            match self.poll.poll(&mut events, Some(Duration::from_millis(500))) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(worker = id, error = %e, "worker poll failed");
                    return;
                }
            }

            for event in events.iter() {
                if event.token() == NEW_CONNECTION_TOKEN {
                    self.accept_pending();
                    continue;
                }
                self.service(event.token(), event.is_readable(), event.is_writable());
            }

            self.sweep_timeouts();
            stats.lock().expect("worker stats mutex poisoned").insert(id, self.stats());
        }
    }
}
