//! An embeddable HTTP/1.1 server core.
//!
//! A bound listening socket is served by an acceptor thread ([`listener`]) that hands each
//! accepted connection to one of several worker shards ([`worker`]), each running its own
//! `mio::Poll` event loop over a connection table it owns exclusively — no connection is ever
//! touched by more than one thread. Requests are parsed without copying header bytes
//! ([`parser`]) and served by the default static-file pipeline ([`pipeline`]), resolved against
//! configured virtual hosts ([`vhost`]).
//!
//! Configure and launch a server through [`server::ServerBuilder`]:
//!
//! ```no_run
//! use std::path::PathBuf;
//! use corehttpd::server::ServerBuilder;
//!
//! let server = ServerBuilder::new("127.0.0.1:8080".parse().unwrap())
//!     .virtual_host(vec!["localhost".to_string()], PathBuf::from("/srv/www"))
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let running = server.start().unwrap();
//! // ...
//! running.stop();
//! ```

pub mod buffer;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod listener;
pub mod mime;
pub mod net;
pub mod parser;
pub mod pipeline;
pub mod server;
pub mod vhost;
pub mod worker;

pub use config::Config;
pub use error::ConfigError;
pub use server::{RunningServer, Server, ServerBuilder};
