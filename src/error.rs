//! Crate-wide error types for the embedding API.

use std::{fmt, io};

/// Failure configuring or starting a [`Server`](crate::server::Server).
#[derive(Debug)]
pub enum ConfigError {
    /// No virtual host was registered before [`ServerBuilder::build`](crate::server::ServerBuilder::build).
    NoVirtualHosts,
    /// `workers` was set to zero.
    ZeroWorkers,
    /// A virtual host alias was longer than [`crate::vhost::MAX_HOSTNAME_LEN`] bytes.
    HostnameTooLong,
    /// TLS was requested but the supplied `rustls` configuration was rejected.
    Tls(rustls::Error),
    /// Binding the listening socket failed.
    Bind(io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoVirtualHosts => write!(f, "no virtual host configured"),
            Self::ZeroWorkers => write!(f, "worker count must be at least 1"),
            Self::HostnameTooLong => write!(f, "virtual host alias exceeds the maximum hostname length"),
            Self::Tls(e) => write!(f, "invalid TLS configuration: {e}"),
            Self::Bind(e) => write!(f, "failed to bind listening socket: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tls(e) => Some(e),
            Self::Bind(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        Self::Bind(e)
    }
}

impl From<rustls::Error> for ConfigError {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e)
    }
}
