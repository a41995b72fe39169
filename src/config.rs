//! Server-wide tuning knobs.
//!
//! Maps directly onto the `MKC_*` options `mklib_config` accepted as a tagged variadic call
//! (`MKC_WORKERS`, `MKC_TIMEOUT`, `MKC_KEEPALIVE`, `MKC_KEEPALIVETIMEOUT`,
//! `MKC_MAXKEEPALIVEREQUEST`, `MKC_MAXREQUESTSIZE`, `MKC_SYMLINK`, `MKC_HIDEVERSION`,
//! `MKC_DEFAULTMIMETYPE`, `MKC_RESUME`, `MKC_USERDIR`, `MKC_INDEXFILE`), reworked as plain struct
//! fields set through [`crate::server::ServerBuilder`]'s typed methods instead of a variadic call.

use std::time::Duration;

/// Server-wide configuration. Constructed through
/// [`ServerBuilder`](crate::server::ServerBuilder); the defaults mirror `mklib_init`'s.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of worker shards. Defaults to the online CPU count, same as
    /// `sysconf(_SC_NPROCESSORS_ONLN)` in `mklib_init`.
    pub workers: usize,
    /// How long a connection may sit without completing a request's header block before it is
    /// closed.
    pub timeout: Duration,
    /// Whether keep-alive is offered at all. HTTP/1.0 clients never get it regardless.
    pub keep_alive: bool,
    /// How long an idle keep-alive connection may wait for the next request.
    pub keep_alive_timeout: Duration,
    /// Requests allowed on one keep-alive connection before it is closed regardless of the
    /// `Connection` header.
    pub max_keep_alive_requests: u32,
    /// Maximum accepted size of a request body.
    pub max_request_size: usize,
    /// Maximum accepted size of the request line plus header block.
    pub max_header_bytes: usize,
    /// Initial capacity of a connection's read buffer.
    pub read_buffer_size: usize,
    /// Initial capacity of a connection's write buffer.
    pub write_buffer_size: usize,
    /// Suppress the server's name/version in the `Server` response header.
    pub hide_version: bool,
    /// Honor `Range` requests for partial content.
    pub resume: bool,
    /// Follow symlinks when resolving a request path to a file under the document root.
    pub symlink: bool,
    /// MIME type served when no registered extension matches.
    pub default_mimetype: String,
    /// Filenames tried, in order, when a request resolves to a directory.
    pub index_files: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            timeout: Duration::from_secs(15),
            keep_alive: true,
            keep_alive_timeout: Duration::from_secs(15),
            max_keep_alive_requests: 50,
            max_request_size: 10 * 1024 * 1024,
            max_header_bytes: 8 * 1024,
            read_buffer_size: 8 * 1024,
            write_buffer_size: 8 * 1024,
            hide_version: false,
            resume: true,
            symlink: false,
            default_mimetype: "text/plain".to_string(),
            index_files: vec!["index.html".to_string()],
        }
    }
}
