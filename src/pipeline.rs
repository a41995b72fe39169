//! The default request pipeline: virtual host resolution, pluggable request hooks, and static
//! file serving.
//!
//! The four hook points mirror `mklib_callback_set`'s `MKCB_IPCHECK` / `MKCB_URLCHECK` /
//! `MKCB_DATA` / `MKCB_CLOSE`, reworked from C function pointers plus a `void *data` into trait
//! objects. Path-traversal prevention and MIME lookup follow `http-file`'s `serve()`:
//! percent-decode the target, walk its `Path::components()` rejecting anything but
//! `Normal`/`CurDir`, and look the extension up for a `Content-Type`.

use std::{
    fs,
    io::Read as _,
    net::SocketAddr,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use percent_encoding::percent_decode_str;
use tracing::warn;

use crate::{
    clock::Clock,
    config::Config,
    connection::Connection,
    mime::MimeRegistry,
    parser::{response::ResponseWriter, HeaderToc, Method, ParseError, Request, Status, Version},
    vhost::VirtualHosts,
};

/// Runs before virtual host resolution. Returning `false` rejects the connection outright (no
/// response is written; the connection is closed).
pub trait IpCheckHook: Send + Sync {
    fn check(&self, peer: SocketAddr) -> bool;
}

/// Runs after the request target is percent-decoded but before it is resolved to a filesystem
/// path. Receives the method, the decoded path, and the request's header table (`headers.get(raw,
/// name)` looks a header up). Returning `false` yields a 404.
pub trait UrlCheckHook: Send + Sync {
    fn check(&self, method: Method, path: &str, headers: &HeaderToc, raw: &[u8]) -> bool;
}

/// Lets the embedder serve a response directly instead of the built-in static file handler.
/// Returning `None` falls through to static file serving.
pub trait DataHook: Send + Sync {
    fn handle(&self, request: &Request, raw: &[u8]) -> Option<(Status, Vec<u8>, &'static str)>;
}

/// Invoked once a connection is fully closed, mirroring `MKCB_CLOSE`'s
/// `(peer, status, bytes_in, bytes_out)` signature decided on for this crate.
pub trait CloseHook: Send + Sync {
    fn on_close(&self, peer: SocketAddr, status: u16, bytes_in: u64, bytes_out: u64);
}

/// The registered hook implementations, if any. Each slot defaults to a no-op.
#[derive(Default, Clone)]
pub struct Callbacks {
    pub ip_check: Option<Arc<dyn IpCheckHook>>,
    pub url_check: Option<Arc<dyn UrlCheckHook>>,
    pub data: Option<Arc<dyn DataHook>>,
    pub close: Option<Arc<dyn CloseHook>>,
}

/// Resolves requests against configured virtual hosts and serves static files, with hook points
/// an embedder can use to intercept any stage.
pub struct Pipeline {
    vhosts: Arc<VirtualHosts>,
    config: Arc<Config>,
    mime: MimeRegistry,
    callbacks: Callbacks,
}

impl Pipeline {
    pub fn new(vhosts: Arc<VirtualHosts>, config: Arc<Config>) -> Self {
        Self {
            vhosts,
            config,
            mime: MimeRegistry::new("application/octet-stream"),
            callbacks: Callbacks::default(),
        }
    }

    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_mime_registry(mut self, mime: MimeRegistry) -> Self {
        self.mime = mime;
        self
    }

    /// Services one fully-parsed request, writing a response onto the connection's write buffer.
    /// Returns whether the connection should remain open for another request.
    pub fn dispatch(&self, connection: &mut Connection, request: &Request, clock: &Clock) -> bool {
        let peer = connection.peer_addr();

        if let Some(hook) = &self.callbacks.ip_check {
            if !hook.check(peer) {
                connection.set_last_status(0);
                return false;
            }
        }

        let raw = connection.request_bytes();
        let host_header = request
            .headers()
            .get(raw, "Host")
            .map(|h| h.split(':').next().unwrap_or(h));

        let keep_alive_requested = self.wants_keep_alive(request, raw);

        if let Some(content_length) = request
            .headers()
            .get(raw, "Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            if content_length > self.config.max_request_size as u64 {
                return self.write_error(connection, Status::ContentTooLarge, clock, false);
            }
        }

        let vhost = match self.vhosts.resolve(host_header) {
            Some(vhost) => vhost,
            None => {
                return self.write_error(connection, Status::NotFound, clock, keep_alive_requested);
            }
        };

        if let Some(hook) = &self.callbacks.data {
            if let Some((status, body, content_type)) = hook.handle(request, raw) {
                return self.write_body(
                    connection,
                    status,
                    &body,
                    content_type,
                    clock,
                    keep_alive_requested,
                    request.method(),
                );
            }
        }

        if !matches!(request.method(), Method::Get | Method::Head) {
            return self.write_error(connection, Status::MethodNotAllowed, clock, keep_alive_requested);
        }

        let path = request.path(raw);
        let decoded = match percent_decode_str(path).decode_utf8() {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => {
                return self.write_error(connection, Status::BadRequest, clock, keep_alive_requested);
            }
        };

        if let Some(hook) = &self.callbacks.url_check {
            if !hook.check(request.method(), &decoded, request.headers(), raw) {
                return self.write_error(connection, Status::NotFound, clock, keep_alive_requested);
            }
        }

        let resolved = match resolve_path(vhost.document_root(), &decoded, self.config.symlink) {
            Some(path) => path,
            None => {
                return self.write_error(connection, Status::Forbidden, clock, keep_alive_requested);
            }
        };

        let resolved = if resolved.is_dir() {
            match self.index_file(&resolved) {
                Some(index) => index,
                None => {
                    return self.write_error(connection, Status::NotFound, clock, keep_alive_requested);
                }
            }
        } else {
            resolved
        };

        self.serve_file(connection, request, &resolved, clock, keep_alive_requested)
    }

    /// Writes a protocol-error response for a request that could not be fully parsed.
    pub fn dispatch_error(&self, connection: &mut Connection, error: ParseError, clock: &Clock) {
        let status = error.status().unwrap_or(Status::BadRequest);
        self.write_error(connection, status, clock, false);
    }

    pub fn on_close(&self, connection: &Connection) {
        if let Some(hook) = &self.callbacks.close {
            hook.on_close(
                connection.peer_addr(),
                connection.last_status(),
                connection.bytes_in(),
                connection.bytes_out(),
            );
        }
    }

    fn wants_keep_alive(&self, request: &Request, raw: &[u8]) -> bool {
        if !self.config.keep_alive {
            return false;
        }
        match request.headers().get(raw, "Connection") {
            Some(value) => !value.eq_ignore_ascii_case("close"),
            None => request.version() == Version::Http11,
        }
    }

    fn index_file(&self, dir: &Path) -> Option<PathBuf> {
        self.config
            .index_files
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    fn serve_file(
        &self,
        connection: &mut Connection,
        request: &Request,
        path: &Path,
        clock: &Clock,
        keep_alive_requested: bool,
    ) -> bool {
        let raw = connection.request_bytes();
        let accepts_gzip = request
            .headers()
            .get(raw, "Accept-Encoding")
            .map(|value| value.split(',').any(|enc| enc.trim().eq_ignore_ascii_case("gzip")))
            .unwrap_or(false);

        let gzip_path = path.with_extension(match path.extension() {
            Some(ext) => format!("{}.gz", ext.to_string_lossy()),
            None => "gz".to_string(),
        });
        let (serve_path, content_encoding) = if accepts_gzip && gzip_path.is_file() {
            (gzip_path.as_path(), Some("gzip"))
        } else {
            (path, None)
        };

        let metadata = match fs::metadata(serve_path) {
            Ok(m) if m.is_file() => m,
            _ => return self.write_error(connection, Status::NotFound, clock, keep_alive_requested),
        };

        if let Some(if_modified_since) = request.headers().get(raw, "If-Modified-Since") {
            if not_modified(&metadata, if_modified_since) {
                return self.write_status_only(connection, Status::NotModified, clock, keep_alive_requested);
            }
        }

        let mut file = match fs::File::open(serve_path) {
            Ok(f) => f,
            Err(_) => return self.write_error(connection, Status::NotFound, clock, keep_alive_requested),
        };

        let mut body = Vec::with_capacity(metadata.len() as usize);
        if file.read_to_end(&mut body).is_err() {
            return self.write_error(connection, Status::InternalServerError, clock, keep_alive_requested);
        }

        let content_type = self.mime.lookup(path).to_string();
        let last_modified = metadata
            .modified()
            .ok()
            .map(httpdate::fmt_http_date)
            .unwrap_or_default();

        if self.config.resume {
            if let Some(range_header) = request.headers().get(raw, "Range") {
                if let Some((start, end)) = parse_byte_range(range_header, body.len()) {
                    let slice = &body[start..=end];
                    let mut response = ResponseWriter::new(request.version(), Status::PartialContent);
                    response.header("Date", clock.formatted_date());
                    response.header("Content-Type", &content_type);
                    if let Some(encoding) = content_encoding {
                        response.header("Content-Encoding", encoding);
                    }
                    response.header("Content-Range", format!("bytes {start}-{end}/{}", body.len()));
                    if !last_modified.is_empty() {
                        response.header("Last-Modified", &last_modified);
                    }
                    response.connection(keep_alive_requested);
                    response.content_length(slice.len() as u64);
                    if !self.config.hide_version {
                        response.header("Server", "corehttpd");
                    }
                    return self.finish(connection, &response, Some(slice), Status::PartialContent, keep_alive_requested, request.method());
                }
                return self.write_error(connection, Status::RangeNotSatisfiable, clock, keep_alive_requested);
            }
        }

        let mut response = ResponseWriter::new(request.version(), Status::Ok);
        response.header("Date", clock.formatted_date());
        response.header("Content-Type", &content_type);
        if let Some(encoding) = content_encoding {
            response.header("Content-Encoding", encoding);
        }
        if !last_modified.is_empty() {
            response.header("Last-Modified", &last_modified);
        }
        response.connection(keep_alive_requested);
        response.content_length(body.len() as u64);
        if !self.config.hide_version {
            response.header("Server", "corehttpd");
        }

        self.finish(connection, &response, Some(&body), Status::Ok, keep_alive_requested, request.method())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_body(
        &self,
        connection: &mut Connection,
        status: Status,
        body: &[u8],
        content_type: &str,
        clock: &Clock,
        keep_alive_requested: bool,
        method: Method,
    ) -> bool {
        let mut response = ResponseWriter::new(Version::Http11, status);
        response.header("Date", clock.formatted_date());
        response.header("Content-Type", content_type);
        let keep_alive = keep_alive_requested && status.allows_keep_alive();
        response.connection(keep_alive);
        response.content_length(body.len() as u64);
        self.finish(connection, &response, Some(body), status, keep_alive, method)
    }

    fn write_status_only(
        &self,
        connection: &mut Connection,
        status: Status,
        clock: &Clock,
        keep_alive_requested: bool,
    ) -> bool {
        let mut response = ResponseWriter::new(Version::Http11, status);
        response.header("Date", clock.formatted_date());
        response.connection(keep_alive_requested && status.allows_keep_alive());
        self.finish(connection, &response, None, status, keep_alive_requested, Method::Get)
    }

    fn write_error(
        &self,
        connection: &mut Connection,
        status: Status,
        clock: &Clock,
        keep_alive_requested: bool,
    ) -> bool {
        let keep_alive = keep_alive_requested && status.allows_keep_alive();
        let body = status.reason().as_bytes();
        let mut response = ResponseWriter::new(Version::Http11, status);
        response.header("Date", clock.formatted_date());
        response.header("Content-Type", "text/plain");
        response.connection(keep_alive);
        response.content_length(body.len() as u64);
        self.finish(connection, &response, Some(body), status, keep_alive, Method::Get)
    }

    fn finish(
        &self,
        connection: &mut Connection,
        response: &ResponseWriter,
        body: Option<&[u8]>,
        status: Status,
        keep_alive: bool,
        method: Method,
    ) -> bool {
        connection.set_last_status(status.code());
        let buf = connection.write_buf();
        if response.write_head(buf).is_err() {
            return false;
        }
        if method != Method::Head {
            if let Some(body) = body {
                if std::io::Write::write_all(buf, body).is_err() {
                    return false;
                }
            }
        }
        keep_alive
    }
}

/// Resolves `decoded_path` (already percent-decoded, leading `/` included) under `root`,
/// rejecting any component that could escape it. Mirrors `http-file`'s `path_check`.
fn resolve_path(root: &Path, decoded_path: &str, allow_symlinks: bool) -> Option<PathBuf> {
    let mut result = root.to_path_buf();
    for component in Path::new(decoded_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                warn!(path = decoded_path, "rejected request target escaping document root");
                return None;
            }
        }
    }

    if !allow_symlinks {
        if let Ok(canonical) = result.canonicalize() {
            if !canonical.starts_with(root.canonicalize().ok()?) {
                return None;
            }
            return Some(canonical);
        }
    }

    Some(result)
}

fn not_modified(metadata: &fs::Metadata, if_modified_since: &str) -> bool {
    let modified = match metadata.modified() {
        Ok(m) => m,
        Err(_) => return false,
    };
    let since = match httpdate::parse_http_date(if_modified_since) {
        Ok(d) => d,
        Err(_) => return false,
    };
    modified.duration_since(SystemTime::UNIX_EPOCH).ok() <= since.duration_since(SystemTime::UNIX_EPOCH).ok()
}

/// Parses a single-range `bytes=start-end` header (the only form this server supports; multipart
/// ranges are out of scope) into an inclusive `(start, end)` pair clamped to `len`.
fn parse_byte_range(header: &str, len: usize) -> Option<(usize, usize)> {
    let spec = header.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;

    if len == 0 {
        return None;
    }

    if start.is_empty() {
        let suffix_len: usize = end.parse().ok()?;
        let suffix_len = suffix_len.min(len);
        return Some((len - suffix_len, len - 1));
    }

    let start: usize = start.parse().ok()?;
    let end: usize = if end.is_empty() {
        len - 1
    } else {
        end.parse::<usize>().ok()?.min(len - 1)
    };

    if start > end || start >= len {
        return None;
    }

    Some((start, end))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_simple_byte_range() {
        assert_eq!(parse_byte_range("bytes=0-99", 1000), Some((0, 99)));
    }

    #[test]
    fn parses_open_ended_range() {
        assert_eq!(parse_byte_range("bytes=900-", 1000), Some((900, 999)));
    }

    #[test]
    fn parses_suffix_range() {
        assert_eq!(parse_byte_range("bytes=-100", 1000), Some((900, 999)));
    }

    #[test]
    fn rejects_multipart_ranges() {
        assert_eq!(parse_byte_range("bytes=0-10,20-30", 1000), None);
    }

    #[test]
    fn rejects_out_of_bounds_start() {
        assert_eq!(parse_byte_range("bytes=5000-6000", 1000), None);
    }

    #[test]
    fn resolve_path_rejects_parent_dir_traversal() {
        let root = std::env::temp_dir();
        assert!(resolve_path(&root, "/../etc/passwd", true).is_none());
    }

    #[test]
    fn resolve_path_accepts_plain_relative_path() {
        let root = std::env::temp_dir();
        let resolved = resolve_path(&root, "/a/b.txt", true).unwrap();
        assert_eq!(resolved, root.join("a").join("b.txt"));
    }
}
