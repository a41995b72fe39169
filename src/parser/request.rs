//! Offset-based HTTP/1.1 request-line and header parsing.
//!
//! A [`Request`] never copies header names or values out of the connection buffer. Instead
//! [`HeaderToc`] records the byte range of each header's name and value, the way Monkey's
//! `header_toc_row` array records offsets into its static request-line buffer rather than
//! allocating per-header strings. Callers resolve a header's value with [`HeaderToc::get`], which
//! re-slices the caller-supplied buffer at lookup time.

use super::{raw_request::RawRequest, Method, ParseError, Version};

/// One header's name and value as byte ranges into the buffer the request was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRow {
    name_start: usize,
    name_end: usize,
    value_start: usize,
    value_end: usize,
}

/// A table of header byte-offset rows, resolved against the buffer they were parsed from.
#[derive(Debug, Clone, Default)]
pub struct HeaderToc {
    rows: Vec<HeaderRow>,
}

impl HeaderToc {
    /// Looks up a header by name, case-insensitively, mirroring Monkey's
    /// `mklib_get_request_header`: a row only matches if the byte immediately following the
    /// candidate key is `:`, and an empty value is reported as absent rather than as an empty
    /// string.
    pub fn get<'b>(&self, buf: &'b [u8], key: &str) -> Option<&'b str> {
        let key = key.as_bytes();
        for row in &self.rows {
            if row.name_end <= row.name_start || row.value_end < row.value_start {
                continue;
            }
            let name = &buf[row.name_start..row.name_end];
            if name.len() != key.len() || !name.eq_ignore_ascii_case(key) {
                continue;
            }

            let value = &buf[row.value_start..row.value_end];
            if value.is_empty() {
                return None;
            }
            return std::str::from_utf8(value).ok();
        }
        None
    }

    /// All header names, in wire order, for diagnostics and the embedding API's introspection
    /// calls.
    pub fn names<'b>(&self, buf: &'b [u8]) -> Vec<&'b str> {
        self.rows
            .iter()
            .filter_map(|row| std::str::from_utf8(&buf[row.name_start..row.name_end]).ok())
            .collect()
    }

    /// Number of headers recorded.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A parsed request line and header block. Holds no reference to the buffer it was parsed from;
/// all textual access goes through [`HeaderToc::get`] and [`Request::target`] with the same
/// buffer slice passed to [`parse`].
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    version: Version,
    target_start: usize,
    target_end: usize,
    path_end: usize,
    headers: HeaderToc,
}

impl Request {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderToc {
        &self.headers
    }

    /// The full request target (path plus optional query string) as written on the wire.
    pub fn target<'b>(&self, buf: &'b [u8]) -> &'b str {
        std::str::from_utf8(&buf[self.target_start..self.target_end]).unwrap_or("")
    }

    /// The path component of the request target, with the query string (if any) excluded.
    pub fn path<'b>(&self, buf: &'b [u8]) -> &'b str {
        std::str::from_utf8(&buf[self.target_start..self.path_end]).unwrap_or("")
    }

    /// The query string, excluding the leading `?`, or `None` if the target had no query.
    pub fn query<'b>(&self, buf: &'b [u8]) -> Option<&'b str> {
        if self.path_end >= self.target_end {
            return None;
        }
        std::str::from_utf8(&buf[self.path_end + 1..self.target_end]).ok()
    }
}

fn is_token_char(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#'
            | b'$'
            | b'%'
            | b'&'
            | b'\''
            | b'*'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~'
    ) || b.is_ascii_alphanumeric()
}

fn is_request_target_char(b: u8) -> bool {
    b > 0x20 && b != 0x7f
}

/// Parses a request line and header block out of `buf`, returning the parsed [`Request`] and the
/// number of bytes consumed (the length of the header block including the terminating blank
/// line). Returns [`ParseError::Incomplete`] if `buf` does not yet contain a full header block —
/// callers should read more bytes and retry rather than treat this as a protocol error.
pub fn parse(buf: &[u8], max_header_bytes: usize) -> Result<(Request, usize), ParseError> {
    if buf.len() > max_header_bytes && !contains_header_terminator(buf) {
        return Err(ParseError::HeaderTooLarge);
    }

    let mut cursor = RawRequest::new(buf);

    let method_bytes = cursor
        .take_until(|b| b == b' ')
        .ok_or(ParseError::Incomplete)?;
    cursor.next();
    cursor.slice();
    let method = Method::parse(method_bytes)?;

    let target_start = buf.len() - cursor.len();
    let target_bytes = match cursor.take_until(|b| b == b' ') {
        Some(bytes) => bytes,
        None => return Err(ParseError::Incomplete),
    };
    if target_bytes.is_empty() || !target_bytes.iter().copied().all(is_request_target_char) {
        return Err(ParseError::MalformedTarget);
    }
    cursor.next();
    cursor.slice();
    let target_end = target_start + target_bytes.len();
    let path_end = target_bytes
        .iter()
        .position(|&b| b == b'?')
        .map(|i| target_start + i)
        .unwrap_or(target_end);

    let version_bytes = cursor
        .take_until(|b| b == b'\r')
        .ok_or(ParseError::Incomplete)?;
    let version = Version::parse(version_bytes)?;
    if cursor.peek() != Some(b'\r') {
        return Err(ParseError::Incomplete);
    }
    cursor.next();
    if cursor.peek() != Some(b'\n') {
        return Err(ParseError::MalformedHeader);
    }
    cursor.next();
    cursor.slice();

    let mut rows = Vec::new();
    loop {
        if cursor.peek() == Some(b'\r') {
            cursor.next();
            if cursor.peek() != Some(b'\n') {
                return Err(ParseError::MalformedHeader);
            }
            cursor.next();
            break;
        }
        if cursor.is_empty() {
            return Err(ParseError::Incomplete);
        }

        let name_start = buf.len() - cursor.len();
        let name_bytes = match cursor.take_until(|b| b == b':') {
            Some(bytes) => bytes,
            None => return Err(ParseError::Incomplete),
        };
        if name_bytes.is_empty() || !name_bytes.iter().copied().all(is_token_char) {
            return Err(ParseError::MalformedHeader);
        }
        let name_end = name_start + name_bytes.len();
        cursor.next();
        cursor.slice();

        while cursor.peek() == Some(b' ') || cursor.peek() == Some(b'\t') {
            cursor.next();
        }
        cursor.slice();

        let value_line = match cursor.take_until(|b| b == b'\r') {
            Some(bytes) => bytes,
            None => return Err(ParseError::Incomplete),
        };
        let value_start = buf.len() - cursor.len() - value_line.len();
        let trimmed_len = value_line
            .iter()
            .rposition(|&b| b != b' ' && b != b'\t')
            .map(|i| i + 1)
            .unwrap_or(0);
        let value_end = value_start + trimmed_len;
        cursor.next();
        if cursor.peek() != Some(b'\n') {
            return Err(ParseError::MalformedHeader);
        }
        cursor.next();
        cursor.slice();

        rows.push(HeaderRow {
            name_start,
            name_end,
            value_start,
            value_end,
        });
    }

    let consumed = buf.len() - cursor.len();
    let headers = HeaderToc { rows };

    if version == Version::Http11 && headers.get(buf, "Host").is_none() {
        return Err(ParseError::MissingHost);
    }

    Ok((
        Request {
            method,
            version,
            target_start,
            target_end,
            path_end,
            headers,
        },
        consumed,
    ))
}

fn contains_header_terminator(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod test {
    use super::*;

    const MAX: usize = 8192;

    #[test]
    fn parses_simple_get() {
        let req = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (request, consumed) = parse(req, MAX).unwrap();
        assert_eq!(consumed, req.len());
        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.version(), Version::Http11);
        assert_eq!(request.path(req), "/index.html");
        assert_eq!(request.query(req), None);
        assert_eq!(request.headers().get(req, "host"), Some("example.com"));
    }

    #[test]
    fn splits_path_and_query() {
        let req = b"GET /search?q=rust HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (request, _) = parse(req, MAX).unwrap();
        assert_eq!(request.path(req), "/search");
        assert_eq!(request.query(req), Some("q=rust"));
    }

    #[test]
    fn header_lookup_is_case_insensitive_and_trims_ows() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\nX-Custom:   value  \r\n\r\n";
        let (request, _) = parse(req, MAX).unwrap();
        assert_eq!(
            request.headers().get(req, "x-CUSTOM"),
            Some("value")
        );
    }

    #[test]
    fn empty_header_value_reports_as_absent() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\nX-Empty:\r\n\r\n";
        let (request, _) = parse(req, MAX).unwrap();
        assert_eq!(request.headers().get(req, "X-Empty"), None);
    }

    #[test]
    fn http11_without_host_is_rejected() {
        let req = b"GET / HTTP/1.1\r\n\r\n";
        assert_eq!(parse(req, MAX).unwrap_err(), ParseError::MissingHost);
    }

    #[test]
    fn http10_does_not_require_host() {
        let req = b"GET / HTTP/1.0\r\n\r\n";
        let (request, _) = parse(req, MAX).unwrap();
        assert_eq!(request.version(), Version::Http10);
    }

    #[test]
    fn incomplete_request_without_trailing_blank_line() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
        assert_eq!(parse(req, MAX).unwrap_err(), ParseError::Incomplete);
    }

    #[test]
    fn unterminated_request_past_limit_is_too_large() {
        let mut req = b"GET /".to_vec();
        req.extend(std::iter::repeat(b'a').take(200));
        assert_eq!(parse(&req, 64).unwrap_err(), ParseError::HeaderTooLarge);
    }

    #[test]
    fn malformed_header_without_colon() {
        let req = b"GET / HTTP/1.1\r\nHost example.com\r\n\r\n";
        assert_eq!(parse(req, MAX).unwrap_err(), ParseError::MalformedHeader);
    }

    #[test]
    fn unsupported_method_is_rejected() {
        let req = b"TRACE / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        assert_eq!(parse(req, MAX).unwrap_err(), ParseError::UnsupportedMethod);
    }
}
