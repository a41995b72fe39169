//! Response status-line and header serialization.
//!
//! A status line and header block, written onto a connection's write buffer.

use std::io::{self, Write};

use super::{Status, Version};

/// A response status line and header block, written incrementally onto a [`Write`]r (normally a
/// connection's [`Buffer`](crate::buffer::Buffer)).
#[derive(Debug)]
pub struct ResponseWriter {
    version: Version,
    status: Status,
    headers: Vec<(String, String)>,
}

impl ResponseWriter {
    pub fn new(version: Version, status: Status) -> Self {
        Self {
            version,
            status,
            headers: Vec::new(),
        }
    }

    /// Appends a header. Does not deduplicate; callers are responsible for not setting the same
    /// header twice.
    pub fn header(&mut self, name: &str, value: impl std::fmt::Display) -> &mut Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn content_length(&mut self, len: u64) -> &mut Self {
        self.header("Content-Length", len)
    }

    pub fn connection(&mut self, keep_alive: bool) -> &mut Self {
        self.header("Connection", if keep_alive { "keep-alive" } else { "close" })
    }

    /// Writes the status line and all accumulated headers, terminated by the blank line that
    /// separates headers from the body, to `out`.
    pub fn write_head<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{} {}\r\n", self.version, self.status)?;
        for (name, value) in &self.headers {
            write!(out, "{name}: {value}\r\n")?;
        }
        out.write_all(b"\r\n")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn writes_status_line_and_headers_in_order() {
        let mut writer = ResponseWriter::new(Version::Http11, Status::Ok);
        writer.content_length(5).connection(true);

        let mut out = Vec::new();
        writer.write_head(&mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: keep-alive\r\n\r\n"
        );
    }

    #[test]
    fn error_response_has_no_body_headers() {
        let writer = ResponseWriter::new(Version::Http11, Status::NotFound);
        let mut out = Vec::new();
        writer.write_head(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "HTTP/1.1 404 Not Found\r\n\r\n");
    }
}
