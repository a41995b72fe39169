//! Representation of the request's declared HTTP version.

use std::fmt::Display;

use super::ParseError;

/// HTTP/1.x version as declared in the request line. HTTP/2 and HTTP/3 prefaces are rejected by
/// the version parser itself (see [`Non-goals`](crate) in the crate-level docs) rather than
/// handled by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// HTTP/1.0 — responses downgrade keep-alive defaults and omit chunked framing.
    Http10,
    /// HTTP/1.1 — requires a `Host` header; keep-alive is the default.
    Http11,
}

impl Version {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        match bytes {
            b"HTTP/1.0" => Ok(Self::Http10),
            b"HTTP/1.1" => Ok(Self::Http11),
            _ => Err(ParseError::UnsupportedVersion),
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_known_versions() {
        assert_eq!(Version::Http10, Version::parse(b"HTTP/1.0").unwrap());
        assert_eq!(Version::Http11, Version::parse(b"HTTP/1.1").unwrap());
    }

    #[test]
    fn rejects_http2_preface_and_garbage() {
        assert!(Version::parse(b"HTTP/2").is_err());
        assert!(Version::parse(b"ftp/1.1").is_err());
    }
}
