//! Representation of the request method.

use std::fmt::Display;

use super::ParseError;

/// Methods recognized by the request line parser.
///
/// [IETF RFC 9110 Section 9](https://www.rfc-editor.org/rfc/rfc9110#section-9). Any other token,
/// including `CONNECT` and `TRACE`, falls through to the 501 path — the response pipeline has no
/// handler for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// RFC 9110 9.3.1
    Get,
    /// RFC 9110 9.3.2
    Head,
    /// RFC 9110 9.3.3
    Post,
    /// RFC 9110 9.3.4
    Put,
    /// RFC 9110 9.3.5
    Delete,
    /// RFC 9110 9.3.7
    Options,
}

impl Method {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        match bytes {
            b"GET" => Ok(Self::Get),
            b"HEAD" => Ok(Self::Head),
            b"POST" => Ok(Self::Post),
            b"PUT" => Ok(Self::Put),
            b"DELETE" => Ok(Self::Delete),
            b"OPTIONS" => Ok(Self::Options),
            _ => Err(ParseError::UnsupportedMethod),
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognizes_each_supported_method() {
        assert_eq!(Method::Get, Method::parse(b"GET").unwrap());
        assert_eq!(Method::Head, Method::parse(b"HEAD").unwrap());
        assert_eq!(Method::Post, Method::parse(b"POST").unwrap());
        assert_eq!(Method::Put, Method::parse(b"PUT").unwrap());
        assert_eq!(Method::Delete, Method::parse(b"DELETE").unwrap());
        assert_eq!(Method::Options, Method::parse(b"OPTIONS").unwrap());
    }

    #[test]
    fn unsupported_method_is_rejected() {
        assert!(matches!(
            Method::parse(b"TRACE"),
            Err(ParseError::UnsupportedMethod)
        ));
        assert!(matches!(
            Method::parse(b"connect"),
            Err(ParseError::UnsupportedMethod)
        ));
    }
}
