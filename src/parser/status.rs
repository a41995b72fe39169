//! HTTP status codes used by the response pipeline.
//!
//! [RFC 9110 Section 15](https://www.rfc-editor.org/rfc/rfc9110#section-15). Only the subset the
//! pipeline actually emits is represented; this is not a general-purpose status registry.

use std::fmt::Display;

/// A status code/reason-phrase pair emitted on the response status line.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 15.3.1
    Ok = 200,
    /// 15.3.7
    PartialContent = 206,
    /// 15.4.5
    NotModified = 304,
    /// 15.5.1
    BadRequest = 400,
    /// 15.5.5
    Forbidden = 403,
    /// 15.5.6
    NotFound = 404,
    /// 15.5.7
    MethodNotAllowed = 405,
    /// 15.5.9
    RequestTimeout = 408,
    /// 15.5.14
    ContentTooLarge = 413,
    /// 15.5.15
    UriTooLong = 414,
    /// 15.5.17
    RangeNotSatisfiable = 416,
    /// 15.6.1
    InternalServerError = 500,
    /// 15.6.2
    NotImplemented = 501,
}

impl Status {
    /// The reason phrase conventionally paired with this status code.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::PartialContent => "Partial Content",
            Self::NotModified => "Not Modified",
            Self::BadRequest => "Bad Request",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::RequestTimeout => "Request Timeout",
            Self::ContentTooLarge => "Content Too Large",
            Self::UriTooLong => "URI Too Long",
            Self::RangeNotSatisfiable => "Range Not Satisfiable",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
        }
    }

    /// The numeric status code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Whether a connection may remain open (keep-alive) after this status. Protocol errors
    /// always close; policy-driven statuses (403/404) may keep the connection alive.
    pub fn allows_keep_alive(self) -> bool {
        !matches!(
            self,
            Self::BadRequest
                | Self::RequestTimeout
                | Self::ContentTooLarge
                | Self::UriTooLong
                | Self::InternalServerError
                | Self::NotImplemented
        )
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn protocol_errors_never_allow_keep_alive() {
        assert!(!Status::BadRequest.allows_keep_alive());
        assert!(!Status::ContentTooLarge.allows_keep_alive());
        assert!(!Status::UriTooLong.allows_keep_alive());
    }

    #[test]
    fn policy_errors_allow_keep_alive() {
        assert!(Status::Forbidden.allows_keep_alive());
        assert!(Status::NotFound.allows_keep_alive());
    }
}
