//! Errors raised by model calls.

use std::fmt;

/// Broad category of a failed model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// 429 from the gateway
    RateLimited,
    /// 5xx from the gateway
    ServerError,
    /// 4xx other than 429
    ClientError,
    /// Connection refused, reset, DNS failure
    NetworkError,
    /// The call did not finish within its time budget
    Timeout,
    /// The gateway answered 2xx but the body was not a usable completion
    ParseError,
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
            Self::ParseError => "parse_error",
        };
        f.write_str(s)
    }
}

/// Classify an HTTP status code into an error kind.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        500..=599 => LlmErrorKind::ServerError,
        _ => LlmErrorKind::ClientError,
    }
}

/// A failed model call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    /// HTTP status, when the gateway answered at all.
    pub status: Option<u16>,
    pub message: String,
}

impl LlmError {
    /// Build an error from a non-success HTTP status and its body.
    pub fn http(status: u16, body: impl AsRef<str>) -> Self {
        Self {
            kind: classify_http_status(status),
            status: Some(status),
            message: format!("HTTP {}: {}", status, body.as_ref()),
        }
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        Self {
            kind: LlmErrorKind::NetworkError,
            status: None,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: LlmErrorKind::Timeout,
            status: None,
            message: message.into(),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            kind: LlmErrorKind::ParseError,
            status: None,
            message: message.into(),
        }
    }

    /// Map a reqwest transport error, keeping timeouts distinguishable.
    pub fn from_transport(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            Self::network_error(format!("Connection failed: {}", e))
        } else {
            Self::network_error(format!("Request failed: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_http_status() {
        assert_eq!(classify_http_status(429), LlmErrorKind::RateLimited);
        assert_eq!(classify_http_status(502), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(404), LlmErrorKind::ClientError);
    }

    #[test]
    fn test_http_error_message() {
        let err = LlmError::http(503, "upstream overloaded");
        assert_eq!(err.to_string(), "HTTP 503: upstream overloaded");
        assert_eq!(err.status, Some(503));
        assert_eq!(err.kind, LlmErrorKind::ServerError);
    }
}
