//! Error taxonomy shared by every collaborator and stage

use std::any::Any;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Classification of a collaborator failure.
///
/// Whether a kind is retried is decided per collaborator by
/// [`RetryPolicy::retryable`](crate::RetryPolicy), not by the kind itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkUnreachable,
    Timeout,
    RateLimited,
    ServiceUnavailable,
    NotFound,
    Authentication,
    MalformedResponse,
    FilesystemUnwritable,
    ExtractionFailed,
    Interrupted,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkUnreachable => "network_unreachable",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::ServiceUnavailable => "service_unavailable",
            Self::NotFound => "not_found",
            Self::Authentication => "authentication",
            Self::MalformedResponse => "malformed_response",
            Self::FilesystemUnwritable => "filesystem_unwritable",
            Self::ExtractionFailed => "extraction_failed",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct StageError {
    pub kind: ErrorKind,
    pub message: String,
    /// Server-advised wait (e.g. `Retry-After`), only meaningful for `RateLimited`
    pub retry_after: Option<Duration>,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.retry_after {
            Some(wait) => write!(
                f,
                "{}: {} (retry after {}s)",
                self.kind,
                self.message,
                wait.as_secs()
            ),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for StageError {}

impl StageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            message: message.into(),
            retry_after,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkUnreachable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }

    pub fn interrupted() -> Self {
        Self::new(ErrorKind::Interrupted, "shutdown requested")
    }

    /// Map an HTTP status code to an error kind.
    ///
    /// 429 carries the parsed `Retry-After` seconds when the server sent one.
    pub fn from_status(status: u16, retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::rate_limited(message, retry_after),
            401 | 403 => Self::new(ErrorKind::Authentication, message),
            404 | 410 => Self::new(ErrorKind::NotFound, message),
            408 => Self::new(ErrorKind::Timeout, message),
            500..=599 => Self::new(ErrorKind::ServiceUnavailable, message),
            _ => Self::new(ErrorKind::MalformedResponse, message),
        }
    }

    /// Classify a transport-level reqwest error (no response received or body failed).
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        // Strip URL from message to avoid leaking API keys in query strings
        let e = e.without_url();
        let message = e.to_string();
        if let Some(status) = e.status() {
            return Self::from_status(status.as_u16(), None, message);
        }
        if e.is_timeout() {
            Self::timeout(message)
        } else if e.is_decode() {
            Self::malformed(message)
        } else {
            Self::network(message)
        }
    }

    /// Panic payload caught from a collaborator, reported under `kind`.
    pub fn from_panic(kind: ErrorKind, context: &str, payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string panic payload");
        Self::new(kind, format!("{context} panicked: {detail}"))
    }

    /// Local I/O failure while persisting an artifact.
    pub fn from_io(context: &str, e: &std::io::Error) -> Self {
        Self::new(ErrorKind::FilesystemUnwritable, format!("{context}: {e}"))
    }
}

/// Parse a `Retry-After` header given in delta-seconds.
///
/// HTTP-date values are ignored; the computed backoff applies instead.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}
