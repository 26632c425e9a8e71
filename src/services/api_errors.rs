//! API Error Classification
//!
//! Maps HTTP statuses and transport failures from the WEEX REST API into
//! structured kinds that drive retry decisions and caller handling.

use std::fmt;
use thiserror::Error;

/// Failure categories at the client boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// HTTP 401 or missing credentials - never retried
    AuthFailure,
    /// HTTP 429 - retried with extended backoff
    RateLimited,
    /// HTTP 5xx - retried
    ServerError,
    /// Other 4xx (and unexpected statuses) - never retried
    ClientError,
    /// Connection failure or timeout - retried
    NetworkError,
    /// Retry budget consumed
    NetworkExhausted,
}

impl ApiErrorKind {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ApiErrorKind::AuthFailure,
            429 => ApiErrorKind::RateLimited,
            500..=599 => ApiErrorKind::ServerError,
            _ => ApiErrorKind::ClientError,
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ApiErrorKind::RateLimited | ApiErrorKind::ServerError | ApiErrorKind::NetworkError
        )
    }

    /// Multiplier applied on top of the exponential backoff
    pub fn backoff_factor(self) -> u32 {
        match self {
            ApiErrorKind::RateLimited => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApiErrorKind::AuthFailure => "auth failure",
            ApiErrorKind::RateLimited => "rate limited",
            ApiErrorKind::ServerError => "server error",
            ApiErrorKind::ClientError => "client error",
            ApiErrorKind::NetworkError => "network error",
            ApiErrorKind::NetworkExhausted => "retries exhausted",
        };
        f.write_str(name)
    }
}

/// Failure returned by the signed client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ApiFailure {
    pub kind: ApiErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl ApiFailure {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Build from a non-success HTTP response
    pub fn from_response(status: u16, body: &str) -> Self {
        let excerpt: String = body.chars().take(300).collect();
        Self {
            kind: ApiErrorKind::from_status(status),
            message: format!("HTTP {}: {}", status, excerpt),
            status: Some(status),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Convert a last retryable error into the terminal exhausted failure
    pub fn exhausted(self) -> Self {
        Self {
            kind: ApiErrorKind::NetworkExhausted,
            message: self.message,
            status: self.status,
        }
    }
}
