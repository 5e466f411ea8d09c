/*
[INPUT]:  Error sources (connectivity, HTTP status, transport, serialization, storage)
[OUTPUT]: Typed failure taxonomy with retry and auth hints
[POS]:    Error handling layer - unified network error type for the crate
[UPDATE]: When adding new error sources or changing retry classification
*/

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::store::StoreError;

/// Failure class presented to callers and used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NetworkUnavailable,
    NetworkError,
    Timeout,
    ServerError,
    ClientError,
    AuthExpired,
    RateLimited,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NetworkUnavailable => "NETWORK_UNAVAILABLE",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::ServerError => "SERVER_ERROR",
            ErrorKind::ClientError => "CLIENT_ERROR",
            ErrorKind::AuthExpired => "AUTH_EXPIRED",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Unexpected => "UNEXPECTED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for API calls
///
/// `Clone` so a single refresh outcome can be handed to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Connectivity collaborator reported offline before the call
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Request exceeded its deadline (or the server answered 408)
    #[error("Request timed out")]
    Timeout,

    /// 5xx response
    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// 4xx response other than 401-on-protected, 408 and 429
    #[error("Request rejected (status {status}): {message}")]
    Client { status: u16, message: String },

    /// 401 on a protected call; the local session has been dropped
    #[error("Session expired, please log in again")]
    AuthExpired,

    /// 429 response
    #[error("Rate limit exceeded{}", .retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// Connection-level failure after the request was attempted
    #[error("HTTP transport failed: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    UrlParse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NetworkUnavailable => ErrorKind::NetworkUnavailable,
            ApiError::Transport(_) => ErrorKind::NetworkError,
            ApiError::Timeout => ErrorKind::Timeout,
            ApiError::Server { .. } => ErrorKind::ServerError,
            ApiError::Client { .. } => ErrorKind::ClientError,
            ApiError::AuthExpired => ErrorKind::AuthExpired,
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::Serialization(_)
            | ApiError::InvalidResponse(_)
            | ApiError::UrlParse(_)
            | ApiError::Storage(_)
            | ApiError::Config(_)
            | ApiError::Internal(_) => ErrorKind::Unexpected,
        }
    }

    /// Check if the pipeline may retry this error on its own
    ///
    /// `NetworkUnavailable` is excluded: retrying is left to the caller once
    /// connectivity returns.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Transport(_)
                | ApiError::Timeout
                | ApiError::Server { .. }
                | ApiError::RateLimited { .. }
        )
    }

    /// Failures to present as "try again".
    pub fn is_transient(&self) -> bool {
        self.is_retryable() || matches!(self, ApiError::NetworkUnavailable)
    }

    /// Server definitively rejected the credentials used for the call.
    pub fn is_terminal_auth(&self) -> bool {
        match self {
            ApiError::AuthExpired => true,
            ApiError::Client { status, .. } => matches!(status, 400 | 401 | 403),
            _ => false,
        }
    }

    /// Server-supplied delay hint, if any
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classify a non-success status. 401 is not special-cased here;
    /// the pipeline decides whether it means an expired session.
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match status.as_u16() {
            408 => ApiError::Timeout,
            429 => ApiError::RateLimited { retry_after: None },
            code @ 400..=499 => ApiError::Client {
                status: code,
                message,
            },
            code @ 500..=599 => ApiError::Server {
                status: code,
                message,
            },
            code => ApiError::InvalidResponse(format!("unexpected status {code}: {message}")),
        }
    }

    /// HTTP status carried by the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } | ApiError::Client { status, .. } => Some(*status),
            ApiError::AuthExpired => Some(401),
            ApiError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Serialization(err.to_string())
        } else if err.is_builder() {
            ApiError::Config(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::UrlParse(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Storage(err.to_string())
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
