//! Error types for the embed-dispatch crate
//!
//! Besides the error enum itself, this module owns the retry classification:
//! [`classify`] is a pure function that splits every [`Error`] into
//! [`ErrorClass::Transient`] (eligible for backoff and retry) or
//! [`ErrorClass::Terminal`] (propagated immediately).

use thiserror::Error;

use crate::retry::Cancelled;

/// Result type for embed-dispatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for embed-dispatch operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Please retry after {retry_after_secs} seconds")]
    RateLimit {
        /// Seconds to wait before retrying, as suggested by the service
        retry_after_secs: u64,
    },

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The remote service could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// An input record did not match the configured columns
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The operation was cancelled while waiting
    #[error("Operation cancelled")]
    Cancelled,

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<Cancelled> for Error {
    fn from(_: Cancelled) -> Self {
        Error::Cancelled
    }
}

/// Retry classification of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate limiting, server-side API errors and connection failures
    Transient,
    /// Everything else: auth, malformed requests, bad responses, cancellation
    Terminal,
}

/// Classify an error for the retry combinator.
pub fn classify(error: &Error) -> ErrorClass {
    match error {
        Error::RateLimit { .. } | Error::Api { .. } | Error::Connection(_) => ErrorClass::Transient,
        Error::Http(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
            ErrorClass::Transient
        }
        _ => ErrorClass::Terminal,
    }
}
