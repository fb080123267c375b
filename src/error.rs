//! Error types for review-batch
//!
//! This module provides the error taxonomy shared by every layer:
//! - [`Error`], the crate-level error for batch-level and programming failures
//! - [`RemoteError`], the typed failure returned by the remote call primitive
//! - [`ErrorKind`], the machine-readable classification recorded in per-item outcomes

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for review-batch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for review-batch
///
/// Per-item failures never surface as an `Error`; they are captured in the
/// item's [`OperationOutcome`](crate::types::OperationOutcome). This type is
/// returned only when a whole call cannot proceed (malformed input, invalid
/// options, a transport that cannot be built).
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency_limit")
        key: Option<String>,
    },

    /// A raw identifier did not match any accepted format
    #[error("invalid identifier {raw:?}: {reason}. Expected {hint}")]
    InvalidIdentifier {
        /// The raw value as supplied by the caller
        raw: String,
        /// Why the value was rejected
        reason: String,
        /// Human-readable list of accepted formats
        hint: String,
    },

    /// The identifier is well-formed but cannot be used for the requested action
    #[error("{identifier} ({kind}) cannot be used to {action}: {reason}")]
    UnsupportedIdentifierKind {
        /// Canonical identifier
        identifier: String,
        /// Human-readable identifier kind
        kind: String,
        /// The action that was requested (e.g., "resolve")
        action: String,
        /// Why the kind is incompatible
        reason: String,
    },

    /// Caller-supplied input (other than identifiers) failed validation
    #[error("invalid {field}: {message}")]
    InvalidInput {
        /// The offending input field (e.g., "reply body")
        field: String,
        /// What is wrong with it
        message: String,
    },

    /// Remote API call failed
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// External tool execution failed (gh)
    #[error("external tool error: {0}")]
    ExternalTool(String),
}

impl Error {
    /// Machine-readable classification of this error, if it maps onto the
    /// per-item taxonomy.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::InvalidIdentifier { .. } => Some(ErrorKind::InvalidIdentifier),
            Error::UnsupportedIdentifierKind { .. } => Some(ErrorKind::UnsupportedIdentifierKind),
            Error::Remote(e) => Some(e.kind),
            Error::Network(e) if e.is_timeout() => Some(ErrorKind::Timeout),
            Error::Network(_) => Some(ErrorKind::Network),
            Error::Config { .. }
            | Error::InvalidInput { .. }
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::ExternalTool(_) => None,
        }
    }
}

/// Classification recorded in a failed or partially completed outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed identifier (never retried)
    InvalidIdentifier,
    /// Identifier valid but wrong kind for the action (never retried)
    UnsupportedIdentifierKind,
    /// Remote rate limit hit (transient)
    RateLimited,
    /// Remote call timed out (transient)
    Timeout,
    /// Remote server fault, 5xx-equivalent (transient)
    ServerError,
    /// Connection-level failure (transient)
    Network,
    /// Target does not exist (permanent)
    NotFound,
    /// Caller lacks permission (permanent)
    PermissionDenied,
    /// Remote rejected the input or returned an unusable response (permanent)
    Validation,
    /// Skipped because the batch circuit breaker tripped
    Aborted,
    /// Interrupted by caller-initiated cancellation
    Cancelled,
}

impl ErrorKind {
    /// Returns true for kinds the retry policy retries
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::Timeout | ErrorKind::ServerError | ErrorKind::Network
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidIdentifier => "invalid_identifier",
            ErrorKind::UnsupportedIdentifierKind => "unsupported_identifier_kind",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Network => "network",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Validation => "validation",
            ErrorKind::Aborted => "aborted",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure returned by the remote call primitive
///
/// Carries the HTTP-equivalent status (when the transport has one) and an
/// optional server-supplied retry-after hint.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
#[error("{kind}{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
pub struct RemoteError {
    /// Classification of the failure
    pub kind: ErrorKind,
    /// HTTP status code, when available
    pub status: Option<u16>,
    /// Message from the remote or the transport
    pub message: String,
    /// Minimum wait before the next attempt, as requested by the server
    #[serde(default, with = "crate::config::optional_duration_ms")]
    pub retry_after: Option<Duration>,
}

impl RemoteError {
    /// Create a remote error of the given kind without status or hint
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attach an HTTP status code
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a retry-after hint
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Classify an HTTP status code
    ///
    /// 403 is ambiguous on GitHub (permission vs. secondary rate limit); the
    /// caller passes `rate_limited = true` when response headers or body say
    /// the quota is exhausted.
    pub fn from_status(status: u16, message: impl Into<String>, rate_limited: bool) -> Self {
        let kind = match status {
            429 => ErrorKind::RateLimited,
            403 if rate_limited => ErrorKind::RateLimited,
            408 | 504 => ErrorKind::Timeout,
            500..=599 => ErrorKind::ServerError,
            404 | 410 => ErrorKind::NotFound,
            401 | 403 => ErrorKind::PermissionDenied,
            _ => ErrorKind::Validation,
        };
        Self::new(kind, message).with_status(status)
    }

    /// Returns true if the retry policy should retry this error
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}
