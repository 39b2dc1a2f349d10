//! Error types for the session layer.
//!
//! `ApiError` is what the LXD transport reports. `SessionError` is the single
//! type surfaced to the compute driver; every `ApiError` is translated into
//! one of its four kinds at the session boundary.

use thiserror::Error;

/// Errors raised while talking to the LXD REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection refused, socket missing, broken pipe.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The resource addressed by the request does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// LXD answered with an error envelope or a non-2xx status.
    #[error("LXD returned {code}: {message}")]
    Status { code: u16, message: String },

    /// The response decoded but did not have the expected shape.
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl From<hyper_util::client::legacy::Error> for ApiError {
    fn from(e: hyper_util::client::legacy::Error) -> Self {
        ApiError::Connection(e.to_string())
    }
}

impl From<hyper::Error> for ApiError {
    fn from(e: hyper::Error) -> Self {
        ApiError::Connection(e.to_string())
    }
}

/// The error every `Session` operation returns.
///
/// Callers can branch on the kind, but the message is the only payload;
/// no backend-specific detail survives translation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("LXD backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl SessionError {
    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            SessionError::BackendUnavailable(m)
            | SessionError::NotFound(m)
            | SessionError::Timeout(m)
            | SessionError::OperationFailed(m) => m,
        }
    }

    /// Prefix the message with `context`, keeping the kind.
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        match self {
            SessionError::BackendUnavailable(m) => {
                SessionError::BackendUnavailable(format!("{}: {}", context, m))
            }
            SessionError::NotFound(m) => SessionError::NotFound(format!("{}: {}", context, m)),
            SessionError::Timeout(m) => SessionError::Timeout(format!("{}: {}", context, m)),
            SessionError::OperationFailed(m) => {
                SessionError::OperationFailed(format!("{}: {}", context, m))
            }
        }
    }
}

impl From<ApiError> for SessionError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Connection(m) => SessionError::BackendUnavailable(m),
            ApiError::Http(e) => SessionError::BackendUnavailable(e.to_string()),
            ApiError::NotFound(m) => SessionError::NotFound(m),
            e @ (ApiError::Json(_) | ApiError::Status { .. } | ApiError::Unexpected(_)) => {
                SessionError::OperationFailed(e.to_string())
            }
        }
    }
}

/// Validation errors for profile, device and request records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("NIC type {0} requires a parent interface")]
    MissingParent(String),

    #[error("duplicate device name: {0}")]
    DuplicateDevice(String),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
