//! Error types for wirepeer.

use thiserror::Error;

/// Result type alias using [`RpcError`].
pub type Result<T> = std::result::Result<T, RpcError>;

/// Error kinds carried as signed 32-bit codes in Error Response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Envelope could not be decoded.
    ParseError,
    /// Request or response body could not be decoded.
    InvalidRequest,
    /// No handler registered for the method id.
    MethodNotFound,
    /// Peer teardown while the request was pending.
    InternalError,
    /// No completion arrived within the configured timeout.
    RequestTimeout,
    /// A guard rejected the request.
    GuardError,
    /// The handler failed.
    ApplicationError,
    /// Code received from a remote peer that this library does not define.
    Other(i32),
}

impl ErrorCode {
    /// The signed 32-bit representation written to the wire.
    pub fn wire(self) -> i32 {
        match self {
            ErrorCode::ParseError => 1000,
            ErrorCode::InvalidRequest => 1001,
            ErrorCode::MethodNotFound => 1002,
            ErrorCode::InternalError => 1004,
            ErrorCode::RequestTimeout => 1005,
            ErrorCode::GuardError => 1006,
            ErrorCode::ApplicationError => 1007,
            ErrorCode::Other(code) => code,
        }
    }

    /// Map a wire code back to an [`ErrorCode`], preserving unknown values.
    pub fn from_wire(code: i32) -> Self {
        match code {
            1000 => ErrorCode::ParseError,
            1001 => ErrorCode::InvalidRequest,
            1002 => ErrorCode::MethodNotFound,
            1004 => ErrorCode::InternalError,
            1005 => ErrorCode::RequestTimeout,
            1006 => ErrorCode::GuardError,
            1007 => ErrorCode::ApplicationError,
            other => ErrorCode::Other(other),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::ParseError => f.write_str("parse error"),
            ErrorCode::InvalidRequest => f.write_str("invalid request"),
            ErrorCode::MethodNotFound => f.write_str("method not found"),
            ErrorCode::InternalError => f.write_str("internal error"),
            ErrorCode::RequestTimeout => f.write_str("request timeout"),
            ErrorCode::GuardError => f.write_str("guard error"),
            ErrorCode::ApplicationError => f.write_str("application error"),
            ErrorCode::Other(code) => write!(f, "error code {code}"),
        }
    }
}

/// Uniform error for all peer operations.
///
/// Carries the error kind, a short message (this is what Error Response
/// frames put on the wire), the correlation id of the request it concerns
/// (`-1` when none applies), and an optional longer detail that stays local.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message} (id {id})")]
pub struct RpcError {
    /// Error kind, mapped to the signed wire code.
    pub code: ErrorCode,
    /// Short human-readable message.
    pub message: String,
    /// Correlation id of the affected request, `-1` when there is none.
    pub id: i64,
    /// Longer context; never sent on the wire.
    pub detail: String,
}

impl RpcError {
    /// Create an error with no correlation id.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            id: -1,
            detail: String::new(),
        }
    }

    /// Shorthand for guard and handler failures. The dispatcher rewrites the
    /// code when it emits the frame, so only the message matters here.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApplicationError, message)
    }

    /// Attach the correlation id of the affected request.
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = i64::from(id);
        self
    }

    /// Attach a longer detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

impl From<rmp_serde::encode::Error> for RpcError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for RpcError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::new(ErrorCode::InvalidRequest, err.to_string())
    }
}
