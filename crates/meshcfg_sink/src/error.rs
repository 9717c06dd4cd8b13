//! Error types for the sink server

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Wire framing errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid OpCode: {0}")]
    InvalidOpCode(u8),

    #[error("Unexpected OpCode: expected {expected}, got {got}")]
    UnexpectedOpCode { expected: u8, got: u8 },

    #[error("Header too short: expected {expected} bytes, got {got}")]
    HeaderTooShort { expected: usize, got: usize },

    #[error("Protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u8, got: u8 },

    #[error("Payload too large: {size} bytes exceeds {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Payload length mismatch: expected {expected} bytes, got {got}")]
    PayloadLengthMismatch { expected: usize, got: usize },

    #[error("Truncated frame: connection closed after {got} bytes")]
    Truncated { got: usize },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Canonical status codes, numbered as in gRPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Status returned to a stream peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limiter wait cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no auth info on the stream")]
    MissingAuthInfo,

    #[error("unsupported auth type: {0}")]
    UnsupportedAuthType(String),

    #[error("none of the identities {0:?} is allowed")]
    NotAllowed(Vec<String>),
}

/// Rejection returned by an [`Updater`](crate::Updater); the sink NACKs with it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct UpdateError(pub String);

impl UpdateError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Outcome of a resource stream that did not finish normally.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The peer closed the stream cleanly.
    #[error("end of stream")]
    EndOfStream,

    #[error(transparent)]
    Status(#[from] Status),

    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl StreamError {
    pub fn code(&self) -> Code {
        match self {
            StreamError::EndOfStream => Code::Ok,
            StreamError::Status(s) => s.code,
            StreamError::RateLimit(RateLimitError::Cancelled) => Code::Cancelled,
            StreamError::Protocol(_) => Code::InvalidArgument,
            StreamError::Io(_) => Code::Unavailable,
        }
    }

    /// Clean end of stream, or a status of `Ok` / `Cancelled`.
    pub fn is_benign(&self) -> bool {
        match self {
            StreamError::EndOfStream => true,
            StreamError::Status(s) => matches!(s.code, Code::Ok | Code::Cancelled),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for code in [Code::Ok, Code::InvalidArgument, Code::Unimplemented, Code::Unauthenticated] {
            assert_eq!(Code::from_i32(code.as_i32()), code);
        }
        assert_eq!(Code::from_i32(99), Code::Unknown);
    }

    #[test]
    fn test_benign_outcomes() {
        assert!(StreamError::EndOfStream.is_benign());
        assert!(StreamError::from(Status::new(Code::Ok, "")).is_benign());
        assert!(StreamError::from(Status::cancelled("gone")).is_benign());
        assert!(!StreamError::from(Status::internal("boom")).is_benign());
        assert!(!StreamError::from(RateLimitError::Cancelled).is_benign());
    }

    #[test]
    fn test_status_display() {
        let s = Status::unauthenticated("Authentication failure: nope");
        assert_eq!(s.to_string(), "Unauthenticated: Authentication failure: nope");
    }
}
