//! # Error Taxonomy
//!
//! Purpose: One error type for every failure the client can report, plus a
//! stable symbolic `ErrorCode` for callers that match on kinds rather than
//! messages.
//!
//! ## Propagation Classes
//!
//! - Local validation (`KeySize`, `ValueSize`, `UnknownType`, `JsonParse`,
//!   `ReservedByte`): raised before any byte is written.
//! - Transport (`ConnectionClosed`, `Unauthorized`, `Io`, `Timeout`): reject
//!   the in-flight request and every later one until reconnection.
//! - Server (`ServerResponse`): the status byte was `'N'`; the payload text is
//!   the message.
//! - Framing (`MalformedResponse`): the stream ended mid-frame or carried
//!   bytes the codec does not understand.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::{MAX_KEY_SIZE, MAX_VALUE_SIZE};

/// Result type alias using `KeyvalError`.
pub type KeyvalResult<T> = Result<T, KeyvalError>;

/// Unified error type for KeyVal client operations.
#[derive(Debug, Error)]
pub enum KeyvalError {
    // -------------------------------------------------------------------------
    // Local validation
    // -------------------------------------------------------------------------
    #[error("key is {len} bytes, maximum is {max}", max = MAX_KEY_SIZE)]
    KeySize { len: usize },

    #[error("value is {len} bytes, maximum is {max}", max = MAX_VALUE_SIZE)]
    ValueSize { len: usize },

    #[error("unsupported import payload: {0}")]
    UnknownType(String),

    #[error("invalid JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("{field} contains the reserved terminator byte")]
    ReservedByte { field: &'static str },

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------
    #[error("connection closed")]
    ConnectionClosed,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Server and framing
    // -------------------------------------------------------------------------
    #[error("server error: {0}")]
    ServerResponse(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    // -------------------------------------------------------------------------
    // Setup
    // -------------------------------------------------------------------------
    #[error("setup error: {0}")]
    Setup(String),
}

impl KeyvalError {
    /// Returns the stable symbolic code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            KeyvalError::KeySize { .. } => ErrorCode::KeyTooLarge,
            KeyvalError::ValueSize { .. } => ErrorCode::ValueTooLarge,
            KeyvalError::UnknownType(_) => ErrorCode::UnknownPayloadType,
            KeyvalError::JsonParse(_) => ErrorCode::JsonParse,
            KeyvalError::ReservedByte { .. } => ErrorCode::ReservedByte,
            KeyvalError::ConnectionClosed => ErrorCode::ConnectionClosed,
            KeyvalError::Unauthorized(_) => ErrorCode::Unauthorized,
            KeyvalError::Timeout(_) => ErrorCode::Timeout,
            KeyvalError::Io(_) => ErrorCode::Io,
            KeyvalError::ServerResponse(_) => ErrorCode::ServerError,
            KeyvalError::MalformedResponse(_) => ErrorCode::MalformedResponse,
            KeyvalError::Setup(_) => ErrorCode::Setup,
        }
    }

    /// Returns true when the error was detected locally, before any I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::KeyTooLarge
                | ErrorCode::ValueTooLarge
                | ErrorCode::UnknownPayloadType
                | ErrorCode::JsonParse
                | ErrorCode::ReservedByte
        )
    }
}

/// Stable symbolic identifier of an error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    KeyTooLarge,
    ValueTooLarge,
    UnknownPayloadType,
    JsonParse,
    ReservedByte,
    MalformedResponse,
    ConnectionClosed,
    Unauthorized,
    ServerError,
    Timeout,
    Io,
    Setup,
}

impl ErrorCode {
    /// Returns the symbolic name, e.g. `key-too-large`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::KeyTooLarge => "key-too-large",
            ErrorCode::ValueTooLarge => "value-too-large",
            ErrorCode::UnknownPayloadType => "unknown-payload-type",
            ErrorCode::JsonParse => "json-parse",
            ErrorCode::ReservedByte => "reserved-byte",
            ErrorCode::MalformedResponse => "malformed-response",
            ErrorCode::ConnectionClosed => "connection-closed",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::ServerError => "server-error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Io => "io",
            ErrorCode::Setup => "setup",
        }
    }

    /// Maps a response status byte to the error code it signals.
    ///
    /// Returns `None` for the OK status; unknown bytes map to
    /// `MalformedResponse`.
    pub fn from_status(byte: u8) -> Option<Self> {
        match crate::protocol::Status::from_u8(byte) {
            Some(crate::protocol::Status::Ok) => None,
            Some(crate::protocol::Status::ServerError) => Some(ErrorCode::ServerError),
            None => Some(ErrorCode::MalformedResponse),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
