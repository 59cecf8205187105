//! # Wire Protocol Constants
//!
//! Purpose: Define the command codes, status bytes, and frame geometry shared
//! by everything that speaks the KeyVal wire protocol.
//!
//! ## Design Principles
//!
//! 1. **Fixed Geometry**: GET/SET/DEL/EXPORT frames have one fixed size so the
//!    server can read them without a length header.
//! 2. **Single Terminator**: Every frame in both directions ends with `EOT`;
//!    the byte is reserved and never appears inside a key, value, or payload.
//! 3. **Immutable Constants**: Sizes and codes are `const` items, never
//!    runtime-mutable state.
//!
//! ## Memory Layout Example
//!
//! ```text
//! Fixed command frame (772 bytes total):
//! +--------+-----------+------------+--------+
//! | cmd:3B | key:256B  | value:512B | EOT:1B |
//! +--------+-----------+------------+--------+
//! Note: unused key/value bytes are zero; GET/DEL leave value zeroed,
//! EXPORT leaves both zeroed.
//!
//! Import command frame (3 + N + 1 bytes, never padded):
//! +--------+-------------+--------+
//! | cmd:3B | payload:NB  | EOT:1B |
//! +--------+-------------+--------+
//!
//! Response frame:
//! +-----------+--------------+--------+
//! | status:1B | payload:0..N | EOT:1B |
//! +-----------+--------------+--------+
//! Note: status is 'O' (79) or 'N' (78); the server may zero-pad payloads.
//! ```

use std::fmt;

/// End-of-transmission byte terminating every frame.
pub const EOT: u8 = 0x04;

/// Size of the command code at the start of every outgoing frame.
pub const CMD_SIZE: usize = 3;

/// Maximum key size in bytes.
pub const MAX_KEY_SIZE: usize = 256;

/// Maximum value size in bytes.
pub const MAX_VALUE_SIZE: usize = 512;

/// Offset of the key region in a fixed frame.
pub const KEY_OFFSET: usize = CMD_SIZE;

/// Offset of the value region in a fixed frame.
pub const VALUE_OFFSET: usize = KEY_OFFSET + MAX_KEY_SIZE;

/// Size of a fixed frame without its terminator (771 bytes).
pub const FRAME_BODY_SIZE: usize = VALUE_OFFSET + MAX_VALUE_SIZE;

/// Size of a fixed frame on the wire, terminator included.
pub const FIXED_FRAME_SIZE: usize = FRAME_BODY_SIZE + 1;

/// Nominal payload capacity of a GET/SET/DEL response.
pub const MAX_RESPONSE_PAYLOAD: usize = 511;

/// Default cap on buffered response bytes (export payloads are unbounded
/// on the wire, so the client bounds them locally).
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Status byte of a successful response ('O').
pub const STATUS_OK: u8 = 79;

/// Status byte of a server-side failure ('N').
pub const STATUS_SERVER_ERROR: u8 = 78;

/// Command codes understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    /// Fetch the value of a key.
    Get,
    /// Store a key/value pair.
    Set,
    /// Remove a key.
    Del,
    /// Bulk load a JSON document.
    Import,
    /// Bulk dump the store as JSON.
    Export,
}

impl CommandCode {
    /// Returns the 3-byte wire code.
    pub const fn as_bytes(&self) -> &'static [u8; CMD_SIZE] {
        match self {
            CommandCode::Get => b"get",
            CommandCode::Set => b"set",
            CommandCode::Del => b"del",
            CommandCode::Import => b"imp",
            CommandCode::Export => b"exp",
        }
    }

    /// Returns the wire code as text.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CommandCode::Get => "get",
            CommandCode::Set => "set",
            CommandCode::Del => "del",
            CommandCode::Import => "imp",
            CommandCode::Export => "exp",
        }
    }

    /// Parses a wire code.
    pub fn from_bytes(code: &[u8]) -> Option<Self> {
        match code {
            b"get" => Some(CommandCode::Get),
            b"set" => Some(CommandCode::Set),
            b"del" => Some(CommandCode::Del),
            b"imp" => Some(CommandCode::Import),
            b"exp" => Some(CommandCode::Export),
            _ => None,
        }
    }

    /// Returns true for commands carried in a fixed-size frame.
    pub const fn is_fixed_size(&self) -> bool {
        !matches!(self, CommandCode::Import)
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leading status byte of a response frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The command succeeded.
    Ok = STATUS_OK,
    /// The server rejected or failed the command; payload is the message.
    ServerError = STATUS_SERVER_ERROR,
}

impl Status {
    /// Returns the wire byte.
    #[inline]
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Parses a wire byte.
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            STATUS_OK => Some(Status::Ok),
            STATUS_SERVER_ERROR => Some(Status::ServerError),
            _ => None,
        }
    }
}
