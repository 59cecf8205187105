//! # KeyVal Async Client
//!
//! Purpose: Talk to a KeyVal server over a mutually authenticated TLS
//! connection using its fixed-frame binary protocol.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KeyvalClient` is the only type most callers need.
//! 2. **Pure Codec**: Framing and parsing live in `codec` and never touch I/O.
//! 3. **One Request in Flight**: The `Gate` serializes callers; the
//!    `Dispatcher` pairs each command with the next response frame.
//! 4. **Fail Fast**: Oversized input and malformed responses surface as typed
//!    errors instead of corrupting the stream.

mod accumulator;
mod client;
mod codec;
mod config;
mod dispatcher;
mod gate;
mod transport;

pub use accumulator::ResponseAccumulator;
pub use client::{ConnectionState, KeyvalClient};
pub use codec::{
    decode_response, encode_command, parse_entries, Command, ImportPayload, ResponseFrame,
};
pub use config::{ClientConfig, ClientConfigBuilder, TlsCredentials, DEFAULT_PORT};
pub use dispatcher::{CloseHandle, DispatchOptions, Dispatcher};
pub use gate::{Gate, GateGuard};
pub use transport::{build_tls_config, connect_tls};

pub use keyval_common::{Entry, ErrorCode, Key, KeyvalError, KeyvalResult, Status, Value};
