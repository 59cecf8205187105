// keyval-common - Shared types and protocol definitions for the KeyVal client
//
// This crate defines the wire constants, bounded key/value types, and the
// error taxonomy used by keyval-client and keyval-cli.

pub mod error;
pub mod protocol;
pub mod types;

// Re-export for convenience
pub use error::*;
pub use protocol::*;
pub use types::*;
