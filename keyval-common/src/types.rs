//! # Key/Value Type Definitions
//!
//! Bounded key and value types validated once at the API boundary, and the
//! JSON entry shape used by bulk import/export.
//!
//! ## Design Principles
//!
//! 1. **Fixed Maximum Sizes**: Keys (256B) and values (512B) match the fixed
//!    regions of a command frame, so a validated key can be copied into a frame
//!    without further checks.
//!
//! 2. **Length Prefix + Fixed Buffer**: The buffer is zero-filled past `len`,
//!    which is exactly the zero padding the wire format requires.
//!
//! 3. **Reserved Terminator**: The EOT byte ends every frame, so it is rejected
//!    inside keys and values at construction time.
//!
//! 4. **Len-Based Eq/Hash**: Compare and hash only initialized bytes.
//!
//! ## Memory Layout Example
//!
//! ```text
//! Key (258 bytes total):
//! +--------+-----------+
//! | len:2B | data:256B |
//! +--------+-----------+
//!
//! Value (514 bytes total):
//! +--------+------------+
//! | len:2B | data:512B  |
//! +--------+------------+
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{KeyvalError, KeyvalResult};
use crate::protocol::{EOT, MAX_KEY_SIZE, MAX_VALUE_SIZE};

/// Key type with bounded size.
#[derive(Clone)]
pub struct Key {
    /// Actual length of key data (≤ MAX_KEY_SIZE)
    len: u16,
    /// Key data buffer (only first `len` bytes are valid, the rest is zero)
    data: [u8; MAX_KEY_SIZE],
}

// Compare only initialized bytes (length-prefixed buffer pattern).
impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len.hash(state);
        self.as_bytes().hash(state);
    }
}

impl Key {
    /// Creates a new Key from a byte slice.
    ///
    /// # Errors
    /// Returns `KeyvalError::KeySize` if data exceeds MAX_KEY_SIZE and
    /// `KeyvalError::ReservedByte` if it contains the frame terminator.
    ///
    /// # Examples
    /// ```rust
    /// use keyval_common::{Key, KeyvalError, MAX_KEY_SIZE};
    ///
    /// let key = Key::new(b"alpha").expect("valid key");
    /// assert_eq!(key.as_bytes(), b"alpha");
    ///
    /// let too_long = vec![b'k'; MAX_KEY_SIZE + 1];
    /// assert!(matches!(Key::new(&too_long), Err(KeyvalError::KeySize { len: 257 })));
    /// ```
    pub fn new(data: &[u8]) -> KeyvalResult<Self> {
        if data.len() > MAX_KEY_SIZE {
            return Err(KeyvalError::KeySize { len: data.len() });
        }
        if data.contains(&EOT) {
            return Err(KeyvalError::ReservedByte { field: "key" });
        }

        let mut key = Key {
            len: data.len() as u16,
            data: [0u8; MAX_KEY_SIZE],
        };
        key.data[..data.len()].copy_from_slice(data);
        Ok(key)
    }

    /// Returns the valid key data as a slice
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Returns the whole zero-padded key region as laid out on the wire.
    #[inline]
    pub fn as_padded(&self) -> &[u8; MAX_KEY_SIZE] {
        &self.data
    }

    /// Returns the key length
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns true if key is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// Value type with bounded size.
#[derive(Clone)]
pub struct Value {
    /// Actual length of value data (≤ MAX_VALUE_SIZE)
    len: u16,
    /// Value data buffer (only first `len` bytes are valid, the rest is zero)
    data: [u8; MAX_VALUE_SIZE],
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len.hash(state);
        self.as_bytes().hash(state);
    }
}

impl Value {
    /// Creates a new Value from a byte slice.
    ///
    /// # Errors
    /// Returns `KeyvalError::ValueSize` if data exceeds MAX_VALUE_SIZE and
    /// `KeyvalError::ReservedByte` if it contains the frame terminator.
    pub fn new(data: &[u8]) -> KeyvalResult<Self> {
        if data.len() > MAX_VALUE_SIZE {
            return Err(KeyvalError::ValueSize { len: data.len() });
        }
        if data.contains(&EOT) {
            return Err(KeyvalError::ReservedByte { field: "value" });
        }

        let mut value = Value {
            len: data.len() as u16,
            data: [0u8; MAX_VALUE_SIZE],
        };
        value.data[..data.len()].copy_from_slice(data);
        Ok(value)
    }

    /// Returns the valid value data as a slice
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Returns the whole zero-padded value region as laid out on the wire.
    #[inline]
    pub fn as_padded(&self) -> &[u8; MAX_VALUE_SIZE] {
        &self.data
    }

    /// Returns the value length
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns true if value is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.len() <= 32 {
            write!(f, "Value({:?})", String::from_utf8_lossy(self.as_bytes()))
        } else {
            write!(f, "Value({}B)", self.len())
        }
    }
}

/// One record of an import/export document.
///
/// Documents are JSON arrays of `{"key": "...", "value": ...}` objects; the
/// value is kept as arbitrary JSON since the server stores it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: serde_json::Value,
}

impl Entry {
    /// Builds an entry from a key and any JSON value.
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Entry {
            key: key.into(),
            value: value.into(),
        }
    }
}
