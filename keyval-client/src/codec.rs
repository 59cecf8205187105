//! # Frame Encoding and Parsing
//!
//! Purpose: Translate client commands into wire frames and wire bytes into
//! response frames, without touching any I/O.
//!
//! ## Design Principles
//! 1. **Validate at Construction**: `Command` constructors enforce key/value
//!    bounds and the reserved terminator, so encoding itself cannot fail.
//! 2. **Fixed vs. Variable Frames**: GET/SET/DEL/EXPORT use the padded fixed
//!    frame; IMPORT is sized to its payload and never padded.
//! 3. **State-Free Parsing**: `decode_response` inspects a byte slice and
//!    reports how much it consumed; buffering lives in the accumulator.
//! 4. **Fail Fast**: Unknown status bytes surface as malformed responses.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value as JsonValue;

use keyval_common::{
    CommandCode, Entry, Key, KeyvalError, KeyvalResult, Status, Value, CMD_SIZE, EOT,
    FIXED_FRAME_SIZE, FRAME_BODY_SIZE, KEY_OFFSET, VALUE_OFFSET,
};

/// A validated client command, ready to encode.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get { key: Key },
    Set { key: Key, value: Value },
    Del { key: Key },
    /// JSON document already checked to be a list of entries.
    Import { document: Bytes },
    Export,
}

impl Command {
    /// Builds a GET command.
    pub fn get(key: &[u8]) -> KeyvalResult<Self> {
        Ok(Command::Get { key: Key::new(key)? })
    }

    /// Builds a SET command.
    pub fn set(key: &[u8], value: &[u8]) -> KeyvalResult<Self> {
        Ok(Command::Set {
            key: Key::new(key)?,
            value: Value::new(value)?,
        })
    }

    /// Builds a DEL command.
    pub fn del(key: &[u8]) -> KeyvalResult<Self> {
        Ok(Command::Del { key: Key::new(key)? })
    }

    /// Builds an IMPORT command from any supported payload.
    pub fn import(payload: ImportPayload) -> KeyvalResult<Self> {
        Ok(Command::Import {
            document: payload.into_document()?,
        })
    }

    /// Builds an EXPORT command.
    pub fn export() -> Self {
        Command::Export
    }

    /// Returns the wire command code.
    pub fn code(&self) -> CommandCode {
        match self {
            Command::Get { .. } => CommandCode::Get,
            Command::Set { .. } => CommandCode::Set,
            Command::Del { .. } => CommandCode::Del,
            Command::Import { .. } => CommandCode::Import,
            Command::Export => CommandCode::Export,
        }
    }
}

/// Encodes a command into one immutable wire frame.
pub fn encode_command(command: &Command) -> Bytes {
    if let Command::Import { document } = command {
        let mut frame = BytesMut::with_capacity(CMD_SIZE + document.len() + 1);
        frame.put_slice(CommandCode::Import.as_bytes());
        frame.put_slice(document);
        frame.put_u8(EOT);
        return frame.freeze();
    }

    let mut frame = BytesMut::zeroed(FIXED_FRAME_SIZE);
    frame[..CMD_SIZE].copy_from_slice(command.code().as_bytes());
    match command {
        Command::Get { key } | Command::Del { key } => {
            frame[KEY_OFFSET..VALUE_OFFSET].copy_from_slice(key.as_padded());
        }
        Command::Set { key, value } => {
            frame[KEY_OFFSET..VALUE_OFFSET].copy_from_slice(key.as_padded());
            frame[VALUE_OFFSET..FRAME_BODY_SIZE].copy_from_slice(value.as_padded());
        }
        Command::Export | Command::Import { .. } => {}
    }
    frame[FRAME_BODY_SIZE] = EOT;
    frame.freeze()
}

/// One decoded response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub status: Status,
    /// Payload with the terminator and trailing zero padding removed.
    pub payload: Bytes,
}

impl ResponseFrame {
    /// Returns true for an OK status.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Converts the frame into the caller's outcome.
    ///
    /// A server error becomes `KeyvalError::ServerResponse` carrying the
    /// payload as text.
    pub fn into_result(self) -> KeyvalResult<Bytes> {
        match self.status {
            Status::Ok => Ok(self.payload),
            Status::ServerError => Err(KeyvalError::ServerResponse(
                String::from_utf8_lossy(&self.payload).into_owned(),
            )),
        }
    }
}

/// Decodes one response frame from the front of `buf`.
///
/// Returns `Ok(None)` when no terminator has arrived yet, or the frame and
/// the number of bytes it occupied (terminator included).
pub fn decode_response(buf: &[u8]) -> KeyvalResult<Option<(ResponseFrame, usize)>> {
    let end = match buf.iter().position(|&b| b == EOT) {
        Some(end) => end,
        None => return Ok(None),
    };
    if end == 0 {
        return Err(KeyvalError::MalformedResponse(
            "frame terminated before its status byte".to_string(),
        ));
    }

    let status = Status::from_u8(buf[0]).ok_or_else(|| {
        KeyvalError::MalformedResponse(format!("unknown status byte 0x{:02x}", buf[0]))
    })?;
    let payload = trim_padding(&buf[1..end]);

    Ok(Some((
        ResponseFrame {
            status,
            payload: Bytes::copy_from_slice(payload),
        },
        end + 1,
    )))
}

// The server pads GET values and error messages with zeroes up to a fixed
// buffer size.
fn trim_padding(payload: &[u8]) -> &[u8] {
    let len = payload.iter().rposition(|&b| b != 0).map_or(0, |idx| idx + 1);
    &payload[..len]
}

/// Input accepted by IMPORT.
///
/// The server expects a JSON array of `{"key", "value"}` entries. Text is
/// sent as written once it validates; structured values are serialized.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportPayload {
    /// A JSON document as text.
    Text(String),
    /// A JSON array of entries, or an object mapping keys to values.
    Structured(JsonValue),
    /// Raw bytes; accepted only when they are UTF-8 JSON text.
    Raw(Vec<u8>),
}

impl ImportPayload {
    /// Serializes any value into a structured payload.
    ///
    /// # Errors
    /// Returns `KeyvalError::UnknownType` when the value cannot be represented
    /// as JSON.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> KeyvalResult<Self> {
        serde_json::to_value(value)
            .map(ImportPayload::Structured)
            .map_err(|err| KeyvalError::UnknownType(err.to_string()))
    }

    /// Validates the payload and returns the document bytes to send.
    pub fn into_document(self) -> KeyvalResult<Bytes> {
        match self {
            ImportPayload::Text(text) => {
                parse_entries(&text)?;
                Ok(Bytes::from(text))
            }
            ImportPayload::Raw(raw) => {
                let text = String::from_utf8(raw).map_err(|_| {
                    KeyvalError::UnknownType("payload is neither UTF-8 text nor JSON".to_string())
                })?;
                ImportPayload::Text(text).into_document()
            }
            ImportPayload::Structured(value) => {
                let entries = structured_entries(value)?;
                Ok(Bytes::from(serde_json::to_vec(&entries)?))
            }
        }
    }
}

impl From<String> for ImportPayload {
    fn from(text: String) -> Self {
        ImportPayload::Text(text)
    }
}

impl From<&str> for ImportPayload {
    fn from(text: &str) -> Self {
        ImportPayload::Text(text.to_string())
    }
}

impl From<JsonValue> for ImportPayload {
    fn from(value: JsonValue) -> Self {
        ImportPayload::Structured(value)
    }
}

impl From<Vec<u8>> for ImportPayload {
    fn from(raw: Vec<u8>) -> Self {
        ImportPayload::Raw(raw)
    }
}

impl From<&[u8]> for ImportPayload {
    fn from(raw: &[u8]) -> Self {
        ImportPayload::Raw(raw.to_vec())
    }
}

impl From<Vec<Entry>> for ImportPayload {
    fn from(entries: Vec<Entry>) -> Self {
        let items = entries
            .into_iter()
            .map(|entry| serde_json::json!({ "key": entry.key, "value": entry.value }))
            .collect();
        ImportPayload::Structured(JsonValue::Array(items))
    }
}

/// Parses a JSON document into entries.
pub fn parse_entries(text: &str) -> KeyvalResult<Vec<Entry>> {
    Ok(serde_json::from_str(text)?)
}

fn structured_entries(value: JsonValue) -> KeyvalResult<Vec<Entry>> {
    match value {
        JsonValue::Array(_) => Ok(serde_json::from_value(value)?),
        JsonValue::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| Entry { key, value })
            .collect()),
        other => Err(KeyvalError::UnknownType(format!(
            "expected a JSON array or object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
