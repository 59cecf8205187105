//! In-process fake KeyVal server shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use keyval_common::{CommandCode, Entry, EOT, FIXED_FRAME_SIZE, MAX_RESPONSE_PAYLOAD};

/// Length of the value buffer the server pads GET replies to.
const REPLY_PAD: usize = MAX_RESPONSE_PAYLOAD;

/// How the fake server reacts to each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Serve requests against an in-memory store.
    Normal,
    /// Read one frame, then hang up without replying.
    HangUp,
    /// Read one frame, reply with half a frame, then hang up.
    Truncate,
    /// Read frames but never reply.
    Silent,
}

/// Every complete frame the server has read, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Recorder {
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }

    fn push(&self, frame: Vec<u8>) {
        self.frames.lock().push(frame);
    }
}

/// Serves one connection until the peer goes away.
pub async fn serve<S>(stream: S, behavior: Behavior, recorder: Recorder)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let mut store: BTreeMap<String, JsonValue> = BTreeMap::new();

    loop {
        let mut frame = Vec::new();
        match reader.read_until(EOT, &mut frame).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        assert_complete(&frame);
        recorder.push(frame.clone());

        let reply = match behavior {
            Behavior::Normal => handle(&mut store, &frame),
            Behavior::HangUp => return,
            Behavior::Truncate => {
                let _ = write_half.write_all(b"Ohalf a fra").await;
                let _ = write_half.shutdown().await;
                return;
            }
            Behavior::Silent => continue,
        };
        if write_half.write_all(&reply).await.is_err() {
            return;
        }
    }
}

/// Panics unless `frame` is exactly one self-contained command.
fn assert_complete(frame: &[u8]) {
    assert_eq!(frame.last(), Some(&EOT), "frame missing terminator");
    let code = CommandCode::from_bytes(&frame[..frame.len().min(3)])
        .unwrap_or_else(|| panic!("unknown command code in {:?}", String::from_utf8_lossy(frame)));
    if code.is_fixed_size() {
        assert_eq!(frame.len(), FIXED_FRAME_SIZE, "{code} frame has wrong length");
    }
}

fn handle(store: &mut BTreeMap<String, JsonValue>, frame: &[u8]) -> Vec<u8> {
    let body = &frame[..frame.len() - 1];
    let (code, rest) = body.split_at(3);
    match code {
        b"get" => {
            let key = field(&rest[..256]);
            match store.get(&key) {
                Some(value) => ok_padded(render(value).as_bytes()),
                None => error("key not found"),
            }
        }
        b"set" => {
            let key = field(&rest[..256]);
            let value = field(&rest[256..]);
            store.insert(key, JsonValue::String(value));
            ok(b"")
        }
        b"del" => {
            let key = field(&rest[..256]);
            match store.remove(&key) {
                Some(_) => ok(b""),
                None => error("key not found"),
            }
        }
        b"imp" => match serde_json::from_slice::<Vec<Entry>>(rest) {
            Ok(entries) => {
                for entry in entries {
                    store.insert(entry.key, entry.value);
                }
                ok(b"")
            }
            Err(_) => error("invalid import document"),
        },
        b"exp" => {
            let entries: Vec<Entry> = store
                .iter()
                .map(|(key, value)| Entry::new(key.clone(), value.clone()))
                .collect();
            ok(&serde_json::to_vec(&entries).unwrap())
        }
        _ => error("unknown command"),
    }
}

fn field(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn render(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn ok(payload: &[u8]) -> Vec<u8> {
    let mut reply = vec![b'O'];
    reply.extend_from_slice(payload);
    reply.push(EOT);
    reply
}

fn ok_padded(payload: &[u8]) -> Vec<u8> {
    let mut reply = vec![b'O'];
    reply.extend_from_slice(payload);
    reply.resize(1 + REPLY_PAD.max(payload.len()), 0);
    reply.push(EOT);
    reply
}

fn error(message: &str) -> Vec<u8> {
    let mut reply = vec![b'N'];
    reply.extend_from_slice(message.as_bytes());
    reply.resize(1 + REPLY_PAD, 0);
    reply.push(EOT);
    reply
}
