//! # Response Accumulator
//!
//! Purpose: Reassemble response frames from byte chunks of any size, in the
//! order they arrive on the connection.
//!
//! ## Design Principles
//! 1. **Buffer Reuse**: One `BytesMut` grows to the largest frame seen and is
//!    advanced past each decoded frame.
//! 2. **Incremental Scan**: Bytes already searched for a terminator are not
//!    searched again when the next chunk arrives.
//! 3. **Bounded Memory**: A frame larger than the configured cap is rejected
//!    rather than buffered forever.

use bytes::{Buf, BytesMut};

use keyval_common::{KeyvalError, KeyvalResult, EOT};

use crate::codec::{decode_response, ResponseFrame};

/// Collects chunks until complete response frames can be decoded.
#[derive(Debug)]
pub struct ResponseAccumulator {
    buf: BytesMut,
    /// Prefix of `buf` known to contain no terminator.
    scanned: usize,
    max_frame_size: usize,
    /// Set once an invalid frame is seen; the stream is unusable after it.
    failure: Option<String>,
}

impl ResponseAccumulator {
    /// Creates an accumulator that rejects frames above `max_frame_size`.
    pub fn new(max_frame_size: usize) -> Self {
        ResponseAccumulator {
            buf: BytesMut::with_capacity(1024),
            scanned: 0,
            max_frame_size,
            failure: None,
        }
    }

    /// Appends a chunk and returns every frame it completed, in order.
    ///
    /// Zero-length chunks are accepted and produce no frames. Frames that
    /// precede an invalid one are still returned; the invalid frame is
    /// reported by the next `feed` or `finish`.
    pub fn feed(&mut self, chunk: &[u8]) -> KeyvalResult<Vec<ResponseFrame>> {
        self.check()?;
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            if !self.buf[self.scanned..].contains(&EOT) {
                self.scanned = self.buf.len();
                break;
            }
            match decode_response(&self.buf) {
                Ok(Some((frame, used))) => {
                    self.buf.advance(used);
                    self.scanned = 0;
                    frames.push(frame);
                }
                Ok(None) => break,
                Err(err) => {
                    self.failure = Some(match err {
                        KeyvalError::MalformedResponse(reason) => reason,
                        other => other.to_string(),
                    });
                    break;
                }
            }
        }

        if frames.is_empty() {
            self.check()?;
        }
        if self.failure.is_none() && self.buf.len() > self.max_frame_size {
            return Err(KeyvalError::MalformedResponse(format!(
                "response exceeds {} bytes without a terminator",
                self.max_frame_size
            )));
        }
        Ok(frames)
    }

    /// Checks the buffer when the stream has ended.
    ///
    /// # Errors
    /// Returns `KeyvalError::MalformedResponse` if a frame was cut short or
    /// an invalid frame was seen.
    pub fn finish(&self) -> KeyvalResult<()> {
        self.check()?;
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(KeyvalError::MalformedResponse(format!(
                "stream ended inside a frame ({} bytes buffered)",
                self.buf.len()
            )))
        }
    }

    /// True once an invalid frame has been seen.
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    fn check(&self) -> KeyvalResult<()> {
        match &self.failure {
            Some(reason) => Err(KeyvalError::MalformedResponse(reason.clone())),
            None => Ok(()),
        }
    }

    /// Number of bytes belonging to an incomplete frame.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}
