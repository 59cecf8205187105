//! # Request Dispatcher
//!
//! Purpose: Run one request/response exchange at a time over a duplex byte
//! stream and hand each parsed response back to the caller that sent the
//! matching command.
//!
//! ## Structure
//!
//! ```text
//! Dispatcher (owned by the client, behind the gate)
//!   ├── writer: write half of the stream
//!   ├── shared: Arc<Mutex<Shared>>
//!   │     ├── state: Connected | Closed
//!   │     └── pending: Option<oneshot::Sender<..>>   (at most one)
//!   └── reader: JoinHandle of the background read loop
//!         └── read_buf → ResponseAccumulator::feed → deliver(frame)
//! ```
//!
//! The read loop is the only consumer of the read half. A frame that arrives
//! with no pending request is logged and dropped. When the stream ends or
//! fails, the loop marks the connection closed and fails the pending request.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};

use keyval_common::{KeyvalError, KeyvalResult};

use crate::accumulator::ResponseAccumulator;
use crate::codec::ResponseFrame;

/// Read buffer size per `read_buf` call.
const READ_CHUNK_SIZE: usize = 8 * 1024;

type Settlement = KeyvalResult<ResponseFrame>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Connected,
    Closed,
}

struct Shared {
    state: LinkState,
    pending: Option<oneshot::Sender<Settlement>>,
}

impl Shared {
    /// Marks the link closed and fails any pending request with `err`.
    fn close_with(&mut self, err: KeyvalError) {
        self.state = LinkState::Closed;
        if let Some(pending) = self.pending.take() {
            let _ = pending.send(Err(err));
        }
    }
}

/// Options fixed for the lifetime of a dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub request_timeout: Option<Duration>,
    pub max_response_size: usize,
}

/// Owns one connection and correlates each command with its response.
pub struct Dispatcher {
    writer: BoxedWriter,
    shared: Arc<Mutex<Shared>>,
    reader: JoinHandle<()>,
    request_timeout: Option<Duration>,
}

impl Dispatcher {
    /// Splits `stream` and starts the background read loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<S>(stream: S, options: DispatchOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let shared = Arc::new(Mutex::new(Shared {
            state: LinkState::Connected,
            pending: None,
        }));
        let accumulator = ResponseAccumulator::new(options.max_response_size);
        let reader = tokio::spawn(read_loop(read_half, shared.clone(), accumulator));

        Dispatcher {
            writer: Box::new(write_half),
            shared,
            reader,
            request_timeout: options.request_timeout,
        }
    }

    /// Returns true until the connection fails or is closed.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().state == LinkState::Connected
    }

    /// Returns a handle that can close the link without holding the
    /// dispatcher, e.g. while a request is in flight.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            shared: self.shared.clone(),
            reader: self.reader.abort_handle(),
        }
    }

    /// Sends one complete frame and waits for the next response frame.
    ///
    /// # Errors
    /// - `ConnectionClosed` if the link is closed before or during the
    ///   exchange; nothing is written when it was already closed.
    /// - `MalformedResponse` if the stream ended inside a frame or carried
    ///   an invalid one.
    /// - `Timeout` if `request_timeout` elapsed; the link is closed because a
    ///   late response could no longer be matched to its request.
    pub async fn dispatch(&mut self, frame: &Bytes) -> KeyvalResult<ResponseFrame> {
        let receiver = {
            let mut shared = self.shared.lock();
            if shared.state != LinkState::Connected {
                return Err(KeyvalError::ConnectionClosed);
            }
            debug_assert!(shared.pending.is_none(), "request already in flight");
            let (sender, receiver) = oneshot::channel();
            shared.pending = Some(sender);
            receiver
        };
        let mut in_flight = InFlight::new(&self.shared);

        // The limit covers the write too: a peer that stops reading stalls
        // `write_all` once the socket buffer is full.
        let writer = &mut self.writer;
        let exchange = async move {
            write_frame(writer, frame).await?;
            Ok::<_, std::io::Error>(receiver.await)
        };
        let exchanged = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(exchanged) => exchanged,
                Err(_) => {
                    tracing::warn!(timeout = ?limit, "request timed out, closing connection");
                    self.shared.lock().close_with(KeyvalError::Timeout(limit));
                    in_flight.disarm();
                    return Err(KeyvalError::Timeout(limit));
                }
            },
            None => exchange.await,
        };
        in_flight.disarm();

        match exchanged {
            // A dropped sender means the read loop ended without settling.
            Ok(settled) => settled.unwrap_or(Err(KeyvalError::ConnectionClosed)),
            Err(err) => {
                tracing::warn!(error = %err, "write failed, closing connection");
                self.shared.lock().close_with(KeyvalError::ConnectionClosed);
                Err(KeyvalError::ConnectionClosed)
            }
        }
    }

    /// Closes the link: fails future dispatches, shuts down the write half,
    /// and stops the read loop.
    pub async fn shutdown(&mut self) {
        self.shared.lock().close_with(KeyvalError::ConnectionClosed);
        if let Err(err) = self.writer.shutdown().await {
            tracing::debug!(error = %err, "error while shutting down connection");
        }
        self.reader.abort();
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Detached closer for a dispatcher's link.
///
/// Closing fails the pending request with `ConnectionClosed` and stops the
/// read loop. The write half is shut down later by `Dispatcher::shutdown`.
#[derive(Clone)]
pub struct CloseHandle {
    shared: Arc<Mutex<Shared>>,
    reader: AbortHandle,
}

impl CloseHandle {
    pub fn close(&self) {
        self.shared.lock().close_with(KeyvalError::ConnectionClosed);
        self.reader.abort();
    }
}

/// Closes the link if a dispatch future is dropped mid-exchange, since the
/// response it was waiting for would be handed to the next request.
struct InFlight<'a> {
    shared: &'a Mutex<Shared>,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(shared: &'a Mutex<Shared>) -> Self {
        InFlight {
            shared,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("request cancelled mid-exchange, closing connection");
            self.shared.lock().close_with(KeyvalError::ConnectionClosed);
        }
    }
}

async fn write_frame(writer: &mut BoxedWriter, frame: &[u8]) -> std::io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}

async fn read_loop<R>(
    mut reader: R,
    shared: Arc<Mutex<Shared>>,
    mut accumulator: ResponseAccumulator,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = BytesMut::with_capacity(READ_CHUNK_SIZE);

    let outcome = loop {
        chunk.clear();
        match reader.read_buf(&mut chunk).await {
            Ok(0) => break accumulator.finish(),
            Ok(_) => match accumulator.feed(&chunk) {
                Ok(frames) => {
                    for frame in frames {
                        deliver(&shared, frame);
                    }
                    if accumulator.is_failed() {
                        break accumulator.finish();
                    }
                }
                Err(err) => break Err(err),
            },
            Err(err) => break Err(KeyvalError::Io(err)),
        }
    };

    let settle_with = match outcome {
        Ok(()) => {
            tracing::debug!("connection closed by peer");
            KeyvalError::ConnectionClosed
        }
        Err(KeyvalError::MalformedResponse(reason)) => {
            tracing::warn!(%reason, "malformed response, closing connection");
            KeyvalError::MalformedResponse(reason)
        }
        Err(err) => {
            tracing::warn!(error = %err, "transport error, closing connection");
            KeyvalError::ConnectionClosed
        }
    };
    shared.lock().close_with(settle_with);
}

fn deliver(shared: &Mutex<Shared>, frame: ResponseFrame) {
    let pending = shared.lock().pending.take();
    match pending {
        Some(sender) => {
            // The receiver is gone only if the caller was cancelled.
            let _ = sender.send(Ok(frame));
        }
        None => tracing::warn!(status = ?frame.status, "dropping unsolicited response frame"),
    }
}
