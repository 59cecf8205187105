//! # Async Client API
//!
//! Purpose: Expose the five store operations (GET, SET, DEL, IMPORT, EXPORT)
//! over one long-lived mutual-TLS connection.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KeyvalClient` hides framing, the gate, and response
//!    correlation behind plain async methods.
//! 2. **Borrow-Friendly API**: Keys and values are accepted as `&[u8]`.
//! 3. **Validate Before I/O**: Bad input fails before the gate is even taken,
//!    so nothing reaches the wire.
//! 4. **Single Flight**: Every exchange runs while holding the gate; callers
//!    from many tasks are served one at a time in arrival order.

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use keyval_common::{Entry, KeyvalError, KeyvalResult};

use crate::codec::{encode_command, parse_entries, Command, ImportPayload};
use crate::config::{ClientConfig, TlsCredentials};
use crate::dispatcher::{CloseHandle, DispatchOptions, Dispatcher};
use crate::gate::{Gate, GateGuard};
use crate::transport;

/// Observable connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created but never connected.
    Unconnected,
    Connected,
    /// Closed by the caller or by a transport failure.
    Closed,
}

enum Session {
    Unconnected,
    Connected(Dispatcher),
    Closed,
}

/// Client for a KeyVal server.
///
/// The client is `Send + Sync`; share it across tasks with `Arc`. Operations
/// issued concurrently are queued and run one at a time.
pub struct KeyvalClient {
    config: ClientConfig,
    session: Gate<Session>,
    closer: Mutex<Option<CloseHandle>>,
}

impl KeyvalClient {
    /// Creates an unconnected client. Call `connect` before issuing commands.
    pub fn new(config: ClientConfig) -> Self {
        KeyvalClient {
            config,
            session: Gate::new(Session::Unconnected),
            closer: Mutex::new(None),
        }
    }

    /// Creates a client and connects it using the credentials named in
    /// `config`.
    pub async fn connect_with(config: ClientConfig) -> KeyvalResult<Self> {
        let client = KeyvalClient::new(config);
        client.connect().await?;
        Ok(client)
    }

    /// Creates a client that is already connected over `stream`.
    ///
    /// `stream` may be any duplex byte stream, e.g. an in-memory pipe in
    /// tests. Must be called from within a Tokio runtime.
    pub fn with_transport<S>(stream: S, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let dispatcher = Dispatcher::spawn(stream, dispatch_options(&config));
        KeyvalClient {
            config,
            closer: Mutex::new(Some(dispatcher.close_handle())),
            session: Gate::new(Session::Connected(dispatcher)),
        }
    }

    /// Returns the configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Loads credentials from disk and connects.
    ///
    /// Reconnects if the previous connection was closed; does nothing if the
    /// client is already connected, without touching the credential files.
    pub async fn connect(&self) -> KeyvalResult<()> {
        let mut session = self.session.acquire().await;
        if is_live(&session) {
            return Ok(());
        }
        let creds = TlsCredentials::load(&self.config)?;
        self.open(&mut session, &creds).await
    }

    /// Connects using credentials that are already in memory.
    pub async fn connect_with_credentials(&self, creds: &TlsCredentials) -> KeyvalResult<()> {
        let mut session = self.session.acquire().await;
        if is_live(&session) {
            return Ok(());
        }
        self.open(&mut session, creds).await
    }

    /// Reports the current connection state.
    ///
    /// Waits for any in-flight request to finish first.
    pub async fn state(&self) -> ConnectionState {
        match &*self.session.acquire().await {
            Session::Unconnected => ConnectionState::Unconnected,
            Session::Connected(dispatcher) if dispatcher.is_connected() => {
                ConnectionState::Connected
            }
            Session::Connected(_) | Session::Closed => ConnectionState::Closed,
        }
    }

    /// Closes the connection.
    ///
    /// A request in flight settles with `ConnectionClosed`. Later operations
    /// fail the same way until `connect` is called again.
    pub async fn close(&self) {
        let closer = self.closer.lock().take();
        if let Some(closer) = closer {
            closer.close();
        }

        let mut session = self.session.acquire().await;
        if let Session::Connected(dispatcher) = &mut *session {
            dispatcher.shutdown().await;
            tracing::debug!(endpoint = %self.config.endpoint(), "connection closed");
        }
        *session = Session::Closed;
    }

    /// Fetches the value stored under `key`.
    ///
    /// A missing key is reported by the server as `ServerResponse`.
    pub async fn get(&self, key: &[u8]) -> KeyvalResult<Vec<u8>> {
        let payload = self.execute(Command::get(key)?).await?;
        Ok(payload.to_vec())
    }

    /// Stores `value` under `key`.
    pub async fn set(&self, key: &[u8], value: &[u8]) -> KeyvalResult<()> {
        self.execute(Command::set(key, value)?).await?;
        Ok(())
    }

    /// Deletes `key`.
    pub async fn del(&self, key: &[u8]) -> KeyvalResult<()> {
        self.execute(Command::del(key)?).await?;
        Ok(())
    }

    /// Bulk-loads entries.
    ///
    /// Accepts JSON text, a `serde_json::Value`, raw UTF-8 bytes, or a list of
    /// `Entry`. The document must describe a list of `{"key", "value"}`
    /// entries; a JSON object is taken as a key to value map.
    pub async fn import(&self, payload: impl Into<ImportPayload>) -> KeyvalResult<()> {
        self.execute(Command::import(payload.into())?).await?;
        Ok(())
    }

    /// Serializes `value` with serde and imports it.
    pub async fn import_entries<T: Serialize + ?Sized>(&self, value: &T) -> KeyvalResult<()> {
        self.import(ImportPayload::from_serialize(value)?).await
    }

    /// Dumps the whole store as the server's JSON document.
    pub async fn export(&self) -> KeyvalResult<Vec<u8>> {
        let payload = self.execute(Command::export()).await?;
        Ok(payload.to_vec())
    }

    /// Dumps the whole store and parses it into entries.
    pub async fn export_entries(&self) -> KeyvalResult<Vec<Entry>> {
        let payload = self.execute(Command::export()).await?;
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        let text = std::str::from_utf8(&payload).map_err(|err| {
            KeyvalError::MalformedResponse(format!("export payload is not UTF-8: {}", err))
        })?;
        parse_entries(text)
    }

    async fn execute(&self, command: Command) -> KeyvalResult<Bytes> {
        let frame = encode_command(&command);
        let mut session = self.session.acquire().await;

        let dispatcher = match &mut *session {
            Session::Connected(dispatcher) => dispatcher,
            Session::Unconnected | Session::Closed => return Err(KeyvalError::ConnectionClosed),
        };
        tracing::trace!(command = %command.code(), frame_len = frame.len(), "sending command");
        let outcome = dispatcher.dispatch(&frame).await;

        if !dispatcher.is_connected() {
            tracing::debug!(endpoint = %self.config.endpoint(), "connection lost");
            self.closer.lock().take();
            *session = Session::Closed;
        }
        outcome?.into_result()
    }

    async fn open(
        &self,
        session: &mut GateGuard<'_, Session>,
        creds: &TlsCredentials,
    ) -> KeyvalResult<()> {
        tracing::debug!(endpoint = %self.config.endpoint(), "connecting");
        let stream = transport::connect_tls(&self.config, creds).await?;
        let dispatcher = Dispatcher::spawn(stream, dispatch_options(&self.config));
        *self.closer.lock() = Some(dispatcher.close_handle());
        **session = Session::Connected(dispatcher);
        tracing::debug!(endpoint = %self.config.endpoint(), "connected");
        Ok(())
    }
}

fn is_live(session: &Session) -> bool {
    matches!(session, Session::Connected(dispatcher) if dispatcher.is_connected())
}

fn dispatch_options(config: &ClientConfig) -> DispatchOptions {
    DispatchOptions {
        request_timeout: config.request_timeout,
        max_response_size: config.max_response_size,
    }
}
