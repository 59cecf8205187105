//! # Client Configuration
//!
//! Connection settings, optional timeouts, and the PEM credentials needed for
//! mutual TLS.
//!
//! Credentials are read eagerly by `TlsCredentials::load` so that a missing or
//! unreadable file fails as a setup error before any connection attempt.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use keyval_common::{KeyvalError, KeyvalResult, DEFAULT_MAX_RESPONSE_SIZE};

/// Default server port.
pub const DEFAULT_PORT: u16 = 6842;

/// Configuration for a `KeyvalClient`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -------------------------------------------------------------------------
    // Endpoint
    // -------------------------------------------------------------------------
    /// Server host name or IP address
    pub host: String,

    /// Server TCP port
    pub port: u16,

    /// Name checked against the server certificate; defaults to `host`
    pub server_name: Option<String>,

    // -------------------------------------------------------------------------
    // Credentials (PEM files)
    // -------------------------------------------------------------------------
    /// Client certificate chain
    pub cert_path: PathBuf,

    /// Client private key
    pub key_path: PathBuf,

    /// CA bundle used to verify the server
    pub ca_path: PathBuf,

    // -------------------------------------------------------------------------
    // Limits
    // -------------------------------------------------------------------------
    /// Bound on TCP connect plus TLS handshake
    pub connect_timeout: Option<Duration>,

    /// Bound on each request/response exchange
    pub request_timeout: Option<Duration>,

    /// Cap on buffered bytes of a single response frame
    pub max_response_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            server_name: None,
            cert_path: PathBuf::from("client.crt"),
            key_path: PathBuf::from("client.key"),
            ca_path: PathBuf::from("ca.crt"),
            connect_timeout: None,
            request_timeout: None,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Name used for server certificate verification.
    pub fn server_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.host)
    }

    /// `host:port` form of the endpoint, for logging.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the server host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the name verified against the server certificate
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = Some(name.into());
        self
    }

    /// Set the client certificate path
    pub fn cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cert_path = path.into();
        self
    }

    /// Set the client private key path
    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.key_path = path.into();
        self
    }

    /// Set the CA bundle path
    pub fn ca_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ca_path = path.into();
        self
    }

    /// Bound connect + handshake time
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Bound each request/response exchange
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Set the cap on buffered response bytes
    pub fn max_response_size(mut self, bytes: usize) -> Self {
        self.config.max_response_size = bytes;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// PEM-encoded key, certificate, and CA bundle.
#[derive(Clone)]
pub struct TlsCredentials {
    pub key: Vec<u8>,
    pub cert: Vec<u8>,
    pub ca: Vec<u8>,
}

impl TlsCredentials {
    /// Wraps PEM blobs that are already in memory.
    pub fn from_pem(key: impl Into<Vec<u8>>, cert: impl Into<Vec<u8>>, ca: impl Into<Vec<u8>>) -> Self {
        TlsCredentials {
            key: key.into(),
            cert: cert.into(),
            ca: ca.into(),
        }
    }

    /// Reads the three PEM files named by `config`.
    ///
    /// # Errors
    /// Returns `KeyvalError::Setup` naming the first file that cannot be read.
    pub fn load(config: &ClientConfig) -> KeyvalResult<Self> {
        Ok(TlsCredentials {
            key: read_pem(&config.key_path, "private key")?,
            cert: read_pem(&config.cert_path, "certificate")?,
            ca: read_pem(&config.ca_path, "CA bundle")?,
        })
    }
}

// The private key never reaches logs.
impl fmt::Debug for TlsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsCredentials")
            .field("key", &format_args!("<{} bytes redacted>", self.key.len()))
            .field("cert", &format_args!("<{} bytes>", self.cert.len()))
            .field("ca", &format_args!("<{} bytes>", self.ca.len()))
            .finish()
    }
}

fn read_pem(path: &Path, what: &str) -> KeyvalResult<Vec<u8>> {
    fs::read(path).map_err(|err| {
        KeyvalError::Setup(format!("failed to read {} '{}': {}", what, path.display(), err))
    })
}
