//! # Transport Provider
//!
//! Opens a TCP connection with keep-alive enabled and completes a TLS 1.3
//! handshake that presents the client certificate and verifies the server
//! against the configured CA bundle.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::RootCertStore;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use keyval_common::{KeyvalError, KeyvalResult};

use crate::config::{ClientConfig, TlsCredentials};

/// Connects to the configured endpoint and performs the mutual TLS handshake.
///
/// The whole sequence is bounded by `config.connect_timeout` when set.
///
/// # Errors
/// - `Setup` for unusable credentials or an invalid server name.
/// - `Unauthorized` when the handshake rejects either certificate.
/// - `Timeout` when the connect timeout elapses.
/// - `Io` for resolution and socket failures.
pub async fn connect_tls(
    config: &ClientConfig,
    creds: &TlsCredentials,
) -> KeyvalResult<TlsStream<TcpStream>> {
    let tls = build_tls_config(creds)?;
    let server_name = ServerName::try_from(config.server_name().to_string()).map_err(|err| {
        KeyvalError::Setup(format!("invalid server name '{}': {}", config.server_name(), err))
    })?;

    let connecting = async {
        let tcp = open_tcp(config).await?;
        tracing::debug!(server_name = config.server_name(), "starting TLS handshake");
        TlsConnector::from(tls)
            .connect(server_name, tcp)
            .await
            .map_err(handshake_error)
    };

    match config.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, connecting)
            .await
            .map_err(|_| KeyvalError::Timeout(limit))?,
        None => connecting.await,
    }
}

/// Builds a TLS 1.3 client configuration from PEM credentials.
pub fn build_tls_config(creds: &TlsCredentials) -> KeyvalResult<Arc<rustls::ClientConfig>> {
    // rustls 0.23 needs a process-wide provider; a second install is a no-op.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let mut roots = RootCertStore::empty();
    for cert in parse_certs(&creds.ca, "CA bundle")? {
        roots
            .add(cert)
            .map_err(|err| KeyvalError::Setup(format!("invalid CA certificate: {}", err)))?;
    }

    let chain = parse_certs(&creds.cert, "client certificate")?;
    let key = parse_key(&creds.key)?;

    let config = rustls::ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(|err| KeyvalError::Setup(format!("client certificate rejected: {}", err)))?;

    Ok(Arc::new(config))
}

fn parse_certs(pem: &[u8], what: &str) -> KeyvalResult<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| KeyvalError::Setup(format!("failed to parse {}: {}", what, err)))?;
    if certs.is_empty() {
        return Err(KeyvalError::Setup(format!("no certificates found in {}", what)));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> KeyvalResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|err| KeyvalError::Setup(format!("failed to parse private key: {}", err)))?
        .ok_or_else(|| KeyvalError::Setup("no private key found".to_string()))
}

async fn open_tcp(config: &ClientConfig) -> KeyvalResult<TcpStream> {
    let endpoint = config.endpoint();
    let mut last_err = None;

    for addr in lookup_host(endpoint.as_str()).await? {
        match connect_addr(addr).await {
            Ok(stream) => {
                tracing::debug!(%addr, "tcp connected");
                return Ok(stream);
            }
            Err(err) => {
                tracing::debug!(%addr, error = %err, "tcp connect failed");
                last_err = Some(err);
            }
        }
    }

    Err(KeyvalError::Io(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses resolved for {}", endpoint),
        )
    })))
}

async fn connect_addr(addr: SocketAddr) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(true)?;
    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

// tokio-rustls reports certificate and alert failures as InvalidData.
fn handshake_error(err: io::Error) -> KeyvalError {
    if err.kind() == io::ErrorKind::InvalidData {
        KeyvalError::Unauthorized(err.to_string())
    } else {
        KeyvalError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed() -> (String, String) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("Failed to generate test certificate");
        (cert.cert.pem(), cert.key_pair.serialize_pem())
    }

    #[test]
    fn test_builds_config_from_pem() {
        let (cert, key) = self_signed();
        let creds = TlsCredentials::from_pem(key, cert.clone(), cert);
        assert!(build_tls_config(&creds).is_ok());
    }

    #[test]
    fn test_empty_ca_is_setup_error() {
        let (cert, key) = self_signed();
        let creds = TlsCredentials::from_pem(key, cert, "");
        let err = build_tls_config(&creds).unwrap_err();
        assert!(matches!(err, KeyvalError::Setup(ref msg) if msg.contains("CA bundle")));
    }

    #[test]
    fn test_missing_key_is_setup_error() {
        let (cert, _) = self_signed();
        let creds = TlsCredentials::from_pem("not a key", cert.clone(), cert);
        let err = build_tls_config(&creds).unwrap_err();
        assert!(matches!(err, KeyvalError::Setup(ref msg) if msg.contains("private key")));
    }

    #[test]
    fn test_handshake_errors_map_to_unauthorized() {
        let err = handshake_error(io::Error::new(io::ErrorKind::InvalidData, "bad certificate"));
        assert!(matches!(err, KeyvalError::Unauthorized(_)));

        let err = handshake_error(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(err, KeyvalError::Io(_)));
    }

    #[tokio::test]
    async fn test_invalid_server_name_is_setup_error() {
        let (cert, key) = self_signed();
        let creds = TlsCredentials::from_pem(key, cert.clone(), cert);
        let config = ClientConfig::builder().server_name("not a valid name!").build();
        let err = connect_tls(&config, &creds).await.unwrap_err();
        assert!(matches!(err, KeyvalError::Setup(_)));
    }
}
