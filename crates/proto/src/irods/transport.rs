//! Owned TCP or TLS socket with per-operation deadlines.
//!
//! The transport loops internally until a read or write completes in full;
//! callers never see short reads. Every call is bounded by the operation
//! timeout configured at construction.

use crate::irods::account::{CaSource, SslConfig};
use rods_platform::{RodsError, RodsResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// Blocking-style socket wrapper used by exactly one connection.
pub struct Transport {
    stream: Option<Stream>,
    timeout: Duration,
    peer: String,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer", &self.peer)
            .field("tls", &self.is_tls())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Transport {
    /// Dials `host:port` within `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> RodsResult<Self> {
        let peer = format!("{}:{}", host, port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(peer.as_str()))
            .await
            .map_err(|_| RodsError::Timeout(format!("connecting to {}", peer)))?
            .map_err(RodsError::from)?;
        stream.set_nodelay(true).map_err(RodsError::from)?;
        debug!(peer = %peer, "transport connected");
        Ok(Self {
            stream: Some(Stream::Plain(stream)),
            timeout,
            peer,
        })
    }

    /// Returns whether the socket has been upgraded to TLS.
    pub fn is_tls(&self) -> bool {
        matches!(self.stream, Some(Stream::Tls(_)))
    }

    /// Returns the peer address this transport dialed.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn gone() -> RodsError {
        RodsError::Transport(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "transport is closed",
        ))
    }

    /// Writes the whole buffer or fails.
    pub async fn write_all(&mut self, buf: &[u8]) -> RodsResult<()> {
        let stream = self.stream.as_mut().ok_or_else(Self::gone)?;
        let io = async {
            match stream {
                Stream::Plain(s) => s.write_all(buf).await,
                Stream::Tls(s) => s.write_all(buf).await,
            }
        };
        tokio::time::timeout(self.timeout, io)
            .await
            .map_err(|_| RodsError::Timeout(format!("writing {} bytes", buf.len())))?
            .map_err(RodsError::from)
    }

    /// Fills the whole buffer or fails. A clean peer close mid-buffer
    /// surfaces as an unexpected-EOF transport error.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> RodsResult<()> {
        let stream = self.stream.as_mut().ok_or_else(Self::gone)?;
        let io = async {
            match stream {
                Stream::Plain(s) => s.read_exact(buf).await,
                Stream::Tls(s) => s.read_exact(buf).await,
            }
        };
        tokio::time::timeout(self.timeout, io)
            .await
            .map_err(|_| RodsError::Timeout(format!("reading {} bytes", buf.len())))?
            .map(|_| ())
            .map_err(RodsError::from)
    }

    /// Wraps the socket in a TLS client session verified against
    /// `server_name`, loading the CA chain from the configured source.
    /// Subsequent reads and writes are encrypted.
    pub async fn upgrade_tls(&mut self, server_name: &str, config: &SslConfig) -> RodsResult<()> {
        let stream = match self.stream.take() {
            Some(Stream::Plain(stream)) => stream,
            Some(tls @ Stream::Tls(_)) => {
                self.stream = Some(tls);
                return Err(RodsError::Config(
                    "transport is already using TLS".to_string(),
                ));
            }
            None => return Err(Self::gone()),
        };

        let roots = load_root_store(&config.ca_source)?;
        let client_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(client_config));
        let server = ServerName::try_from(server_name.to_string())
            .map_err(|_| RodsError::Config(format!("invalid TLS server name '{}'", server_name)))?;

        let handshake = connector.connect(server, stream);
        let tls_stream = tokio::time::timeout(self.timeout, handshake)
            .await
            .map_err(|_| RodsError::Timeout("TLS handshake".to_string()))?
            .map_err(RodsError::from)?;
        debug!(peer = %self.peer, "transport upgraded to TLS");
        self.stream = Some(Stream::Tls(Box::new(tls_stream)));
        Ok(())
    }

    /// Closes the socket. Idempotent.
    pub async fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let result = match &mut stream {
                Stream::Plain(s) => s.shutdown().await,
                Stream::Tls(s) => s.shutdown().await,
            };
            if let Err(e) = result {
                debug!(peer = %self.peer, error = %e, "shutdown after fault");
            }
        }
    }
}

fn load_root_store(source: &CaSource) -> RodsResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    match source {
        CaSource::SystemRoots => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        CaSource::PemFile(path) => {
            let pem = std::fs::read(path).map_err(|e| {
                RodsError::Config(format!("cannot read CA bundle {}: {}", path.display(), e))
            })?;
            add_pem(&mut roots, &pem)?;
        }
        CaSource::PemBytes(pem) => add_pem(&mut roots, pem)?,
    }
    if roots.is_empty() {
        return Err(RodsError::Config(
            "CA source yielded no usable certificates".to_string(),
        ));
    }
    Ok(roots)
}

fn add_pem(roots: &mut RootCertStore, pem: &[u8]) -> RodsResult<()> {
    let mut reader = std::io::BufReader::new(pem);
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert =
            cert.map_err(|e| RodsError::Config(format!("invalid certificate in CA bundle: {}", e)))?;
        roots
            .add(cert)
            .map_err(|e| RodsError::Config(format!("rejected CA certificate: {}", e)))?;
    }
    Ok(())
}
