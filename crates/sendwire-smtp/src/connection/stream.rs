//! Byte streams the transport can run over.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::{Error, Result};

/// A byte stream that can be switched to TLS in place (STARTTLS).
pub trait TlsUpgrade: AsyncRead + AsyncWrite + Unpin + Send + Sized + 'static {
    /// Performs a TLS client handshake over this stream, verifying the
    /// certificate against `hostname`.
    ///
    /// # Errors
    ///
    /// Returns an error if the hostname is invalid or the handshake fails.
    fn upgrade_to_tls(self, hostname: &str) -> impl Future<Output = Result<Self>> + Send;
}

/// SMTP stream (TCP or TLS).
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(TcpStream),
    /// TLS-encrypted connection (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl SmtpStream {
    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl std::fmt::Debug for SmtpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(stream) => f.debug_tuple("Tcp").field(stream).finish(),
            Self::Tls(_) => f.write_str("Tls"),
        }
    }
}

impl TlsUpgrade for SmtpStream {
    async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        match self {
            Self::Tcp(tcp) => {
                let tls = handshake(tcp, hostname).await?;
                tracing::info!(hostname, "TLS established");
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::invalid_response("Stream is already TLS")),
        }
    }
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Connects to an SMTP server over plain TCP.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    let addr = format!("{hostname}:{port}");
    let stream = TcpStream::connect(&addr).await?;
    tracing::debug!(%addr, "TCP connected");
    Ok(SmtpStream::Tcp(stream))
}

/// Connects to an SMTP server over TLS (implicit TLS on port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails.
pub async fn connect_tls(hostname: &str, port: u16) -> Result<SmtpStream> {
    let addr = format!("{hostname}:{port}");
    let tcp = TcpStream::connect(&addr).await?;
    let tls = handshake(tcp, hostname).await?;
    tracing::info!(%addr, "TLS established");
    Ok(SmtpStream::Tls(Box::new(tls)))
}

async fn handshake(tcp: TcpStream, hostname: &str) -> Result<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::InvalidHostname(hostname.to_string()))?;
    create_tls_connector()
        .connect(server_name, tcp)
        .await
        .map_err(handshake_error)
}

// tokio-rustls reports protocol failures as `io::Error` wrapping the
// rustls error.
fn handshake_error(err: io::Error) -> Error {
    let tls = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .cloned();
    tls.map_or(Error::Io(err), Error::Tls)
}

/// Creates a TLS connector with the webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

// Scripted mocks stand in for a socket; the "upgrade" keeps the same script.
#[cfg(test)]
impl TlsUpgrade for tokio_test::io::Mock {
    async fn upgrade_to_tls(self, _hostname: &str) -> Result<Self> {
        Ok(self)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_plain() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect("127.0.0.1", port).await.unwrap();
        assert!(!stream.is_tls());
        assert!(format!("{stream:?}").starts_with("Tcp"));
    }

    #[tokio::test]
    async fn test_upgrade_rejects_invalid_hostname() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect("127.0.0.1", port).await.unwrap();
        let err = stream.upgrade_to_tls("not a hostname!").await.unwrap_err();
        assert!(matches!(err, Error::InvalidHostname(name) if name == "not a hostname!"));
    }

    #[test]
    fn test_handshake_error_mapping() {
        let wrapped = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::General("bad record".into()),
        );
        assert!(matches!(handshake_error(wrapped), Error::Tls(rustls::Error::General(_))));

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(matches!(handshake_error(reset), Error::Io(_)));
    }

    #[tokio::test]
    async fn test_plaintext_peer_fails_as_tls_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"220 not tls\r\n").await.unwrap();
            let mut sink = Vec::new();
            let _ = socket.read_to_end(&mut sink).await;
        });

        let stream = connect("127.0.0.1", port).await.unwrap();
        let err = stream.upgrade_to_tls("localhost").await.unwrap_err();
        assert!(matches!(err, Error::Tls(_)), "{err:?}");
        server.abort();
    }
}
