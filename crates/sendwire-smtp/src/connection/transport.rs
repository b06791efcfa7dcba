//! Line transport.
//!
//! A worker task owns the stream and splits incoming bytes into lines. The
//! [`Transport`] handle talks to it over a channel, so reads, writes and the
//! STARTTLS upgrade are all serialized through one owner:
//!
//! ```text
//! Transport ──Request──▶ Worker ──▶ stream
//!     ▲                    │
//!     └──── oneshot ◀──────┘  (lines are handed to the oldest waiter,
//!                              or buffered until someone asks)
//! ```

use std::collections::VecDeque;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use bytes::BytesMut;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Framed};

use super::stream::{self, TlsUpgrade};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_continuation, is_final_line, parse_code};
use crate::types::{Reply, ReplyCode};

/// Maximum accepted reply line length.
const MAX_LINE_LENGTH: usize = 64 * 1024;

enum Request {
    Write {
        data: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    ReadLine {
        reply: oneshot::Sender<Result<String>>,
    },
    StartTls {
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a line-oriented SMTP connection.
#[derive(Debug)]
pub struct Transport {
    host: String,
    port: u16,
    requests: Option<mpsc::UnboundedSender<Request>>,
    worker: Option<JoinHandle<()>>,
}

impl Transport {
    /// Creates an unconnected transport for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            requests: None,
            worker: None,
        }
    }

    /// Returns the host used for connecting and certificate checks.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns true while a connection is installed.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.requests.is_some()
    }

    /// Opens a TCP connection and reads the greeting line.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or no greeting arrives.
    pub async fn connect(&mut self) -> Result<String> {
        let stream = stream::connect(&self.host, self.port).await?;
        self.connect_with(stream).await
    }

    /// Installs an already open stream and reads the greeting line.
    ///
    /// Any previous connection is closed first.
    ///
    /// # Errors
    ///
    /// Returns an error if no greeting line arrives.
    pub async fn connect_with<S: TlsUpgrade>(&mut self, stream: S) -> Result<String> {
        self.close().await;

        let (requests, receiver) = mpsc::unbounded_channel();
        let worker = Worker::new(self.host.clone(), stream, receiver);
        self.worker = Some(tokio::spawn(worker.run()));
        self.requests = Some(requests);

        let greeting = self.read_line().await?;
        tracing::info!(host = %self.host, port = self.port, %greeting, "connected");
        Ok(greeting)
    }

    /// Upgrades the connection to TLS in place.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChannel` without a connection, `InvalidResponse` if
    /// unread data is already buffered, or the handshake error.
    pub async fn start_tls(&self) -> Result<()> {
        self.request(|reply| Request::StartTls { reply }).await
    }

    /// Writes `line` followed by CRLF.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChannel` without a connection, or the write error.
    pub async fn send_line(&self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        self.request(|reply| Request::Write { data, reply }).await
    }

    /// Writes `data` unchanged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChannel` without a connection, or the write error.
    pub async fn send_raw(&self, data: &[u8]) -> Result<()> {
        let data = data.to_vec();
        self.request(|reply| Request::Write { data, reply }).await
    }

    /// Returns the next line, waiting for it if none is buffered.
    ///
    /// Concurrent callers are served in the order they asked.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` once the stream has ended and every
    /// buffered line was consumed.
    pub async fn read_line(&self) -> Result<String> {
        self.request(|reply| Request::ReadLine { reply }).await
    }

    /// Reads one complete, possibly multi-line, reply.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` if the first line has no status code.
    pub async fn read_response(&self) -> Result<Reply> {
        let first = self.read_line().await?;
        self.finish_response(first).await
    }

    /// Completes a reply whose first line was already read.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` if `first` has no status code.
    pub async fn finish_response(&self, first: String) -> Result<Reply> {
        let code = parse_code(&first)?;
        let mut more = is_continuation(&first);
        let mut lines = vec![first];

        while more {
            let line = self.read_line().await?;
            more = !is_final_line(&line, code);
            lines.push(line);
        }

        tracing::debug!(code = code.as_u16(), lines = lines.len(), "reply received");
        Ok(Reply::new(code, lines))
    }

    /// Sends `command` and reads its reply, which must carry one of
    /// `expected`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` with the reply code and lines when the code
    /// is not expected.
    pub async fn send_command(&self, command: &Command, expected: &[ReplyCode]) -> Result<Reply> {
        tracing::debug!(command = %command.redacted(), "sending command");
        self.send_line(&command.line()).await?;

        let reply = self.read_response().await?;
        if reply.is(expected) {
            Ok(reply)
        } else {
            Err(Error::unexpected_reply(&reply))
        }
    }

    /// Shuts the connection down and stops the worker.
    ///
    /// Pending reads fail with `ConnectionClosed`. Shutdown errors are
    /// logged, not returned. Does nothing when not connected.
    pub async fn close(&mut self) {
        let Some(requests) = self.requests.take() else {
            return;
        };

        let (reply, done) = oneshot::channel();
        if requests.send(Request::Close { reply }).is_ok() {
            let _ = done.await;
        }

        if let Some(worker) = self.worker.take()
            && let Err(err) = worker.await
        {
            tracing::warn!(error = %err, "transport worker ended abnormally");
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Request,
    ) -> Result<T> {
        let requests = self.requests.as_ref().ok_or(Error::InvalidChannel)?;
        let (reply, response) = oneshot::channel();
        requests
            .send(make(reply))
            .map_err(|_| Error::ConnectionClosed)?;
        response.await.map_err(|_| Error::ConnectionClosed)?
    }
}

struct Worker<S> {
    host: String,
    framed: Option<Framed<S, ReplyLineCodec>>,
    lines: VecDeque<String>,
    waiters: VecDeque<oneshot::Sender<Result<String>>>,
    read_closed: bool,
    read_error: Option<Error>,
    requests: mpsc::UnboundedReceiver<Request>,
}

impl<S: TlsUpgrade> Worker<S> {
    fn new(host: String, stream: S, requests: mpsc::UnboundedReceiver<Request>) -> Self {
        Self {
            host,
            framed: Some(frame_lines(stream)),
            lines: VecDeque::new(),
            waiters: VecDeque::new(),
            read_closed: false,
            read_error: None,
            requests,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request::Close { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(request) => self.handle(request).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                line = next_line(&mut self.framed), if !self.read_closed => self.receive(line),
            }
        }
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Write { data, reply } => {
                let _ = reply.send(self.write(&data).await);
            }
            Request::ReadLine { reply } => self.read_line(reply),
            Request::StartTls { reply } => {
                let _ = reply.send(self.start_tls().await);
            }
            // Handled by the run loop
            Request::Close { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let framed = self.framed.as_mut().ok_or(Error::InvalidChannel)?;
        let stream = framed.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    fn read_line(&mut self, reply: oneshot::Sender<Result<String>>) {
        if let Some(line) = self.lines.pop_front() {
            let _ = reply.send(Ok(line));
        } else if let Some(err) = self.read_error.take() {
            let _ = reply.send(Err(err));
        } else if self.read_closed || self.framed.is_none() {
            let _ = reply.send(Err(Error::ConnectionClosed));
        } else {
            self.waiters.push_back(reply);
        }
    }

    async fn start_tls(&mut self) -> Result<()> {
        let framed = self.framed.take().ok_or(Error::InvalidChannel)?;

        // Anything already read arrived in plaintext and must not be
        // mistaken for data sent over the encrypted channel.
        if !self.lines.is_empty() || !framed.read_buffer().is_empty() {
            self.framed = Some(framed);
            return Err(Error::invalid_response(
                "Unexpected data received before TLS handshake",
            ));
        }

        match framed.into_parts().io.upgrade_to_tls(&self.host).await {
            Ok(stream) => {
                self.framed = Some(frame_lines(stream));
                Ok(())
            }
            Err(err) => {
                self.read_closed = true;
                self.fail_waiters();
                Err(err)
            }
        }
    }

    fn receive(&mut self, line: Option<std::result::Result<String, AnyDelimiterCodecError>>) {
        match line {
            Some(Ok(line)) => {
                tracing::trace!(%line, "line received");
                self.deliver(line);
            }
            Some(Err(err)) => {
                let err = match err {
                    AnyDelimiterCodecError::MaxChunkLengthExceeded => Error::LineTooLong,
                    AnyDelimiterCodecError::Io(err) => Error::Io(err),
                };
                match self.waiters.pop_front() {
                    Some(waiter) => {
                        let _ = waiter.send(Err(err));
                    }
                    None => self.read_error = Some(err),
                }
                self.read_closed = true;
                self.fail_waiters();
            }
            None => {
                tracing::debug!("connection closed by peer");
                self.read_closed = true;
                self.fail_waiters();
            }
        }
    }

    fn deliver(&mut self, mut line: String) {
        while let Some(waiter) = self.waiters.pop_front() {
            // A waiter whose caller went away hands the line back.
            let Err(Ok(unclaimed)) = waiter.send(Ok(line)) else {
                return;
            };
            line = unclaimed;
        }
        self.lines.push_back(line);
    }

    fn fail_waiters(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(Error::ConnectionClosed));
        }
    }

    async fn shutdown(&mut self) {
        if let Some(mut framed) = self.framed.take()
            && let Err(err) = framed.get_mut().shutdown().await
        {
            tracing::warn!(error = %err, "error while closing connection");
        }
        self.read_closed = true;
        self.fail_waiters();
    }
}

fn frame_lines<S: TlsUpgrade>(stream: S) -> Framed<S, ReplyLineCodec> {
    Framed::new(stream, ReplyLineCodec::new())
}

/// Splits on LF and drops a trailing CR. Bytes that are not UTF-8 become
/// U+FFFD instead of failing the read.
#[derive(Debug)]
struct ReplyLineCodec {
    inner: AnyDelimiterCodec,
}

impl ReplyLineCodec {
    fn new() -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                Vec::new(),
                MAX_LINE_LENGTH,
            ),
        }
    }
}

impl Decoder for ReplyLineCodec {
    type Item = String;
    type Error = AnyDelimiterCodecError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> std::result::Result<Option<String>, Self::Error> {
        Ok(self.inner.decode(src)?.map(|chunk| to_line(&chunk)))
    }

    fn decode_eof(
        &mut self,
        src: &mut BytesMut,
    ) -> std::result::Result<Option<String>, Self::Error> {
        Ok(self.inner.decode_eof(src)?.map(|chunk| to_line(&chunk)))
    }
}

fn to_line(chunk: &[u8]) -> String {
    let chunk = chunk.strip_suffix(b"\r").unwrap_or(chunk);
    String::from_utf8_lossy(chunk).into_owned()
}

// Cancel-safe: a line is only taken out of the buffer when it is returned.
async fn next_line<S: TlsUpgrade>(
    framed: &mut Option<Framed<S, ReplyLineCodec>>,
) -> Option<std::result::Result<String, AnyDelimiterCodecError>> {
    match framed {
        Some(framed) => framed.next().await,
        None => std::future::pending().await,
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
    use std::time::Duration;
    use tokio_test::io::Builder;

    async fn connected(mock: tokio_test::io::Mock) -> Transport {
        let mut transport = Transport::new("smtp.example.com", 587);
        let greeting = transport.connect_with(mock).await.unwrap();
        assert_eq!(greeting, "220 smtp.example.com ESMTP");
        transport
    }

    #[tokio::test]
    async fn test_lines_in_order() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\n250 one\r\n250 two\r\n")
            .build();
        let mut transport = connected(mock).await;

        assert!(transport.is_connected());
        assert_eq!(transport.read_line().await.unwrap(), "250 one");
        assert_eq!(transport.read_line().await.unwrap(), "250 two");
        transport.close().await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_waiters_served_in_arrival_order() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\n")
            .wait(Duration::from_millis(20))
            .read(b"250 one\r\n")
            .read(b"250 two\r\n")
            .build();
        let mut transport = connected(mock).await;

        let (first, second) = tokio::join!(transport.read_line(), transport.read_line());
        assert_eq!(first.unwrap(), "250 one");
        assert_eq!(second.unwrap(), "250 two");
        transport.close().await;
    }

    #[tokio::test]
    async fn test_multi_line_response() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\n")
            .read(b"250-First\r\n250-Second\r\n")
            .read(b"250 Third\r\n")
            .build();
        let mut transport = connected(mock).await;

        let reply = transport.read_response().await.unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.lines, vec!["250-First", "250-Second", "250 Third"]);
        transport.close().await;
    }

    #[tokio::test]
    async fn test_bare_code_ends_response() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\n250-First\r\n250\r\n")
            .build();
        let mut transport = connected(mock).await;

        let reply = transport.read_response().await.unwrap();
        assert_eq!(reply.lines.len(), 2);
        transport.close().await;
    }

    #[tokio::test]
    async fn test_invalid_code() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\nhello there\r\n")
            .build();
        let mut transport = connected(mock).await;

        let err = transport.read_response().await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse { code: None, .. }));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_send_command() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\n")
            .write(b"EHLO client.example.com\r\n")
            .read(b"250-smtp.example.com\r\n250 STARTTLS\r\n")
            .build();
        let mut transport = connected(mock).await;

        let command = Command::Ehlo {
            hostname: "client.example.com".into(),
        };
        let reply = transport
            .send_command(&command, &[ReplyCode::OK])
            .await
            .unwrap();
        assert_eq!(reply.lines.len(), 2);
        transport.close().await;
    }

    #[tokio::test]
    async fn test_send_command_unexpected_code() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\n")
            .write(b"RCPT TO:<nobody@example.com>\r\n")
            .read(b"550 No such user\r\n")
            .build();
        let mut transport = connected(mock).await;

        let command = Command::RcptTo {
            to: "nobody@example.com".into(),
        };
        let err = transport
            .send_command(&command, &[ReplyCode::OK, ReplyCode::FORWARD])
            .await
            .unwrap_err();
        match err {
            Error::InvalidResponse { code, message } => {
                assert_eq!(code, Some(550));
                assert_eq!(message, "550 No such user");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        transport.close().await;
    }

    #[tokio::test]
    async fn test_send_raw() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\n")
            .write(b"Subject: x\r\n\r\nbody\r\n")
            .build();
        let mut transport = connected(mock).await;

        transport
            .send_raw(b"Subject: x\r\n\r\nbody\r\n")
            .await
            .unwrap();
        transport.close().await;
    }

    #[tokio::test]
    async fn test_not_connected() {
        let mut transport = Transport::new("smtp.example.com", 25);

        assert!(matches!(
            transport.send_line("NOOP").await,
            Err(Error::InvalidChannel)
        ));
        assert!(matches!(
            transport.send_raw(b"x").await,
            Err(Error::InvalidChannel)
        ));
        assert!(matches!(
            transport.read_line().await,
            Err(Error::InvalidChannel)
        ));
        assert!(matches!(
            transport.start_tls().await,
            Err(Error::InvalidChannel)
        ));

        transport.close().await;
        transport.close().await;
        assert_eq!(transport.host(), "smtp.example.com");
        assert_eq!(transport.port(), 25);
    }

    #[tokio::test]
    async fn test_peer_close_fails_waiters() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\n250 last\r\n")
            .build();
        let mut transport = connected(mock).await;

        let (first, second) = tokio::join!(transport.read_line(), transport.read_line());
        assert_eq!(first.unwrap(), "250 last");
        assert!(matches!(second, Err(Error::ConnectionClosed)));
        assert!(matches!(
            transport.read_line().await,
            Err(Error::ConnectionClosed)
        ));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_closed_after_close() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\n")
            .build();
        let mut transport = connected(mock).await;

        transport.close().await;
        assert!(matches!(
            transport.read_line().await,
            Err(Error::InvalidChannel)
        ));
    }

    #[tokio::test]
    async fn test_start_tls() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\n")
            .write(b"STARTTLS\r\n")
            .read(b"220 Go ahead\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250 smtp.example.com\r\n")
            .build();
        let mut transport = connected(mock).await;

        transport
            .send_command(&Command::StartTls, &[ReplyCode::SERVICE_READY])
            .await
            .unwrap();
        transport.start_tls().await.unwrap();

        let ehlo = Command::Ehlo {
            hostname: "localhost".into(),
        };
        transport.send_command(&ehlo, &[ReplyCode::OK]).await.unwrap();
        transport.close().await;
    }

    #[tokio::test]
    async fn test_start_tls_rejects_buffered_data() {
        let mock = Builder::new()
            .read(b"220 smtp.example.com ESMTP\r\n")
            .write(b"STARTTLS\r\n")
            .read(b"220 Go ahead\r\n250 injected\r\n")
            .build();
        let mut transport = connected(mock).await;

        transport
            .send_command(&Command::StartTls, &[ReplyCode::SERVICE_READY])
            .await
            .unwrap();
        let err = transport.start_tls().await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse { code: None, .. }));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let long = vec![b'a'; MAX_LINE_LENGTH + 1];
        let mock = Builder::new().read(&long).build();

        let mut transport = Transport::new("smtp.example.com", 25);
        let err = transport.connect_with(mock).await.unwrap_err();
        assert!(matches!(err, Error::LineTooLong));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_non_utf8_reply_text() {
        let mock = Builder::new()
            .read(b"220 caf\xe9 ESMTP\r\n")
            .read(b"250-caf\xe9\r\n250 OK\r\n")
            .build();

        let mut transport = Transport::new("smtp.example.com", 25);
        let first = transport.connect_with(mock).await.unwrap();
        let greeting = transport.finish_response(first).await.unwrap();
        assert_eq!(greeting.code, ReplyCode::SERVICE_READY);
        assert_eq!(greeting.lines, vec!["220 caf\u{FFFD} ESMTP"]);

        let reply = transport.read_response().await.unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.lines, vec!["250-caf\u{FFFD}", "250 OK"]);
        transport.close().await;
    }

    #[test]
    fn test_reply_line_codec() {
        let mut codec = ReplyLineCodec::new();
        let mut buf = BytesMut::from(&b"250 one\r\n250 two\n250 th"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("250 one"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("250 two"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().as_deref(), Some("250 th"));
    }
}
