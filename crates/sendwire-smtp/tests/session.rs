//! End-to-end sessions against a scripted server.
//!
//! The rendered message carries a fresh Date, Message-ID and boundaries, so
//! replies are triggered by what the client has written so far instead of
//! by exact byte comparisons.

#![allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names,
    missing_docs
)]

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use sendwire_smtp::connection::TlsUpgrade;
use sendwire_smtp::{
    Attachment, AuthPolicy, Client, Config, Contact, Error, Message, SessionState,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// In-memory server: each step sends its reply once everything written
/// since the previous step ends with the step's trigger.
struct ScriptedStream {
    steps: VecDeque<(Vec<u8>, Vec<u8>)>,
    readable: VecDeque<u8>,
    sent: Arc<Mutex<Vec<u8>>>,
    matched: usize,
    reader: Option<Waker>,
    upgraded: Arc<AtomicBool>,
}

#[derive(Clone)]
struct Handles {
    sent: Arc<Mutex<Vec<u8>>>,
    upgraded: Arc<AtomicBool>,
}

impl Handles {
    fn sent(&self) -> String {
        String::from_utf8(self.sent.lock().unwrap().clone()).unwrap()
    }

    fn upgraded(&self) -> bool {
        self.upgraded.load(Ordering::SeqCst)
    }
}

impl ScriptedStream {
    fn new(greeting: &str, steps: &[(&str, &str)]) -> (Self, Handles) {
        let handles = Handles {
            sent: Arc::new(Mutex::new(Vec::new())),
            upgraded: Arc::new(AtomicBool::new(false)),
        };
        let stream = Self {
            steps: steps
                .iter()
                .map(|(trigger, reply)| (trigger.as_bytes().to_vec(), reply.as_bytes().to_vec()))
                .collect(),
            readable: greeting.bytes().collect(),
            sent: Arc::clone(&handles.sent),
            matched: 0,
            reader: None,
            upgraded: Arc::clone(&handles.upgraded),
        };
        (stream, handles)
    }

    fn advance(&mut self) {
        let sent = self.sent.lock().unwrap();
        while let Some((trigger, _)) = self.steps.front() {
            if !sent[self.matched..].ends_with(trigger) {
                break;
            }
            let (_, reply) = self.steps.pop_front().unwrap();
            self.readable.extend(reply);
            self.matched = sent.len();
        }
        if !self.readable.is_empty()
            && let Some(waker) = self.reader.take()
        {
            waker.wake();
        }
    }
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.readable.is_empty() {
            if this.steps.is_empty() {
                // Script finished: the server hangs up.
                return Poll::Ready(Ok(()));
            }
            this.reader = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let count = buf.remaining().min(this.readable.len());
        let chunk: Vec<u8> = this.readable.drain(..count).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ScriptedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.sent.lock().unwrap().extend_from_slice(buf);
        this.advance();
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl TlsUpgrade for ScriptedStream {
    async fn upgrade_to_tls(self, _hostname: &str) -> sendwire_smtp::Result<Self> {
        self.upgraded.store(true, Ordering::SeqCst);
        Ok(self)
    }
}

const GREETING: &str = "220 mx.example.com ESMTP\r\n";
const EHLO_PLAIN: (&str, &str) = (
    "EHLO client.example.com\r\n",
    "250-mx.example.com\r\n250 8BITMIME\r\n",
);
const EHLO_TLS: (&str, &str) = (
    "EHLO client.example.com\r\n",
    "250-mx.example.com\r\n250-STARTTLS\r\n250 AUTH PLAIN LOGIN\r\n",
);

fn transaction_steps(recipients: &[&str]) -> Vec<(String, String)> {
    let mut steps = vec![(
        "MAIL FROM:<alice@example.com>\r\n".to_string(),
        "250 OK\r\n".to_string(),
    )];
    for recipient in recipients {
        steps.push((format!("RCPT TO:<{recipient}>\r\n"), "250 OK\r\n".to_string()));
    }
    steps.push(("DATA\r\n".to_string(), "354 End data with <CR><LF>.<CR><LF>\r\n".to_string()));
    steps.push(("\r\n.\r\n".to_string(), "250 Queued\r\n".to_string()));
    steps
}

fn script(parts: Vec<Vec<(String, String)>>) -> Vec<(String, String)> {
    parts.into_iter().flatten().collect()
}

fn owned(step: (&str, &str)) -> Vec<(String, String)> {
    vec![(step.0.to_string(), step.1.to_string())]
}

fn quit() -> Vec<(String, String)> {
    owned(("QUIT\r\n", "221 Bye\r\n"))
}

fn scripted(steps: &[(String, String)]) -> (ScriptedStream, Handles) {
    let borrowed: Vec<(&str, &str)> = steps
        .iter()
        .map(|(trigger, reply)| (trigger.as_str(), reply.as_str()))
        .collect();
    ScriptedStream::new(GREETING, &borrowed)
}

fn client(auth: AuthPolicy) -> Client {
    Client::new(
        Config::builder("mx.example.com")
            .helo_name("client.example.com")
            .auth(auth)
            .build(),
    )
}

fn message() -> Message {
    Message::builder()
        .from(Contact::with_name("Alice", "alice@example.com"))
        .to("bob@example.com")
        .cc("carol@example.com")
        .bcc("secret@example.com")
        .subject("Status")
        .text("Line one\n.\n.hidden\nLast line")
        .build()
        .unwrap()
}

/// Returns the DATA payloads, one per message.
fn payloads(sent: &str) -> Vec<String> {
    sent.split("DATA\r\n")
        .skip(1)
        .map(|rest| rest.split("\r\n.\r\n").next().unwrap().to_string() + "\r\n")
        .collect()
}

#[tokio::test]
async fn delivers_message_without_auth() {
    let steps = script(vec![
        owned(EHLO_PLAIN),
        transaction_steps(&["bob@example.com", "carol@example.com", "secret@example.com"]),
        quit(),
    ]);
    let (stream, handles) = scripted(&steps);

    let mut client = client(AuthPolicy::None);
    client.send_over(stream, &[message()]).await.unwrap();

    assert_eq!(client.state(), SessionState::Disconnected);
    assert!(!handles.upgraded());

    let sent = handles.sent();
    assert!(sent.starts_with("EHLO client.example.com\r\nMAIL FROM:<alice@example.com>\r\n"));
    assert!(sent.contains("RCPT TO:<secret@example.com>\r\n"));
    assert!(sent.ends_with("\r\n.\r\nQUIT\r\n"));
    assert!(!sent.contains("STARTTLS"));
    assert!(!sent.contains("AUTH"));

    let payload = &payloads(&sent)[0];
    assert!(payload.starts_with("From: \"Alice\" <alice@example.com>\r\n"));
    assert!(payload.contains("\r\nTo: <bob@example.com>\r\n"));
    assert!(payload.contains("\r\nCc: <carol@example.com>\r\n"));
    assert!(payload.contains("\r\nSubject: Status\r\n"));
    assert!(payload.contains("@client.example.com>\r\n"));
    assert!(!payload.contains("secret@example.com"));
    assert!(!payload.contains("Bcc"));

    // Lines starting with a dot are doubled on the wire.
    assert!(payload.contains("\r\nLine one\r\n..\r\n..hidden\r\nLast line\r\n"));
}

#[tokio::test]
async fn delivers_multiple_messages_in_one_session() {
    let second = Message::builder()
        .from("alice@example.com")
        .to("dan@example.com")
        .subject("Second")
        .html("<p>Hi Dan</p>")
        .attach(Attachment::new("notes.txt", "text/plain", b"notes".to_vec()))
        .build()
        .unwrap();

    let steps = script(vec![
        owned(EHLO_PLAIN),
        transaction_steps(&["bob@example.com", "carol@example.com", "secret@example.com"]),
        transaction_steps(&["dan@example.com"]),
        quit(),
    ]);
    let (stream, handles) = scripted(&steps);

    let mut client = client(AuthPolicy::None);
    client.send_over(stream, &[message(), second]).await.unwrap();

    let sent = handles.sent();
    assert_eq!(sent.matches("MAIL FROM:").count(), 2);
    assert_eq!(sent.matches("EHLO").count(), 1);
    assert_eq!(sent.matches("QUIT\r\n").count(), 1);

    let payloads = payloads(&sent);
    assert_eq!(payloads.len(), 2);
    assert!(payloads[1].contains("Subject: Second\r\n"));
    assert!(payloads[1].contains("Content-Type: multipart/mixed; boundary="));
    assert!(payloads[1].contains("filename=\"notes.txt\""));
}

#[tokio::test]
async fn login_over_starttls() {
    let steps = script(vec![
        owned(EHLO_TLS),
        owned(("STARTTLS\r\n", "220 Go ahead\r\n")),
        owned(EHLO_TLS),
        owned(("AUTH LOGIN\r\n", "334 VXNlcm5hbWU6\r\n")),
        owned(("YWxpY2VAZXhhbXBsZS5jb20=\r\n", "334 UGFzc3dvcmQ6\r\n")),
        owned(("czNjcjN0\r\n", "235 Authenticated\r\n")),
        transaction_steps(&["bob@example.com", "carol@example.com", "secret@example.com"]),
        quit(),
    ]);
    let (stream, handles) = scripted(&steps);

    let mut client = client(AuthPolicy::login("alice@example.com", "s3cr3t"));
    client.send_over(stream, &[message()]).await.unwrap();

    assert!(handles.upgraded());
    assert!(client.capabilities().supports_starttls);

    let sent = handles.sent();
    let tls_at = sent.find("STARTTLS\r\n").unwrap();
    let auth_at = sent.find("AUTH LOGIN\r\n").unwrap();
    assert!(tls_at < auth_at);
    assert_eq!(sent.matches("EHLO client.example.com\r\n").count(), 2);
}

#[tokio::test]
async fn refuses_auth_without_starttls() {
    let steps = script(vec![owned(EHLO_PLAIN)]);
    let (stream, handles) = scripted(&steps);

    let mut client = client(AuthPolicy::plain("alice@example.com", "s3cr3t"));
    let err = client.send_over(stream, &[message()]).await.unwrap_err();

    assert!(matches!(err, Error::InvalidResponse { code: None, .. }));
    assert_eq!(client.state(), SessionState::Disconnected);

    let sent = handles.sent();
    assert!(!sent.contains("AUTH"));
    assert!(!sent.contains("s3cr3t"));
    assert!(!sent.contains("MAIL FROM"));
}

#[tokio::test]
async fn rejected_recipient_aborts_before_data() {
    let steps = script(vec![
        owned(EHLO_PLAIN),
        owned(("MAIL FROM:<alice@example.com>\r\n", "250 OK\r\n")),
        owned(("RCPT TO:<bob@example.com>\r\n", "550 5.1.1 Unknown user\r\n")),
        owned(("RCPT TO:<carol@example.com>\r\n", "250 OK\r\n")),
        owned(("RCPT TO:<secret@example.com>\r\n", "250 OK\r\n")),
    ]);
    let (stream, handles) = scripted(&steps);

    let mut client = client(AuthPolicy::None);
    let err = client.send_over(stream, &[message()]).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "Invalid response: Some RCPT TO commands were rejected by server"
    );
    let sent = handles.sent();
    assert_eq!(sent.matches("RCPT TO:").count(), 3);
    assert!(!sent.contains("DATA"));
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn client_is_reusable_after_failure() {
    let failing = script(vec![owned((
        "EHLO client.example.com\r\n",
        "421 Service not available\r\n",
    ))]);
    let (stream, _) = scripted(&failing);

    let mut client = client(AuthPolicy::None);
    let err = client.send_over(stream, &[message()]).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(client.state(), SessionState::Disconnected);

    let steps = script(vec![
        owned(EHLO_PLAIN),
        transaction_steps(&["bob@example.com", "carol@example.com", "secret@example.com"]),
        quit(),
    ]);
    let (stream, handles) = scripted(&steps);
    client.send_over(stream, &[message()]).await.unwrap();
    assert!(handles.sent().ends_with("QUIT\r\n"));
}
