//! SMTP session state machine.

use super::config::{AuthPolicy, Config, Credentials};
use super::stream::{self, TlsUpgrade};
use super::transport::Transport;
use crate::command::{Command, dot_stuff};
use crate::error::{Error, Result};
use crate::types::{AuthMechanism, Capabilities, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use sendwire_mime::{Message, sanitize};

/// Where a session currently stands.
///
/// States only move forward during a session; any failure ends it in
/// `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Connected and greeted by the server.
    Connected,
    /// EHLO accepted.
    Greeted,
    /// STARTTLS completed.
    TlsEstablished,
    /// Ready to send mail.
    Authenticated,
    /// Inside MAIL FROM … end of DATA.
    MailTransaction,
}

/// Sends messages through one SMTP relay.
///
/// Each call to [`Client::send`] runs a full session: connect, EHLO,
/// STARTTLS and AUTH as the [`AuthPolicy`] demands, one transaction per
/// message, then QUIT.
#[derive(Debug)]
pub struct Client {
    config: Config,
    transport: Transport,
    state: SessionState,
    capabilities: Capabilities,
}

impl Client {
    /// Creates a client; nothing is sent until [`Client::send`].
    #[must_use]
    pub fn new(config: Config) -> Self {
        let transport = Transport::new(config.host.clone(), config.port);
        Self {
            config,
            transport,
            state: SessionState::Disconnected,
            capabilities: Capabilities::default(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the capabilities from the most recent EHLO.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Connects over TCP and delivers `messages` in one session.
    ///
    /// # Errors
    ///
    /// Fails on the first error. The connection is closed either way.
    pub async fn send(&mut self, messages: &[Message]) -> Result<()> {
        let stream = stream::connect(&self.config.host, self.config.port).await?;
        self.send_over(stream, messages).await
    }

    /// Delivers a single message.
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub async fn send_one(&mut self, message: &Message) -> Result<()> {
        self.send(std::slice::from_ref(message)).await
    }

    /// Runs a session over an already open stream.
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub async fn send_over<S: TlsUpgrade>(
        &mut self,
        stream: S,
        messages: &[Message],
    ) -> Result<()> {
        let result = self.session(stream, messages).await;
        if let Err(err) = &result {
            tracing::warn!(?err, state = ?self.state, "session failed");
            self.transport.close().await;
            self.set_state(SessionState::Disconnected);
        }
        result
    }

    async fn session<S: TlsUpgrade>(&mut self, stream: S, messages: &[Message]) -> Result<()> {
        self.connect(stream).await?;
        self.greet().await?;
        if self.config.auth.requires_tls() {
            self.negotiate_tls().await?;
        }
        self.authenticate().await?;

        for message in messages {
            self.transmit(message).await?;
        }

        self.quit().await
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::info!(from = ?self.state, to = ?state, "state");
            self.state = state;
        }
    }

    async fn connect<S: TlsUpgrade>(&mut self, stream: S) -> Result<()> {
        self.capabilities = Capabilities::default();

        let first = self.transport.connect_with(stream).await?;
        let greeting = self.transport.finish_response(first).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::unexpected_reply(&greeting));
        }

        self.set_state(SessionState::Connected);
        Ok(())
    }

    async fn ehlo(&mut self) -> Result<()> {
        let command = Command::Ehlo {
            hostname: sanitize(&self.config.helo_name),
        };
        let reply = self.transport.send_command(&command, &[ReplyCode::OK]).await?;

        self.capabilities = Capabilities::from_reply(&reply);
        tracing::debug!(
            starttls = self.capabilities.supports_starttls,
            auth = ?self.capabilities.auth_mechanisms,
            "capabilities"
        );
        Ok(())
    }

    async fn greet(&mut self) -> Result<()> {
        self.ehlo().await?;
        self.set_state(SessionState::Greeted);
        Ok(())
    }

    async fn negotiate_tls(&mut self) -> Result<()> {
        if !self.capabilities.supports_starttls {
            return Err(Error::invalid_response("Server does not support STARTTLS"));
        }

        self.transport
            .send_command(&Command::StartTls, &[ReplyCode::SERVICE_READY])
            .await?;
        self.transport.start_tls().await?;
        self.set_state(SessionState::TlsEstablished);

        // Capabilities may differ once encrypted.
        self.ehlo().await
    }

    async fn authenticate(&mut self) -> Result<()> {
        match &self.config.auth {
            AuthPolicy::None => {}
            AuthPolicy::Login(credentials) => {
                if !self.capabilities.supports(AuthMechanism::Login) {
                    return Err(Error::invalid_response("AUTH LOGIN not supported"));
                }
                self.auth_login(credentials).await?;
            }
            AuthPolicy::Plain(credentials) => {
                if !self.capabilities.supports(AuthMechanism::Plain) {
                    return Err(Error::invalid_response("AUTH PLAIN not supported"));
                }
                self.auth_plain(credentials).await?;
            }
            AuthPolicy::XOAuth2 { .. } => {
                return Err(Error::invalid_response("XOAUTH2 not implemented"));
            }
        }

        self.set_state(SessionState::Authenticated);
        Ok(())
    }

    async fn auth_login(&self, credentials: &Credentials) -> Result<()> {
        let start = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        self.auth_step(&start, ReplyCode::AUTH_CONTINUE).await?;

        let username = Command::AuthResponse(STANDARD.encode(credentials.username()));
        self.auth_step(&username, ReplyCode::AUTH_CONTINUE).await?;

        let password = Command::AuthResponse(STANDARD.encode(credentials.password()));
        self.auth_step(&password, ReplyCode::AUTH_SUCCESS).await
    }

    async fn auth_plain(&self, credentials: &Credentials) -> Result<()> {
        let token = format!("\0{}\0{}", credentials.username(), credentials.password());
        let command = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(STANDARD.encode(token)),
        };
        self.auth_step(&command, ReplyCode::AUTH_SUCCESS).await
    }

    async fn auth_step(&self, command: &Command, expected: ReplyCode) -> Result<()> {
        match self.transport.send_command(command, &[expected]).await {
            Ok(_) => Ok(()),
            Err(Error::InvalidResponse { code, .. }) => {
                tracing::warn!(?code, command = %command.redacted(), "authentication rejected");
                Err(Error::AuthenticationFailed)
            }
            Err(err) => Err(err),
        }
    }

    async fn transmit(&mut self, message: &Message) -> Result<()> {
        if self.state != SessionState::Authenticated {
            return Err(Error::invalid_response(
                "Cannot send mail before authentication",
            ));
        }

        let from = Command::MailFrom {
            from: message.sender().envelope_address(),
        };
        self.transport.send_command(&from, &[ReplyCode::OK]).await?;
        self.set_state(SessionState::MailTransaction);

        let mut rejected = 0_usize;
        for recipient in message.recipients() {
            let to = recipient.envelope_address();
            let command = Command::RcptTo { to: to.clone() };
            match self
                .transport
                .send_command(&command, &[ReplyCode::OK, ReplyCode::FORWARD])
                .await
            {
                Ok(_) => {}
                Err(err @ Error::InvalidResponse { .. }) => {
                    tracing::warn!(recipient = %to, ?err, "recipient rejected");
                    rejected += 1;
                }
                Err(err) => return Err(err),
            }
        }
        if rejected > 0 {
            return Err(Error::invalid_response(
                "Some RCPT TO commands were rejected by server",
            ));
        }

        self.transport
            .send_command(&Command::Data, &[ReplyCode::START_DATA])
            .await?;

        let payload = message.render(Utc::now(), &self.config.helo_name);
        self.transport.send_raw(&dot_stuff(&payload)).await?;
        self.transport
            .send_command(&Command::DataEnd, &[ReplyCode::OK])
            .await?;

        tracing::info!(
            recipients = message.recipients().count(),
            bytes = payload.len(),
            "message accepted"
        );
        self.set_state(SessionState::Authenticated);
        Ok(())
    }

    async fn quit(&mut self) -> Result<()> {
        let result = self
            .transport
            .send_command(&Command::Quit, &[ReplyCode::CLOSING])
            .await;
        self.transport.close().await;
        self.set_state(SessionState::Disconnected);
        result.map(|_| ())
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
    use tokio_test::io::Builder;

    const GREETING: &[u8] = b"220 smtp.example.com ESMTP ready\r\n";
    const EHLO: &[u8] = b"EHLO localhost\r\n";
    const EHLO_REPLY: &[u8] = b"250-smtp.example.com\r\n250-AUTH LOGIN PLAIN\r\n250 STARTTLS\r\n";

    fn client(auth: AuthPolicy) -> Client {
        Client::new(Config::builder("smtp.example.com").auth(auth).build())
    }

    /// Greeting, EHLO, STARTTLS and the post-TLS EHLO.
    fn tls_handshake(ehlo_after_tls: &[u8]) -> Builder {
        let mut builder = Builder::new();
        builder
            .read(GREETING)
            .write(EHLO)
            .read(EHLO_REPLY)
            .write(b"STARTTLS\r\n")
            .read(b"220 Ready to start TLS\r\n")
            .write(EHLO)
            .read(ehlo_after_tls);
        builder
    }

    fn message() -> Message {
        Message::builder()
            .from("alice@example.com")
            .to("bob@example.com")
            .cc("carol@example.com")
            .bcc("dave@example.com")
            .subject("Hi")
            .text("Hello")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_without_auth() {
        let mock = Builder::new()
            .read(GREETING)
            .write(EHLO)
            .read(EHLO_REPLY)
            .write(b"QUIT\r\n")
            .read(b"221 Bye\r\n")
            .build();

        let mut client = client(AuthPolicy::None);
        client.send_over(mock, &[]).await.unwrap();

        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(client.capabilities().supports_starttls);
        assert!(client.capabilities().supports(AuthMechanism::Plain));
    }

    #[tokio::test]
    async fn test_greeting_rejected() {
        let mock = Builder::new()
            .read(b"554 No SMTP service here\r\n")
            .build();

        let mut client = client(AuthPolicy::None);
        let err = client.send_over(mock, &[]).await.unwrap_err();

        assert!(matches!(err, Error::InvalidResponse { code: Some(554), .. }));
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_multi_line_greeting() {
        let mock = Builder::new()
            .read(b"220-smtp.example.com ESMTP\r\n220 Welcome\r\n")
            .write(EHLO)
            .read(b"250 smtp.example.com\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 Bye\r\n")
            .build();

        let mut client = client(AuthPolicy::None);
        client.send_over(mock, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_starttls_required_but_missing() {
        let mock = Builder::new()
            .read(GREETING)
            .write(EHLO)
            .read(b"250-smtp.example.com\r\n250 AUTH LOGIN\r\n")
            .build();

        let mut client = client(AuthPolicy::login("user", "pass"));
        let err = client.send_over(mock, &[]).await.unwrap_err();

        match err {
            Error::InvalidResponse { code, message } => {
                assert_eq!(code, None);
                assert_eq!(message, "Server does not support STARTTLS");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_login_not_advertised_sends_no_auth() {
        let mock = tls_handshake(b"250-smtp.example.com\r\n250 AUTH PLAIN\r\n").build();

        let mut client = client(AuthPolicy::login("user", "pass"));
        let err = client.send_over(mock, &[]).await.unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidResponse { ref message, .. } if message == "AUTH LOGIN not supported"
        ));
    }

    #[tokio::test]
    async fn test_plain_not_advertised() {
        let mock = tls_handshake(b"250 AUTH LOGIN\r\n").build();

        let mut client = client(AuthPolicy::plain("user", "pass"));
        let err = client.send_over(mock, &[]).await.unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidResponse { ref message, .. } if message == "AUTH PLAIN not supported"
        ));
    }

    #[tokio::test]
    async fn test_auth_login() {
        let mock = tls_handshake(EHLO_REPLY)
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"cGFzcw==\r\n")
            .read(b"235 Authentication successful\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 Bye\r\n")
            .build();

        let mut client = client(AuthPolicy::login("user", "pass"));
        client.send_over(mock, &[]).await.unwrap();
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_auth_login_bad_password() {
        let mock = tls_handshake(EHLO_REPLY)
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"cGFzcw==\r\n")
            .read(b"535 Authentication credentials invalid\r\n")
            .build();

        let mut client = client(AuthPolicy::login("user", "pass"));
        let err = client.send_over(mock, &[]).await.unwrap_err();

        assert!(matches!(err, Error::AuthenticationFailed));
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_auth_plain() {
        let mock = tls_handshake(EHLO_REPLY)
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"235 OK\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 Bye\r\n")
            .build();

        let mut client = client(AuthPolicy::plain("user", "pass"));
        client.send_over(mock, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_plain_rejected() {
        let mock = tls_handshake(EHLO_REPLY)
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"535 No\r\n")
            .build();

        let mut client = client(AuthPolicy::plain("user", "pass"));
        let err = client.send_over(mock, &[]).await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed));
    }

    #[tokio::test]
    async fn test_xoauth2_unsupported() {
        let mock = tls_handshake(b"250 AUTH XOAUTH2\r\n").build();

        let mut client = client(AuthPolicy::XOAuth2 {
            token: "token".into(),
        });
        let err = client.send_over(mock, &[]).await.unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidResponse { ref message, .. } if message == "XOAUTH2 not implemented"
        ));
        assert!(client.capabilities().supports(AuthMechanism::XOAuth2));
    }

    #[tokio::test]
    async fn test_rejected_recipients_are_collected() {
        let mock = Builder::new()
            .read(GREETING)
            .write(EHLO)
            .read(EHLO_REPLY)
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<bob@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<carol@example.com>\r\n")
            .read(b"550 No such user\r\n")
            .write(b"RCPT TO:<dave@example.com>\r\n")
            .read(b"251 Will forward\r\n")
            .build();

        let mut client = client(AuthPolicy::None);
        let err = client.send_over(mock, &[message()]).await.unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidResponse { code: None, ref message }
                if message == "Some RCPT TO commands were rejected by server"
        ));
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_data_rejected() {
        let mock = Builder::new()
            .read(GREETING)
            .write(EHLO)
            .read(EHLO_REPLY)
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<bob@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<carol@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<dave@example.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"DATA\r\n")
            .read(b"554 Transaction failed\r\n")
            .build();

        let mut client = client(AuthPolicy::None);
        let err = client.send_over(mock, &[message()]).await.unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_mail_from_sanitized() {
        let sender = Message::builder()
            .from("alice@example.com\r\nRSET")
            .to("bob@example.com")
            .text("x")
            .build()
            .unwrap();
        let mock = Builder::new()
            .read(GREETING)
            .write(EHLO)
            .read(EHLO_REPLY)
            .write(b"MAIL FROM:<alice@example.comRSET>\r\n")
            .read(b"553 Bad address\r\n")
            .build();

        let mut client = client(AuthPolicy::None);
        let err = client.send_over(mock, &[sender]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse { code: Some(553), .. }));
    }

    #[tokio::test]
    async fn test_quit_failure_still_disconnects() {
        let mock = Builder::new()
            .read(GREETING)
            .write(EHLO)
            .read(EHLO_REPLY)
            .write(b"QUIT\r\n")
            .read(b"500 What?\r\n")
            .build();

        let mut client = client(AuthPolicy::None);
        let err = client.send_over(mock, &[]).await.unwrap_err();

        assert!(matches!(err, Error::InvalidResponse { code: Some(500), .. }));
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_transmit_requires_authentication() {
        let mut client = client(AuthPolicy::None);
        let err = client.transmit(&message()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidResponse { ref message, .. }
                if message == "Cannot send mail before authentication"
        ));
    }

    #[tokio::test]
    async fn test_connection_closed_mid_session() {
        let mock = Builder::new().read(GREETING).write(EHLO).build();

        let mut client = client(AuthPolicy::None);
        let err = client.send_over(mock, &[]).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }
}
