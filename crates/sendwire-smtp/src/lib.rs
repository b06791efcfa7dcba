//! # sendwire-smtp
//!
//! Outbound SMTP client (RFC 5321) that delivers [`Message`]s composed with
//! `sendwire-mime`.
//!
//! ## Features
//!
//! - **Session state machine**: connect, EHLO, STARTTLS, AUTH, one
//!   transaction per message, QUIT
//! - **Authentication**: AUTH LOGIN and AUTH PLAIN, always over TLS
//! - **Line transport**: a background task owns the socket and buffers
//!   server lines in arrival order
//! - **Safe envelopes**: CR/LF stripped from addresses, DATA dot-stuffed
//!
//! ## Quick Start
//!
//! ```no_run
//! use sendwire_smtp::{AuthPolicy, Client, Config, Message};
//!
//! #[tokio::main]
//! async fn main() -> sendwire_smtp::Result<()> {
//!     let config = Config::builder("smtp.example.com")
//!         .port(587)
//!         .helo_name("client.example.com")
//!         .auth(AuthPolicy::login("user@example.com", "password"))
//!         .build();
//!
//!     let message = Message::builder()
//!         .from("user@example.com")
//!         .to("recipient@example.com")
//!         .subject("Test")
//!         .text("Hello, World!")
//!         .build()?;
//!
//!     Client::new(config).send_one(&message).await
//! }
//! ```
//!
//! ## Session States
//!
//! ```text
//! Disconnected ─→ Connected ─→ Greeted ─→ [TlsEstablished] ─→ Authenticated
//!                                                             │        ▲
//!                                                             ▼        │
//!                                                          MailTransaction
//! ```
//!
//! Any error closes the connection and returns to `Disconnected`.
//!
//! ## Modules
//!
//! - [`command`]: SMTP command lines and dot-stuffing
//! - [`connection`]: streams, line transport and the session client
//! - [`parser`]: reply parser
//! - [`types`]: replies and capabilities

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{AuthPolicy, Client, Config, ConfigBuilder, Credentials, SessionState};
pub use error::{Error, Result};
pub use sendwire_mime::{
    Attachment, Body, Contact, InlineImage, Message, MessageBuilder, Priority,
};
pub use types::{AuthMechanism, Capabilities, Reply, ReplyCode};
