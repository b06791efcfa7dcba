//! SMTP connection management.
//!
//! - [`stream`]: TCP/TLS streams and the [`TlsUpgrade`] seam
//! - [`Transport`]: line framing, reply reading and command round trips
//! - [`Client`]: the session state machine on top of a transport

mod client;
mod config;
mod stream;
mod transport;

pub use client::{Client, SessionState};
pub use config::{AuthPolicy, Config, ConfigBuilder, Credentials, DEFAULT_HELO_NAME, DEFAULT_PORT};
pub use stream::{SmtpStream, TlsUpgrade, connect, connect_tls};
pub use transport::Transport;
