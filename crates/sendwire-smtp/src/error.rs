//! Error types for SMTP operations.

use crate::types::{Reply, ReplyCode};
use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation requires an open connection.
    #[error("No open connection")]
    InvalidChannel,

    /// Unexpected or malformed reply, or a server capability precondition
    /// that does not hold.
    #[error("{}", display_response(.code, .message))]
    InvalidResponse {
        /// Reply code when the server produced the reply.
        code: Option<u16>,
        /// Reply lines joined by newlines, or a local diagnostic.
        message: String,
    },

    /// An AUTH step was answered with an unexpected code.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The stream ended or the transport was closed while waiting.
    #[error("Connection closed")]
    ConnectionClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Hostname cannot be used for certificate verification.
    #[error("Invalid hostname: {0}")]
    InvalidHostname(String),

    /// The server sent a line longer than the transport accepts.
    #[error("Line exceeds maximum length")]
    LineTooLong,

    /// The message could not be built.
    #[error("Message error: {0}")]
    Message(#[from] sendwire_mime::Error),
}

#[allow(clippy::ref_option)]
fn display_response(code: &Option<u16>, message: &str) -> String {
    code.map_or_else(
        || format!("Invalid response: {message}"),
        |code| format!("Invalid response {code}: {message}"),
    )
}

impl Error {
    /// Creates an `InvalidResponse` with a local diagnostic and no code.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            code: None,
            message: message.into(),
        }
    }

    /// Creates an `InvalidResponse` describing a server reply.
    #[must_use]
    pub fn unexpected_reply(reply: &Reply) -> Self {
        Self::InvalidResponse {
            code: Some(reply.code.as_u16()),
            message: reply.lines.join("\n"),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::InvalidResponse { code: Some(code), .. } if ReplyCode::new(*code).is_permanent()
        )
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::InvalidResponse { code: Some(code), .. } if ReplyCode::new(*code).is_transient()
        )
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

    #[test]
    fn unexpected_reply_keeps_code_and_lines() {
        let reply = Reply::new(
            ReplyCode::MAILBOX_UNAVAILABLE,
            vec!["550-No such user".into(), "550 Try again".into()],
        );
        let err = Error::unexpected_reply(&reply);

        match &err {
            Error::InvalidResponse { code, message } => {
                assert_eq!(*code, Some(550));
                assert_eq!(message, "550-No such user\n550 Try again");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_permanent());
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_classification() {
        let reply = Reply::new(ReplyCode::MAILBOX_BUSY, vec!["450 Busy".into()]);
        let err = Error::unexpected_reply(&reply);
        assert!(err.is_transient());
        assert!(!err.is_permanent());
    }

    #[test]
    fn local_diagnostics_are_neither() {
        let err = Error::invalid_response("Server does not support STARTTLS");
        assert!(!err.is_permanent());
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "Invalid response: Server does not support STARTTLS"
        );
        assert!(!Error::ConnectionClosed.is_permanent());
    }

    #[test]
    fn display_with_code() {
        let err = Error::InvalidResponse {
            code: Some(554),
            message: "554 Rejected".into(),
        };
        assert_eq!(err.to_string(), "Invalid response 554: 554 Rejected");
    }

    #[test]
    fn message_errors_convert() {
        let err: Error = sendwire_mime::Message::builder().build().unwrap_err().into();
        assert!(matches!(err, Error::Message(_)));
        assert!(err.to_string().starts_with("Message error:"));
    }
}
