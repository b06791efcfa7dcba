//! SMTP command builder.

use crate::types::AuthMechanism;
use std::borrow::Cow;

/// SMTP command.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (optional, for SASL-IR)
        initial_response: Option<String>,
    },
    /// Base64 answer to a `334` challenge
    AuthResponse(String),
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address, without angle brackets
        from: String,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address, without angle brackets
        to: String,
    },
    /// DATA - Begin message data
    Data,
    /// Lone `.` ending the message data
    DataEnd,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Returns the command line without the trailing CRLF.
    #[must_use]
    pub fn line(&self) -> String {
        match self {
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response,
            } => match initial_response {
                Some(response) => format!("AUTH {} {response}", mechanism.as_str()),
                None => format!("AUTH {}", mechanism.as_str()),
            },
            Self::AuthResponse(response) => response.clone(),
            Self::MailFrom { from } => format!("MAIL FROM:<{from}>"),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::DataEnd => ".".to_string(),
            Self::Quit => "QUIT".to_string(),
        }
    }

    /// Returns the command line with credentials masked, for logging.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Auth {
                mechanism,
                initial_response: Some(_),
            } => format!("AUTH {} ****", mechanism.as_str()),
            Self::AuthResponse(_) => "****".to_string(),
            _ => self.line(),
        }
    }

    /// Serializes the command to bytes, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = self.line().into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Doubles the leading `.` of every line so message data cannot end the
/// DATA phase early.
///
/// Borrows the input when no line starts with a dot.
#[must_use]
pub fn dot_stuff(data: &[u8]) -> Cow<'_, [u8]> {
    let needs_stuffing = data.first() == Some(&b'.')
        || data.windows(2).any(|pair| pair == b"\n.");
    if !needs_stuffing {
        return Cow::Borrowed(data);
    }

    let mut stuffed = Vec::with_capacity(data.len() + 16);
    let mut at_line_start = true;
    for &byte in data {
        if at_line_start && byte == b'.' {
            stuffed.push(b'.');
        }
        stuffed.push(byte);
        at_line_start = byte == b'\n';
    }
    Cow::Owned(stuffed)
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
    fn test_ehlo_command() {
        let cmd = Command::Ehlo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), b"EHLO client.example.com\r\n");
    }

    #[test]
    fn test_starttls_command() {
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
    }

    #[test]
    fn test_auth_login() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        assert_eq!(cmd.line(), "AUTH LOGIN");
        assert_eq!(cmd.redacted(), "AUTH LOGIN");
    }

    #[test]
    fn test_auth_plain() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert_eq!(cmd.serialize(), b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n");
        assert_eq!(cmd.redacted(), "AUTH PLAIN ****");
        assert_eq!(format!("{cmd:?}"), "AUTH PLAIN ****");
    }

    #[test]
    fn test_auth_response_redacted() {
        let cmd = Command::AuthResponse("c2VjcmV0".to_string());
        assert_eq!(cmd.line(), "c2VjcmV0");
        assert_eq!(cmd.redacted(), "****");
    }

    #[test]
    fn test_mail_from_command() {
        let cmd = Command::MailFrom {
            from: "sender@example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), b"MAIL FROM:<sender@example.com>\r\n");
    }

    #[test]
    fn test_rcpt_to_command() {
        let cmd = Command::RcptTo {
            to: "recipient@example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), b"RCPT TO:<recipient@example.com>\r\n");
    }

    #[test]
    fn test_data_commands() {
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::DataEnd.serialize(), b".\r\n");
    }

    #[test]
    fn test_quit_command() {
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn test_dot_stuff_untouched() {
        let data = b"Hello\r\nWorld.\r\n";
        assert!(matches!(dot_stuff(data), Cow::Borrowed(_)));
    }

    #[test]
    fn test_dot_stuff_leading_dots() {
        let data = b".first\r\nmiddle\r\n.\r\n..two\r\n";
        assert_eq!(
            dot_stuff(data).as_ref(),
            b"..first\r\nmiddle\r\n..\r\n...two\r\n"
        );
    }

    #[test]
    fn test_dot_stuff_empty() {
        assert!(dot_stuff(b"").is_empty());
    }
}
