//! SMTP reply types.

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Raw reply lines, code and separator included.
    pub lines: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns true if the reply code is one of `expected`.
    #[must_use]
    pub fn is(&self, expected: &[ReplyCode]) -> bool {
        expected.contains(&self.code)
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the text of each line after the code and separator.
    pub fn text_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(|line| line.get(4..).unwrap_or_default())
    }

    /// Returns the reply text without codes, one line per reply line.
    #[must_use]
    pub fn text(&self) -> String {
        self.text_lines().collect::<Vec<_>>().join("\n")
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Codes the client checks for
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 251 User not local; will forward
    pub const FORWARD: Self = Self(251);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 450 Mailbox unavailable (busy)
    pub const MAILBOX_BUSY: Self = Self(450);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);
    /// 550 Mailbox unavailable (not found, access denied)
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
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

    mod reply_code_tests {
        use super::*;

        #[test]
        fn classes() {
            assert!(ReplyCode::OK.is_success());
            assert!(ReplyCode::AUTH_SUCCESS.is_success());
            assert!(!ReplyCode::AUTH_CONTINUE.is_success());
            assert!(!ReplyCode::START_DATA.is_transient());
            assert!(ReplyCode::MAILBOX_BUSY.is_transient());
            assert!(ReplyCode::AUTH_FAILED.is_permanent());
            assert!(!ReplyCode::OK.is_permanent());
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", ReplyCode::OK), "250");
            assert_eq!(ReplyCode::new(421).as_u16(), 421);
        }

        #[test]
        fn ordering() {
            assert!(ReplyCode::OK < ReplyCode::MAILBOX_BUSY);
            assert!(ReplyCode::MAILBOX_BUSY < ReplyCode::MAILBOX_UNAVAILABLE);
        }
    }

    mod reply_tests {
        use super::*;

        #[test]
        fn is_expected() {
            let reply = Reply::new(ReplyCode::FORWARD, vec!["251 Forwarding".to_string()]);
            assert!(reply.is(&[ReplyCode::OK, ReplyCode::FORWARD]));
            assert!(!reply.is(&[ReplyCode::OK]));
            assert!(reply.is_success());
        }

        #[test]
        fn text_strips_codes() {
            let reply = Reply::new(
                ReplyCode::OK,
                vec![
                    "250-smtp.example.com".to_string(),
                    "250-PIPELINING".to_string(),
                    "250 STARTTLS".to_string(),
                ],
            );
            assert_eq!(reply.text(), "smtp.example.com\nPIPELINING\nSTARTTLS");
        }

        #[test]
        fn text_bare_code() {
            let reply = Reply::new(ReplyCode::OK, vec!["250".to_string()]);
            assert_eq!(reply.text(), "");
            assert_eq!(Reply::new(ReplyCode::OK, vec![]).text(), "");
        }
    }
}
