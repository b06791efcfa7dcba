//! Server capabilities discovered from an EHLO reply.

use super::Reply;
use std::collections::HashSet;

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext
    Login,
    /// `XOAUTH2` - `OAuth2` (Google/Microsoft)
    XOAuth2,
}

impl AuthMechanism {
    const ALL: [Self; 3] = [Self::Login, Self::Plain, Self::XOAuth2];

    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "XOAUTH2" => Some(Self::XOAuth2),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::XOAuth2 => "XOAUTH2",
        }
    }
}

/// What the server advertised in its last EHLO reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Server accepts `STARTTLS`.
    pub supports_starttls: bool,
    /// Advertised AUTH mechanisms that this client knows.
    pub auth_mechanisms: HashSet<AuthMechanism>,
}

impl Capabilities {
    /// Builds the capability set from an EHLO reply.
    ///
    /// Matching is case-insensitive and substring based: any line mentioning
    /// `STARTTLS` enables it, and any line containing `AUTH ` contributes the
    /// mechanisms it names.
    #[must_use]
    pub fn from_reply(reply: &Reply) -> Self {
        let mut capabilities = Self::default();

        for line in &reply.lines {
            let line = line.to_uppercase();
            if line.contains("STARTTLS") {
                capabilities.supports_starttls = true;
            }
            if line.contains("AUTH ") {
                capabilities.auth_mechanisms.extend(
                    AuthMechanism::ALL
                        .into_iter()
                        .filter(|mechanism| line.contains(mechanism.as_str())),
                );
            }
        }

        capabilities
    }

    /// Returns true if the server advertised `mechanism`.
    #[must_use]
    pub fn supports(&self, mechanism: AuthMechanism) -> bool {
        self.auth_mechanisms.contains(&mechanism)
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
    use crate::types::ReplyCode;

    fn ehlo(lines: &[&str]) -> Reply {
        Reply::new(
            ReplyCode::OK,
            lines.iter().map(ToString::to_string).collect(),
        )
    }

    mod capabilities_tests {
        use super::*;

        #[test]
        fn starttls_and_auth() {
            let caps = Capabilities::from_reply(&ehlo(&[
                "250-smtp.example.com",
                "250-AUTH LOGIN PLAIN",
                "250-STARTTLS",
                "250 SIZE 35882577",
            ]));

            assert!(caps.supports_starttls);
            assert_eq!(
                caps.auth_mechanisms,
                HashSet::from([AuthMechanism::Login, AuthMechanism::Plain])
            );
            assert!(!caps.supports(AuthMechanism::XOAuth2));
        }

        #[test]
        fn case_insensitive() {
            let caps = Capabilities::from_reply(&ehlo(&[
                "250-mx.example.org",
                "250-starttls",
                "250 auth xoauth2 plain",
            ]));

            assert!(caps.supports_starttls);
            assert!(caps.supports(AuthMechanism::XOAuth2));
            assert!(caps.supports(AuthMechanism::Plain));
            assert!(!caps.supports(AuthMechanism::Login));
        }

        #[test]
        fn mechanisms_need_auth_keyword() {
            let caps = Capabilities::from_reply(&ehlo(&["250-LOGIN.example.com", "250 PLAIN"]));
            assert!(caps.auth_mechanisms.is_empty());
            assert!(!caps.supports_starttls);
        }

        #[test]
        fn repeated_lines_are_idempotent() {
            let caps = Capabilities::from_reply(&ehlo(&[
                "250-AUTH LOGIN",
                "250-AUTH=LOGIN",
                "250 AUTH LOGIN",
            ]));
            assert_eq!(caps.auth_mechanisms.len(), 1);
        }

        #[test]
        fn empty_reply() {
            let caps = Capabilities::from_reply(&ehlo(&["250 hello"]));
            assert_eq!(caps, Capabilities::default());
        }
    }

    mod auth_mechanism_tests {
        use super::*;

        #[test]
        fn parse() {
            assert_eq!(AuthMechanism::parse("plain"), Some(AuthMechanism::Plain));
            assert_eq!(AuthMechanism::parse("LOGIN"), Some(AuthMechanism::Login));
            assert_eq!(AuthMechanism::parse("XOAUTH2"), Some(AuthMechanism::XOAuth2));
            assert_eq!(AuthMechanism::parse("CRAM-MD5"), None);
        }

        #[test]
        fn as_str() {
            assert_eq!(AuthMechanism::Plain.as_str(), "PLAIN");
            assert_eq!(AuthMechanism::Login.as_str(), "LOGIN");
            assert_eq!(AuthMechanism::XOAuth2.as_str(), "XOAUTH2");
        }
    }
}
