//! Senders and recipients.

use crate::encoding::encode_rfc2047;
use crate::header::sanitize;
use std::fmt;

/// An email contact: optional display name plus a required address.
///
/// Contacts are plain values. Formatting never mutates them and always
/// strips CR/LF, so a contact cannot inject header lines or SMTP commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Contact {
    name: Option<String>,
    address: String,
}

impl Contact {
    /// Creates a contact with just an address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    /// Creates a contact with a display name and address.
    #[must_use]
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    /// Returns the display name as given.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the address as given.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the address for use in `MAIL FROM` / `RCPT TO`.
    #[must_use]
    pub fn envelope_address(&self) -> String {
        sanitize(&self.address)
    }

    /// Formats the contact for a header field.
    ///
    /// - `"Jane Doe" <jane@example.com>` when a name is present
    /// - `=?UTF-8?B?...?= <jane@example.com>` when the name is not ASCII
    /// - `<jane@example.com>` otherwise
    #[must_use]
    pub fn formatted(&self) -> String {
        let address = sanitize(&self.address);
        let name = self
            .name
            .as_deref()
            .map(sanitize)
            .filter(|name| !name.is_empty());

        match name {
            Some(name) if name.is_ascii() => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\" <{address}>")
            }
            Some(name) => format!("{} <{address}>", encode_rfc2047(&name)),
            None => format!("<{address}>"),
        }
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl From<&str> for Contact {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Contact {
    fn from(address: String) -> Self {
        Self::new(address)
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
    use proptest::prelude::*;

    #[test]
    fn test_address_only() {
        let contact = Contact::new("support@example.com");
        assert_eq!(contact.formatted(), "<support@example.com>");
        assert_eq!(contact.name(), None);
    }

    #[test]
    fn test_with_name() {
        let contact = Contact::with_name("Jane Doe", "jane@example.com");
        assert_eq!(contact.formatted(), "\"Jane Doe\" <jane@example.com>");
        assert_eq!(contact.to_string(), contact.formatted());
    }

    #[test]
    fn test_empty_name_is_omitted() {
        let contact = Contact::with_name("", "jane@example.com");
        assert_eq!(contact.formatted(), "<jane@example.com>");
    }

    #[test]
    fn test_name_quotes_escaped() {
        let contact = Contact::with_name("The \"Boss\"", "boss@example.com");
        assert_eq!(contact.formatted(), "\"The \\\"Boss\\\"\" <boss@example.com>");
    }

    #[test]
    fn test_non_ascii_name_encoded() {
        let contact = Contact::with_name("Zoë", "zoe@example.com");
        assert_eq!(contact.formatted(), "=?UTF-8?B?Wm/Dqw==?= <zoe@example.com>");
    }

    #[test]
    fn test_sanitizes_email_crlf() {
        let contact = Contact::new("user@example.com\r\nRCPT TO:<attacker@evil.com>");
        let formatted = contact.formatted();

        assert!(!formatted.contains('\r'));
        assert!(!formatted.contains('\n'));
        assert_eq!(formatted, "<user@example.comRCPT TO:<attacker@evil.com>>");
    }

    #[test]
    fn test_sanitizes_name_crlf() {
        let contact = Contact::with_name("John Doe\r\nBcc: attacker@evil.com", "john@example.com");
        assert_eq!(
            contact.formatted(),
            "\"John DoeBcc: attacker@evil.com\" <john@example.com>"
        );
    }

    #[test]
    fn test_envelope_address() {
        let contact = Contact::with_name("Jane", "jane@example.com\r\nDATA");
        assert_eq!(contact.envelope_address(), "jane@example.comDATA");
    }

    #[test]
    fn test_equality_covers_name() {
        let a = Contact::with_name("A", "x@example.com");
        let b = Contact::with_name("B", "x@example.com");
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
        assert_eq!(Contact::from("x@example.com"), Contact::new("x@example.com"));
    }

    proptest! {
        #[test]
        fn formatted_never_contains_line_breaks(
            name in "[a-zA-Zé @.,<>\"\r\n]{0,40}",
            address in "[a-z@.<>\r\n]{0,40}",
        ) {
            let formatted = Contact::with_name(name, address.clone()).formatted();
            prop_assert!(!formatted.contains('\r'));
            prop_assert!(!formatted.contains('\n'));

            let bare = Contact::new(address).formatted();
            prop_assert!(!bare.contains('\r') && !bare.contains('\n'));
        }
    }
}
