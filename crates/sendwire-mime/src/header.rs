//! Ordered header lists for outgoing messages and parts.
//!
//! Every value stored here has CR and LF removed, so nothing placed into a
//! header can start a new header line or leak into the SMTP command stream.

use std::fmt;

/// Removes every carriage return and line feed from a header value.
#[must_use]
pub fn sanitize(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

/// Ordered collection of header fields.
///
/// Unlike a map, insertion order is preserved since header order is part
/// of the rendered output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header field. Name and value are sanitized.
    pub fn add(&mut self, name: impl AsRef<str>, value: impl AsRef<str>) {
        self.fields
            .push((sanitize(name.as_ref()), sanitize(value.as_ref())));
    }

    /// Gets the first value for a header (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns an iterator over all fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Appends every field of `other` after the existing ones.
    pub fn extend(&mut self, other: Self) {
        self.fields.extend(other.fields);
    }
}

impl fmt::Display for Headers {
    /// Writes each field as `Name: value` followed by CRLF.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
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
    fn test_sanitize_removes_crlf() {
        assert_eq!(sanitize("Hello\r\nWorld\rTest\nEnd"), "HelloWorldTestEnd");
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("\r\n\r\n"), "");
    }

    #[test]
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
        assert_eq!(headers.len(), 0);
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("Subject"), None);
    }

    #[test]
    fn test_headers_keep_order() {
        let mut headers = Headers::new();
        headers.add("To", "b@example.com");
        headers.add("From", "a@example.com");
        headers.add("Subject", "Hi");

        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["To", "From", "Subject"]);
    }

    #[test]
    fn test_headers_sanitize_values() {
        let mut headers = Headers::new();
        headers.add("Subject", "Hi\r\nBcc: evil@example.com");

        assert_eq!(headers.get("Subject"), Some("HiBcc: evil@example.com"));
        assert_eq!(headers.to_string(), "Subject: HiBcc: evil@example.com\r\n");
    }

    #[test]
    fn test_headers_display() {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com");
        headers.add("To", "recipient@example.com");

        assert_eq!(
            headers.to_string(),
            "From: sender@example.com\r\nTo: recipient@example.com\r\n"
        );
    }

    #[test]
    fn test_headers_extend() {
        let mut first = Headers::new();
        first.add("A", "1");
        let mut second = Headers::new();
        second.add("B", "2");

        first.extend(second);
        assert_eq!(first.len(), 2);
        assert_eq!(first.get("B"), Some("2"));
    }
}
