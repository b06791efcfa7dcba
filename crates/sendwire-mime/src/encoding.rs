//! Transfer encodings used when composing messages.
//!
//! Text bodies go out as Quoted-Printable, binary parts as line-wrapped
//! Base64, and non-ASCII header text as RFC 2047 encoded words. The
//! decoders exist so callers (and the tests) can verify what was produced.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Maximum encoded line length for Quoted-Printable and Base64 bodies.
const MAX_LINE_LENGTH: usize = 76;

/// Encodes data as Base64 on a single line.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64, hard-wrapped at 76 characters per line.
///
/// Lines are joined with CRLF; the result has no trailing line break.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut result = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2);

    let mut start = 0;
    while start < encoded.len() {
        let end = (start + MAX_LINE_LENGTH).min(encoded.len());
        if start > 0 {
            result.push_str("\r\n");
        }
        // Base64 output is pure ASCII, so any byte offset is a char boundary.
        result.push_str(&encoded[start..end]);
        start = end;
    }

    result
}

/// Decodes Base64 data, ignoring embedded whitespace and line breaks.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Normalizes `\r\n`, lone `\r` and lone `\n` to CRLF.
#[must_use]
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\r\n")
}

/// Encodes text using Quoted-Printable encoding (RFC 2045).
///
/// Line endings are normalized to CRLF first and kept as hard breaks.
/// Printable ASCII other than `=` passes through, as do spaces and tabs
/// unless they end a line. Everything else becomes `=XX`. Soft breaks keep
/// every encoded line within 76 characters including the trailing `=`.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let normalized = normalize_line_endings(text);
    let bytes = normalized.as_bytes();
    let mut result = String::with_capacity(bytes.len());
    let mut line_length = 0;
    let mut index = 0;

    while index < bytes.len() {
        let byte = bytes[index];

        if byte == b'\r' && bytes.get(index + 1) == Some(&b'\n') {
            result.push_str("\r\n");
            line_length = 0;
            index += 2;
            continue;
        }

        let literal = match byte {
            b'!'..=b'<' | b'>'..=b'~' => true,
            // Whitespace before a line break would be stripped in transit
            b' ' | b'\t' => !matches!(bytes.get(index + 1), None | Some(b'\r')),
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        // One column stays free for the '=' of a soft break.
        if line_length + width > MAX_LINE_LENGTH - 1 {
            result.push_str("=\r\n");
            line_length = 0;
        }

        if literal {
            result.push(char::from(byte));
        } else {
            let _ = write!(result, "={byte:02X}");
        }
        line_length += width;
        index += 1;
    }

    result
}

/// Decodes Quoted-Printable text (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences or the
/// decoded bytes are not UTF-8.
pub fn decode_quoted_printable(text: &str) -> Result<String> {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] != b'=' {
            result.push(bytes[index]);
            index += 1;
            continue;
        }

        let rest = &bytes[index + 1..];
        if rest.starts_with(b"\r\n") {
            index += 3;
        } else if rest.starts_with(b"\n") {
            index += 2;
        } else {
            let hex = rest
                .get(..2)
                .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                .ok_or_else(|| Error::InvalidEncoding("Incomplete escape sequence".into()))?;
            let byte = (hex_value(hex[0]) << 4) | hex_value(hex[1]);
            result.push(byte);
            index += 3;
        }
    }

    String::from_utf8(result).map_err(Into::into)
}

const fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

/// Encodes header text as an RFC 2047 `B` encoded word when it is not
/// pure ASCII. ASCII text is returned unchanged.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }

    format!("=?UTF-8?B?{}?=", encode_base64(text.as_bytes()))
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
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_wrapped_line_length() {
        let data = vec![0xAB; 300];
        let encoded = encode_base64_wrapped(&data);

        let lines: Vec<&str> = encoded.split("\r\n").collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[..5].iter().all(|line| line.len() == 76));
        assert!(lines[5].len() <= 76);
        assert!(!encoded.ends_with("\r\n"));
        assert_eq!(decode_base64(&encoded).unwrap(), data);
    }

    #[test]
    fn test_base64_wrapped_empty() {
        assert_eq!(encode_base64_wrapped(b""), "");
    }

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize_line_endings("a\nb\r\nc\rd"), "a\r\nb\r\nc\r\nd");
        assert_eq!(normalize_line_endings("\r\n\r\n"), "\r\n\r\n");
    }

    #[test]
    fn test_quoted_printable_plain_ascii() {
        assert_eq!(encode_quoted_printable("Hello, World!"), "Hello, World!");
    }

    #[test]
    fn test_quoted_printable_escapes_equals_and_utf8() {
        assert_eq!(encode_quoted_printable("a=b"), "a=3Db");
        assert_eq!(encode_quoted_printable("Héllo"), "H=C3=A9llo");
    }

    #[test]
    fn test_quoted_printable_trailing_whitespace() {
        assert_eq!(encode_quoted_printable("end \nnext"), "end=20\r\nnext");
        assert_eq!(encode_quoted_printable("tab\t"), "tab=09");
        assert_eq!(encode_quoted_printable("a b"), "a b");
    }

    #[test]
    fn test_quoted_printable_normalizes_newlines() {
        assert_eq!(encode_quoted_printable("one\ntwo\rthree"), "one\r\ntwo\r\nthree");
    }

    #[test]
    fn test_quoted_printable_soft_breaks() {
        let text = "x".repeat(200);
        let encoded = encode_quoted_printable(&text);

        for line in encoded.split("\r\n") {
            assert!(line.len() <= 76, "line too long: {}", line.len());
        }
        assert!(encoded.contains("=\r\n"));
        assert_eq!(decode_quoted_printable(&encoded).unwrap(), text);
    }

    #[test]
    fn test_quoted_printable_escape_not_split() {
        let text = "é".repeat(60);
        let encoded = encode_quoted_printable(&text);

        for line in encoded.split("\r\n") {
            assert!(line.len() <= 76);
            let body = line.strip_suffix('=').unwrap_or(line);
            assert_eq!(body.len() % 3, 0);
        }
        assert_eq!(decode_quoted_printable(&encoded).unwrap(), text);
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable("H=C3=A9llo").unwrap(), "Héllo");
        assert_eq!(decode_quoted_printable("h=c3=a9").unwrap(), "hé");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        let decoded = decode_quoted_printable("Hello=\r\nWorld").unwrap();
        assert_eq!(decoded, "HelloWorld");
    }

    #[test]
    fn test_quoted_printable_decode_invalid() {
        assert!(decode_quoted_printable("bad=Z1").is_err());
        assert!(decode_quoted_printable("cut=4").is_err());
        assert!(decode_quoted_printable("sign=+1").is_err());
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("Hello"), "Hello");

        let encoded = encode_rfc2047("Héllo");
        assert_eq!(encoded, "=?UTF-8?B?SMOpbGxv?=");
    }
}
