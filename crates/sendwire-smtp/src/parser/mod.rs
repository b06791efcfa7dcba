//! SMTP response parser.
//!
//! Replies are one or more lines. Every line starts with the same three
//! digit code; a `-` in the fourth column means more lines follow:
//!
//! ```text
//! 250-smtp.example.com
//! 250-STARTTLS
//! 250 AUTH LOGIN PLAIN
//! ```

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses the status code from the first three characters of a line.
///
/// # Errors
///
/// Returns `InvalidResponse` if the line does not start with three digits.
pub fn parse_code(line: &str) -> Result<ReplyCode> {
    line.get(..3)
        .filter(|code| code.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|code| code.parse::<u16>().ok())
        .map(ReplyCode::new)
        .ok_or_else(|| Error::invalid_response(format!("Invalid reply line: {line}")))
}

/// Returns true if more lines of the same reply follow this one.
#[must_use]
pub fn is_continuation(line: &str) -> bool {
    line.as_bytes().get(3) == Some(&b'-')
}

/// Returns true if `line` ends a reply with status `code`.
///
/// The final line repeats the code followed by a space, or is just the code.
#[must_use]
pub fn is_final_line(line: &str, code: ReplyCode) -> bool {
    let Ok(line_code) = parse_code(line) else {
        return false;
    };
    line_code == code && matches!(line.as_bytes().get(3), None | Some(b' '))
}

/// Parses a complete reply from its lines.
///
/// # Errors
///
/// Returns `InvalidResponse` if the lines are empty, the first line has no
/// valid code, a continuation is missing its final line, or lines follow
/// the final one.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::invalid_response("Empty reply"));
    };
    let code = parse_code(first)?;

    let end = if is_continuation(first) {
        lines[1..]
            .iter()
            .position(|line| is_final_line(line, code))
            .map(|index| index + 1)
            .ok_or_else(|| Error::invalid_response(format!("Incomplete reply: {first}")))?
    } else {
        0
    };

    if end + 1 != lines.len() {
        return Err(Error::invalid_response(format!(
            "Unexpected lines after reply: {}",
            lines[end + 1]
        )));
    }

    Ok(Reply::new(code, lines.to_vec()))
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

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_code() {
        assert_eq!(parse_code("250 OK").unwrap(), ReplyCode::OK);
        assert_eq!(parse_code("354").unwrap(), ReplyCode::START_DATA);
        assert!(parse_code("25").is_err());
        assert!(parse_code("ABC OK").is_err());
        assert!(parse_code("+25 OK").is_err());
        assert!(parse_code("").is_err());
    }

    #[test]
    fn test_is_continuation() {
        assert!(is_continuation("250-First"));
        assert!(!is_continuation("250 Last"));
        assert!(!is_continuation("250"));
    }

    #[test]
    fn test_is_final_line() {
        assert!(is_final_line("250 OK", ReplyCode::OK));
        assert!(is_final_line("250", ReplyCode::OK));
        assert!(!is_final_line("250-More", ReplyCode::OK));
        assert!(!is_final_line("251 OK", ReplyCode::OK));
        assert!(!is_final_line("garbage", ReplyCode::OK));
    }

    #[test]
    fn test_parse_single_line_reply() {
        let reply = parse_reply(&lines(&["250 OK"])).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.lines, vec!["250 OK"]);
        assert_eq!(reply.text(), "OK");
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let reply = parse_reply(&lines(&["250-First", "250-Second", "250 Third"])).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.lines.len(), 3);
        assert_eq!(reply.text(), "First\nSecond\nThird");
    }

    #[test]
    fn test_parse_bare_final_line() {
        let reply = parse_reply(&lines(&["250-First", "250"])).unwrap();
        assert_eq!(reply.lines.len(), 2);
    }

    #[test]
    fn test_parse_error_empty() {
        assert!(parse_reply(&[]).is_err());
    }

    #[test]
    fn test_parse_error_invalid_code() {
        assert!(parse_reply(&lines(&["ABC OK"])).is_err());
    }

    #[test]
    fn test_parse_error_incomplete() {
        assert!(parse_reply(&lines(&["250-First", "250-Second"])).is_err());
    }

    #[test]
    fn test_parse_error_trailing_lines() {
        assert!(parse_reply(&lines(&["250 OK", "250 Again"])).is_err());
    }

    #[test]
    fn test_parse_error_code_mismatch() {
        assert!(parse_reply(&lines(&["250-First", "251 Other"])).is_err());
    }
}
