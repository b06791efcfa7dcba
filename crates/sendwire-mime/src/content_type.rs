//! MIME content type handling.

use std::fmt;

/// Multipart container flavours produced by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartKind {
    /// Body plus attachments.
    Mixed,
    /// Equivalent renderings of the same content (plain and HTML).
    Alternative,
    /// HTML plus the resources it references by `cid:`.
    Related,
}

impl MultipartKind {
    /// Returns the multipart subtype.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mixed => "mixed",
            Self::Alternative => "alternative",
            Self::Related => "related",
        }
    }
}

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters in output order (e.g., charset=utf-8, boundary=xxx).
    pub parameters: Vec<(String, String)>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: Vec::new(),
        }
    }

    /// Creates a text/plain content type.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "utf-8")
    }

    /// Creates a text/html content type.
    #[must_use]
    pub fn text_html() -> Self {
        Self::new("text", "html").with_parameter("charset", "utf-8")
    }

    /// Creates a multipart content type with a boundary.
    #[must_use]
    pub fn multipart(kind: MultipartKind, boundary: impl Into<String>) -> Self {
        Self::new("multipart", kind.as_str()).with_parameter("boundary", boundary)
    }

    /// Interprets a caller-supplied MIME type such as `image/png`.
    ///
    /// Anything that is not a plain `type/subtype` pair falls back to
    /// `application/octet-stream`.
    #[must_use]
    pub fn from_mime_type(mime_type: &str) -> Self {
        let essence = mime_type.split(';').next().unwrap_or_default().trim();
        match essence.split_once('/') {
            Some((main, sub)) if is_token(main) && is_token(sub) => {
                Self::new(main.to_ascii_lowercase(), sub.to_ascii_lowercase())
            }
            _ => Self::new("application", "octet-stream"),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }

    /// Returns a parameter value if present.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b)
        })
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;

        for (key, value) in &self.parameters {
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            write!(f, "; {key}=\"{escaped}\"")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_new() {
        let ct = ContentType::new("text", "plain");
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_text_plain() {
        let ct = ContentType::text_plain();
        assert_eq!(ct.to_string(), "text/plain; charset=\"utf-8\"");
    }

    #[test]
    fn test_text_html() {
        let ct = ContentType::text_html();
        assert_eq!(ct.to_string(), "text/html; charset=\"utf-8\"");
    }

    #[test]
    fn test_multipart() {
        let ct = ContentType::multipart(MultipartKind::Related, "b1");
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("b1"));
        assert_eq!(ct.to_string(), "multipart/related; boundary=\"b1\"");
    }

    #[test]
    fn test_from_mime_type() {
        let ct = ContentType::from_mime_type("Image/PNG");
        assert_eq!(ct.to_string(), "image/png");

        let ct = ContentType::from_mime_type("text/csv; charset=latin1");
        assert_eq!(ct.to_string(), "text/csv");
    }

    #[test]
    fn test_from_mime_type_fallback() {
        for raw in ["", "png", "image/", "a b/c", "x/y\"z"] {
            let ct = ContentType::from_mime_type(raw);
            assert_eq!(ct.to_string(), "application/octet-stream", "input {raw:?}");
        }
    }

    #[test]
    fn test_parameter_quoting() {
        let ct = ContentType::new("application", "pdf").with_parameter("name", "a \"b\".pdf");
        assert_eq!(ct.to_string(), "application/pdf; name=\"a \\\"b\\\".pdf\"");
        assert_eq!(ct.parameter("NAME"), Some("a \"b\".pdf"));
    }
}
