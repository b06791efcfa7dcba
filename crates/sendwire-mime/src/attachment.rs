//! File attachments and inline images.

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// MIME type, e.g. `application/pdf`.
    pub mime_type: String,
    /// Raw file contents.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// An image referenced from the HTML body as `cid:<content_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InlineImage {
    /// Content-ID used in `cid:` references, without angle brackets.
    pub content_id: String,
    /// File name of the image.
    pub filename: String,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Raw image bytes.
    pub data: Vec<u8>,
}

impl InlineImage {
    /// Creates an inline image.
    #[must_use]
    pub fn new(
        content_id: impl Into<String>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            filename: filename.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Converts the image into an ordinary attachment.
    ///
    /// Used when the body has no HTML that could reference it.
    #[must_use]
    pub fn to_attachment(&self) -> Attachment {
        Attachment::new(self.filename.clone(), self.mime_type.clone(), self.data.clone())
    }
}
