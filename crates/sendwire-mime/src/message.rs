//! Outgoing message model.

use crate::attachment::{Attachment, InlineImage};
use crate::builder;
use crate::contact::Contact;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};

/// Message body variants.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Body {
    /// Plain text only.
    Plain(String),
    /// HTML only.
    Html(String),
    /// Plain text and HTML renderings of the same content.
    Alternative {
        /// Plain text rendering.
        plain: String,
        /// HTML rendering.
        html: String,
    },
}

impl Body {
    /// Text used for text-only parts or fallbacks.
    #[must_use]
    pub fn plain_text(&self) -> &str {
        match self {
            Self::Plain(text) | Self::Html(text) => text,
            Self::Alternative { plain, .. } => plain,
        }
    }

    /// HTML rendering when there is one.
    #[must_use]
    pub fn html_text(&self) -> Option<&str> {
        match self {
            Self::Plain(_) => None,
            Self::Html(html) | Self::Alternative { html, .. } => Some(html),
        }
    }
}

/// Message priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Priority {
    /// Low priority.
    Low,
    /// Normal priority (no headers emitted).
    #[default]
    Normal,
    /// High priority.
    High,
}

impl Priority {
    /// Header fields signalling this priority to common mail clients.
    #[must_use]
    pub const fn headers(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::High => &[
                ("X-Priority", "1 (Highest)"),
                ("X-MSMail-Priority", "High"),
                ("Importance", "High"),
            ],
            Self::Low => &[("X-Priority", "5 (Lowest)"), ("Importance", "Low")],
            Self::Normal => &[],
        }
    }
}

/// An email message ready to be rendered and sent.
///
/// Messages are immutable once built; use [`MessageBuilder`] to create one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    sender: Contact,
    to: Vec<Contact>,
    cc: Vec<Contact>,
    bcc: Vec<Contact>,
    reply_to: Option<Contact>,
    subject: String,
    body: Body,
    attachments: Vec<Attachment>,
    inline_images: Vec<InlineImage>,
    priority: Option<Priority>,
}

impl Message {
    /// Starts building a message.
    #[must_use]
    pub fn builder() -> MessageBuilder {
        MessageBuilder::new()
    }

    /// Returns the sender.
    #[must_use]
    pub const fn sender(&self) -> &Contact {
        &self.sender
    }

    /// Returns the To recipients.
    #[must_use]
    pub fn to(&self) -> &[Contact] {
        &self.to
    }

    /// Returns the Cc recipients.
    #[must_use]
    pub fn cc(&self) -> &[Contact] {
        &self.cc
    }

    /// Returns the Bcc recipients. They never appear in the rendered headers.
    #[must_use]
    pub fn bcc(&self) -> &[Contact] {
        &self.bcc
    }

    /// Returns the Reply-To contact.
    #[must_use]
    pub const fn reply_to(&self) -> Option<&Contact> {
        self.reply_to.as_ref()
    }

    /// Returns the subject as given.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the body.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Returns the attachments.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Returns the inline images.
    #[must_use]
    pub fn inline_images(&self) -> &[InlineImage] {
        &self.inline_images
    }

    /// Returns the priority, if one was set.
    #[must_use]
    pub const fn priority(&self) -> Option<Priority> {
        self.priority
    }

    /// Returns every envelope recipient: To, then Cc, then Bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &Contact> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }

    /// Renders the message as the bytes sent after `DATA`.
    ///
    /// See [`builder::build`].
    #[must_use]
    pub fn render(&self, date: DateTime<Utc>, message_id_domain: &str) -> Vec<u8> {
        builder::build(self, date, message_id_domain)
    }
}

/// Builder for [`Message`].
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    sender: Option<Contact>,
    to: Vec<Contact>,
    cc: Vec<Contact>,
    bcc: Vec<Contact>,
    reply_to: Option<Contact>,
    subject: String,
    body: Option<Body>,
    attachments: Vec<Attachment>,
    inline_images: Vec<InlineImage>,
    priority: Option<Priority>,
}

impl MessageBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender.
    #[must_use]
    pub fn from(mut self, sender: impl Into<Contact>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Adds a To recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<Contact>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Adds a Cc recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<Contact>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Adds a Bcc recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: impl Into<Contact>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Sets the Reply-To contact.
    #[must_use]
    pub fn reply_to(mut self, contact: impl Into<Contact>) -> Self {
        self.reply_to = Some(contact.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets a plain text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(Body::Plain(text.into()));
        self
    }

    /// Sets an HTML body.
    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.body = Some(Body::Html(html.into()));
        self
    }

    /// Sets plain text and HTML renderings.
    #[must_use]
    pub fn alternative(mut self, plain: impl Into<String>, html: impl Into<String>) -> Self {
        self.body = Some(Body::Alternative {
            plain: plain.into(),
            html: html.into(),
        });
        self
    }

    /// Sets the body directly.
    #[must_use]
    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Adds an inline image.
    #[must_use]
    pub fn inline_image(mut self, image: InlineImage) -> Self {
        self.inline_images.push(image);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Builds the message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] without a sender, a To recipient, or a
    /// body.
    pub fn build(self) -> Result<Message> {
        let sender = self.sender.ok_or(Error::MissingField("from"))?;
        if self.to.is_empty() {
            return Err(Error::MissingField("to"));
        }
        let body = self.body.ok_or(Error::MissingField("body"))?;

        Ok(Message {
            sender,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
            subject: self.subject,
            body,
            attachments: self.attachments,
            inline_images: self.inline_images,
            priority: self.priority,
        })
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

    fn sample() -> MessageBuilder {
        Message::builder()
            .from("alice@example.com")
            .to("bob@example.com")
            .subject("Hello")
            .text("How are you?")
    }

    #[test]
    fn test_build_minimal() {
        let message = sample().build().unwrap();
        assert_eq!(message.sender().address(), "alice@example.com");
        assert_eq!(message.to().len(), 1);
        assert_eq!(message.subject(), "Hello");
        assert_eq!(message.body(), &Body::Plain("How are you?".into()));
        assert_eq!(message.priority(), None);
    }

    #[test]
    fn test_build_requires_fields() {
        let err = Message::builder().to("b@example.com").text("x").build();
        assert!(matches!(err, Err(Error::MissingField("from"))));

        let err = Message::builder().from("a@example.com").text("x").build();
        assert!(matches!(err, Err(Error::MissingField("to"))));

        let err = Message::builder()
            .from("a@example.com")
            .to("b@example.com")
            .build();
        assert!(matches!(err, Err(Error::MissingField("body"))));
    }

    #[test]
    fn test_recipients_order() {
        let message = sample()
            .to("carol@example.com")
            .cc("dave@example.com")
            .bcc("eve@example.com")
            .build()
            .unwrap();

        let addresses: Vec<&str> = message.recipients().map(Contact::address).collect();
        assert_eq!(
            addresses,
            vec![
                "bob@example.com",
                "carol@example.com",
                "dave@example.com",
                "eve@example.com"
            ]
        );
    }

    #[test]
    fn test_body_accessors() {
        let body = Body::Alternative {
            plain: "p".into(),
            html: "<p>h</p>".into(),
        };
        assert_eq!(body.plain_text(), "p");
        assert_eq!(body.html_text(), Some("<p>h</p>"));

        assert_eq!(Body::Plain("t".into()).html_text(), None);
        assert_eq!(Body::Html("<b>".into()).plain_text(), "<b>");
    }

    #[test]
    fn test_priority_headers() {
        assert_eq!(Priority::High.headers().len(), 3);
        assert_eq!(Priority::Low.headers()[0], ("X-Priority", "5 (Lowest)"));
        assert!(Priority::Normal.headers().is_empty());
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
