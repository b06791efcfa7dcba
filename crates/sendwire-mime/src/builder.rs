//! Serialization of a [`Message`] into an RFC 5322 byte stream.
//!
//! The body tree depends on the body kind, the inline images and the
//! attachments:
//!
//! | body        | inline images | result                                     |
//! |-------------|---------------|--------------------------------------------|
//! | plain       | -             | text/plain                                 |
//! | html        | no            | text/html                                  |
//! | html        | yes           | related(html, images)                      |
//! | alternative | no            | alternative(plain, html)                   |
//! | alternative | yes           | alternative(plain, related(html, images))  |
//!
//! Attachments wrap the result in `multipart/mixed`. A plain body cannot
//! reference inline images, so they are sent as ordinary attachments.

use crate::attachment::{Attachment, InlineImage};
use crate::contact::Contact;
use crate::content_type::{ContentType, MultipartKind};
use crate::encoding::{encode_base64_wrapped, encode_quoted_printable, encode_rfc2047};
use crate::header::{Headers, sanitize};
use crate::message::{Body, Message};
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

const CRLF: &[u8] = b"\r\n";

/// Content-Transfer-Encoding of a leaf part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// Used for text bodies.
    QuotedPrintable,
    /// Used for attachments and inline images.
    Base64,
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Base64 => write!(f, "base64"),
        }
    }
}

/// A MIME part: its own headers and an already encoded body.
#[derive(Debug, Clone)]
struct Part {
    headers: Headers,
    body: Vec<u8>,
}

impl Part {
    fn text(content_type: ContentType, text: &str) -> Self {
        let mut headers = Headers::new();
        headers.add("Content-Type", content_type.to_string());
        headers.add(
            "Content-Transfer-Encoding",
            TransferEncoding::QuotedPrintable.to_string(),
        );

        let mut body = encode_quoted_printable(text).into_bytes();
        body.extend_from_slice(CRLF);
        Self { headers, body }
    }

    fn binary(mime_type: &str, filename: &str, disposition: &str, data: &[u8]) -> Self {
        let content_type =
            ContentType::from_mime_type(mime_type).with_parameter("name", sanitize(filename));

        let mut headers = Headers::new();
        headers.add("Content-Type", content_type.to_string());
        headers.add("Content-Transfer-Encoding", TransferEncoding::Base64.to_string());
        headers.add(
            "Content-Disposition",
            format!("{disposition}; filename={}", quoted(filename)),
        );

        let mut body = encode_base64_wrapped(data).into_bytes();
        body.extend_from_slice(CRLF);
        Self { headers, body }
    }

    fn attachment(attachment: &Attachment) -> Self {
        Self::binary(
            &attachment.mime_type,
            &attachment.filename,
            "attachment",
            &attachment.data,
        )
    }

    fn inline_image(image: &InlineImage) -> Self {
        let mut part = Self::binary(&image.mime_type, &image.filename, "inline", &image.data);
        part.headers
            .add("Content-ID", format!("<{}>", sanitize(&image.content_id)));
        part
    }

    /// Wraps `children` in a multipart container with a fresh boundary.
    fn multipart(kind: MultipartKind, children: Vec<Self>) -> Self {
        let boundary = boundary();
        let mut headers = Headers::new();
        headers.add(
            "Content-Type",
            ContentType::multipart(kind, boundary.as_str()).to_string(),
        );

        let mut body = Vec::new();
        for child in children {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            child.write_to(&mut body);
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Self { headers, body }
    }

    fn write_to(self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.headers.to_string().as_bytes());
        out.extend_from_slice(CRLF);
        out.extend(self.body);
    }
}

/// Renders `message` as the bytes transmitted after `DATA`.
///
/// `date` becomes the `Date` header and `message_id_domain` the right-hand
/// side of the generated `Message-ID`. Bcc recipients are never written.
/// The output always ends with CRLF.
#[must_use]
pub fn build(message: &Message, date: DateTime<Utc>, message_id_domain: &str) -> Vec<u8> {
    let mut headers = Headers::new();
    headers.add("From", message.sender().formatted());
    headers.add("To", format_list(message.to()));
    if !message.cc().is_empty() {
        headers.add("Cc", format_list(message.cc()));
    }
    if let Some(reply_to) = message.reply_to() {
        headers.add("Reply-To", reply_to.formatted());
    }
    headers.add("Subject", encode_rfc2047(&sanitize(message.subject())));
    headers.add("Date", format_date(date));
    headers.add(
        "Message-ID",
        format!("<{}@{}>", message_id(), sanitize(message_id_domain)),
    );
    headers.add("MIME-Version", "1.0");
    if let Some(priority) = message.priority() {
        for (name, value) in priority.headers() {
            headers.add(name, value);
        }
    }

    let body = body_part(message);
    headers.extend(body.headers);

    let mut out = headers.to_string().into_bytes();
    out.extend_from_slice(CRLF);
    out.extend(body.body);
    if !out.ends_with(CRLF) {
        out.extend_from_slice(CRLF);
    }
    out
}

fn body_part(message: &Message) -> Part {
    let images = message.inline_images();
    let mut attachments: Vec<Part> = message.attachments().iter().map(Part::attachment).collect();

    let content = match message.body() {
        Body::Plain(text) => {
            attachments.extend(
                images
                    .iter()
                    .map(|image| Part::attachment(&image.to_attachment())),
            );
            Part::text(ContentType::text_plain(), text)
        }
        Body::Html(html) => html_part(html, images),
        Body::Alternative { plain, html } => Part::multipart(
            MultipartKind::Alternative,
            vec![
                Part::text(ContentType::text_plain(), plain),
                html_part(html, images),
            ],
        ),
    };

    if attachments.is_empty() {
        return content;
    }

    let mut children = Vec::with_capacity(attachments.len() + 1);
    children.push(content);
    children.extend(attachments);
    Part::multipart(MultipartKind::Mixed, children)
}

fn html_part(html: &str, images: &[InlineImage]) -> Part {
    let html = Part::text(ContentType::text_html(), html);
    if images.is_empty() {
        return html;
    }

    let mut children = Vec::with_capacity(images.len() + 1);
    children.push(html);
    children.extend(images.iter().map(Part::inline_image));
    Part::multipart(MultipartKind::Related, children)
}

fn format_list(contacts: &[Contact]) -> String {
    contacts
        .iter()
        .map(Contact::formatted)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn message_id() -> String {
    Uuid::new_v4().hyphenated().to_string().to_uppercase()
}

// `=_` never appears in quoted-printable or base64 output.
fn boundary() -> String {
    format!("=_sendwire_{}", Uuid::new_v4().simple())
}

fn quoted(value: &str) -> String {
    let escaped = sanitize(value).replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
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
    use crate::encoding::{decode_base64, decode_quoted_printable};
    use crate::message::Priority;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 9, 3, 7).unwrap()
    }

    fn base() -> crate::message::MessageBuilder {
        Message::builder()
            .from(Contact::with_name("Alice", "alice@example.com"))
            .to("bob@example.com")
            .subject("Hello")
    }

    fn render(message: &Message) -> String {
        String::from_utf8(build(message, date(), "mail.example.com")).unwrap()
    }

    fn header_block(rendered: &str) -> &str {
        rendered.split("\r\n\r\n").next().unwrap()
    }

    fn header_names(rendered: &str) -> Vec<&str> {
        header_block(rendered)
            .split("\r\n")
            .map(|line| line.split(':').next().unwrap())
            .collect()
    }

    fn boundary_of<'a>(rendered: &'a str, kind: &str) -> &'a str {
        let marker = format!("multipart/{kind}; boundary=\"");
        let start = rendered.find(&marker).unwrap() + marker.len();
        let len = rendered[start..].find('"').unwrap();
        &rendered[start..start + len]
    }

    /// Body of the last part inside `boundary`, up to the closing delimiter.
    fn last_part_body<'a>(rendered: &'a str, boundary: &str) -> &'a str {
        let last = rendered
            .split(&format!("--{boundary}\r\n"))
            .last()
            .unwrap();
        let (_, body) = last.split_once("\r\n\r\n").unwrap();
        body.split(&format!("--{boundary}--")).next().unwrap()
    }

    fn png(id: &str) -> InlineImage {
        InlineImage::new(id, format!("{id}.png"), "image/png", vec![0x89, b'P', b'N', b'G'])
    }

    #[test]
    fn test_header_order() {
        let message = base()
            .cc("carol@example.com")
            .reply_to("replies@example.com")
            .text("Hi")
            .build()
            .unwrap();

        assert_eq!(
            header_names(&render(&message)),
            vec![
                "From",
                "To",
                "Cc",
                "Reply-To",
                "Subject",
                "Date",
                "Message-ID",
                "MIME-Version",
                "Content-Type",
                "Content-Transfer-Encoding",
            ]
        );
    }

    #[test]
    fn test_minimal_headers_and_values() {
        let message = base()
            .to(Contact::with_name("Dan", "dan@example.com"))
            .text("Hi")
            .build()
            .unwrap();
        let rendered = render(&message);

        assert!(rendered.starts_with("From: \"Alice\" <alice@example.com>\r\n"));
        assert!(rendered.contains("\r\nTo: <bob@example.com>, \"Dan\" <dan@example.com>\r\n"));
        assert!(rendered.contains("\r\nDate: Mon, 05 Jan 2026 09:03:07 GMT\r\n"));
        assert!(rendered.contains("\r\nMIME-Version: 1.0\r\n"));
        assert!(!header_names(&rendered).contains(&"Cc"));
        assert!(!header_names(&rendered).contains(&"Reply-To"));
        assert!(rendered.ends_with("\r\n"));
    }

    #[test]
    fn test_message_id_shape() {
        let message = base().text("Hi").build().unwrap();
        let rendered = render(&message);

        let line = header_block(&rendered)
            .split("\r\n")
            .find(|line| line.starts_with("Message-ID: "))
            .unwrap();
        let id = line.trim_start_matches("Message-ID: <").trim_end_matches('>');
        let (uuid, domain) = id.split_once('@').unwrap();

        assert_eq!(domain, "mail.example.com");
        assert_eq!(uuid.len(), 36);
        assert_eq!(uuid, uuid.to_uppercase());
        assert!(Uuid::parse_str(uuid).is_ok());
    }

    #[test]
    fn test_message_id_domain_sanitized() {
        let message = base().text("Hi").build().unwrap();
        let rendered =
            String::from_utf8(build(&message, date(), "evil.com\r\nBcc: x@evil.com")).unwrap();

        assert!(rendered.contains("@evil.comBcc: x@evil.com>\r\n"));
        assert!(!rendered.contains("\r\nBcc:"));
    }

    #[test]
    fn test_bcc_never_rendered() {
        let message = base()
            .bcc("hidden@example.com")
            .text("Hi")
            .build()
            .unwrap();
        let rendered = render(&message);

        assert!(!rendered.contains("Bcc"));
        assert!(!rendered.contains("hidden@example.com"));
    }

    #[test]
    fn test_subject_injection_removed() {
        let message = Message::builder()
            .from("a@example.com")
            .to("b@example.com")
            .subject("Hi\r\nBcc: evil@x.com")
            .text("Body")
            .build()
            .unwrap();
        let rendered = render(&message);

        assert!(rendered.contains("\r\nSubject: HiBcc: evil@x.com\r\n"));
        assert!(!rendered.contains("\r\nBcc: evil@x.com"));
    }

    #[test]
    fn test_non_ascii_subject_encoded() {
        let message = base().subject("Grüße").text("Hi").build().unwrap();
        let rendered = render(&message);

        assert!(rendered.contains("\r\nSubject: =?UTF-8?B?R3LDvMOfZQ==?=\r\n"));
    }

    #[test]
    fn test_plain_body_quoted_printable() {
        let text = "Line one\nCafé = good\r\nthe end ";
        let message = base().text(text).build().unwrap();
        let rendered = render(&message);

        assert!(rendered.contains("Content-Type: text/plain; charset=\"utf-8\"\r\n"));
        assert!(rendered.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
        assert!(!rendered.contains("multipart"));

        let (_, body) = rendered.split_once("\r\n\r\n").unwrap();
        let decoded = decode_quoted_printable(body.strip_suffix("\r\n").unwrap()).unwrap();
        assert_eq!(decoded, "Line one\r\nCafé = good\r\nthe end ");
    }

    #[test]
    fn test_html_without_images_single_part() {
        let message = base().html("<p>Hi</p>").build().unwrap();
        let rendered = render(&message);

        assert!(rendered.contains("Content-Type: text/html; charset=\"utf-8\"\r\n"));
        assert!(!rendered.contains("multipart"));
    }

    #[test]
    fn test_html_with_images_related() {
        let message = base()
            .html("<img src=\"cid:logo\">")
            .inline_image(png("logo"))
            .build()
            .unwrap();
        let rendered = render(&message);

        let boundary = boundary_of(&rendered, "related");
        assert!(boundary.starts_with("=_sendwire_"));
        assert!(header_block(&rendered).contains("multipart/related"));
        assert_eq!(rendered.matches(&format!("--{boundary}\r\n")).count(), 2);
        assert!(rendered.ends_with(&format!("--{boundary}--\r\n")));
        assert!(rendered.contains("Content-Disposition: inline; filename=\"logo.png\"\r\n"));
        assert!(rendered.contains("Content-ID: <logo>\r\n"));
        assert!(rendered.contains("Content-Type: image/png; name=\"logo.png\"\r\n"));
        assert!(!rendered.contains("multipart/mixed"));
    }

    #[test]
    fn test_alternative_without_images() {
        let message = base()
            .alternative("plain", "<b>html</b>")
            .build()
            .unwrap();
        let rendered = render(&message);

        let boundary = boundary_of(&rendered, "alternative");
        let plain_at = rendered.find("text/plain").unwrap();
        let html_at = rendered.find("text/html").unwrap();
        assert!(plain_at < html_at);
        assert_eq!(rendered.matches(&format!("--{boundary}\r\n")).count(), 2);
        assert!(rendered.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn test_alternative_with_images_nests_related() {
        let message = base()
            .alternative("plain", "<img src=\"cid:a\">")
            .inline_image(png("a"))
            .inline_image(png("b"))
            .build()
            .unwrap();
        let rendered = render(&message);

        let outer = boundary_of(&rendered, "alternative");
        let inner = boundary_of(&rendered, "related");
        assert_ne!(outer, inner);

        assert!(header_block(&rendered).contains("multipart/alternative"));
        assert_eq!(rendered.matches(&format!("--{outer}\r\n")).count(), 2);
        assert_eq!(rendered.matches(&format!("--{inner}\r\n")).count(), 3);

        let related_at = rendered.find("multipart/related").unwrap();
        let plain_at = rendered.find("text/plain").unwrap();
        assert!(plain_at < related_at);
        let inner_end = rendered.find(&format!("--{inner}--\r\n")).unwrap();
        let outer_end = rendered.find(&format!("--{outer}--\r\n")).unwrap();
        assert!(inner_end < outer_end);
    }

    #[test]
    fn test_attachments_mixed() {
        let first = Attachment::new("report.pdf", "application/pdf", vec![1, 2, 3]);
        let second = Attachment::new("data.bin", "application/octet-stream", vec![0u8; 200]);
        let message = base()
            .text("See attached")
            .attach(first)
            .attach(second.clone())
            .build()
            .unwrap();
        let rendered = render(&message);

        let boundary = boundary_of(&rendered, "mixed");
        assert!(header_block(&rendered).contains("multipart/mixed"));
        assert_eq!(rendered.matches(&format!("--{boundary}\r\n")).count(), 3);
        assert!(rendered.ends_with(&format!("--{boundary}--\r\n")));
        assert!(rendered.contains("Content-Disposition: attachment; filename=\"report.pdf\"\r\n"));

        let encoded = last_part_body(&rendered, boundary);
        assert!(encoded.split("\r\n").all(|line| line.len() <= 76));
        assert_eq!(decode_base64(encoded).unwrap(), second.data);
    }

    #[test]
    fn test_plain_with_images_become_attachments() {
        let message = base()
            .text("No HTML here")
            .inline_image(png("logo"))
            .build()
            .unwrap();
        let rendered = render(&message);

        let boundary = boundary_of(&rendered, "mixed");
        assert_eq!(rendered.matches(&format!("--{boundary}\r\n")).count(), 2);
        assert!(rendered.contains("Content-Disposition: attachment; filename=\"logo.png\"\r\n"));
        assert!(!rendered.contains("Content-ID"));
        assert!(!rendered.contains("multipart/related"));
    }

    #[test]
    fn test_attachment_filename_sanitized() {
        let message = base()
            .text("x")
            .attach(Attachment::new("a\r\nX-Evil: 1.txt", "text/plain", b"x".to_vec()))
            .build()
            .unwrap();
        let rendered = render(&message);

        assert!(!rendered.contains("\r\nX-Evil"));
        assert!(rendered.contains("filename=\"aX-Evil: 1.txt\""));
    }

    #[test]
    fn test_unknown_mime_type_falls_back() {
        let message = base()
            .text("x")
            .attach(Attachment::new("f", "not a type\r\n", b"x".to_vec()))
            .build()
            .unwrap();
        let rendered = render(&message);

        assert!(rendered.contains("Content-Type: application/octet-stream; name=\"f\"\r\n"));
    }

    #[test]
    fn test_priority_headers() {
        let high = base().text("x").priority(Priority::High).build().unwrap();
        let rendered = render(&high);
        assert!(rendered.contains(
            "\r\nX-Priority: 1 (Highest)\r\nX-MSMail-Priority: High\r\nImportance: High\r\n"
        ));

        let low = base().text("x").priority(Priority::Low).build().unwrap();
        let rendered = render(&low);
        assert!(rendered.contains("\r\nX-Priority: 5 (Lowest)\r\nImportance: Low\r\n"));
        assert!(!rendered.contains("X-MSMail-Priority"));

        let normal = base().text("x").priority(Priority::Normal).build().unwrap();
        assert!(!render(&normal).contains("X-Priority"));
    }

    #[test]
    fn test_boundaries_are_fresh() {
        let message = base()
            .text("x")
            .attach(Attachment::new("f", "text/plain", b"x".to_vec()))
            .build()
            .unwrap();

        let first = render(&message);
        let second = render(&message);
        assert_ne!(boundary_of(&first, "mixed"), boundary_of(&second, "mixed"));
    }

    proptest! {
        #[test]
        fn rendered_headers_have_no_injected_lines(
            subject in "[a-zA-Z: \r\n]{0,40}",
            name in "[a-zA-Z: \"\r\n]{0,20}",
            address in "[a-z@.:\r\n]{1,30}",
        ) {
            let message = Message::builder()
                .from(Contact::with_name(name.clone(), address.clone()))
                .to(Contact::with_name(name.clone(), address.clone()))
                .cc(address.clone())
                .reply_to(address)
                .subject(subject)
                .text("body")
                .build()
                .unwrap();
            let rendered = render(&message);
            let names = header_names(&rendered);

            prop_assert_eq!(
                names,
                vec![
                    "From", "To", "Cc", "Reply-To", "Subject", "Date", "Message-ID",
                    "MIME-Version", "Content-Type", "Content-Transfer-Encoding",
                ]
            );
        }

        #[test]
        fn text_body_round_trips(text in "[ -~\t\n]{0,400}") {
            let message = base().text(text.clone()).build().unwrap();
            let rendered = render(&message);
            let (_, body) = rendered.split_once("\r\n\r\n").unwrap();
            let encoded = body.strip_suffix("\r\n").unwrap();

            prop_assert!(encoded.split("\r\n").all(|line| line.len() <= 76));
            let decoded = decode_quoted_printable(encoded).unwrap();
            prop_assert_eq!(decoded, text.replace('\n', "\r\n"));
        }

        #[test]
        fn attachment_count_matches_parts(count in 1usize..6) {
            let mut builder = base().text("x");
            for i in 0..count {
                let data = vec![b'a'; i * 50];
                builder = builder.attach(Attachment::new(format!("f{i}"), "text/plain", data));
            }
            let rendered = render(&builder.build().unwrap());
            let boundary = boundary_of(&rendered, "mixed");

            prop_assert_eq!(rendered.matches(&format!("--{boundary}\r\n")).count(), count + 1);
            let closing = format!("--{boundary}--\r\n");
            prop_assert!(rendered.ends_with(&closing));
        }

        #[test]
        fn attachment_bytes_round_trip(data in prop::collection::vec(any::<u8>(), 0..2048)) {
            let message = base()
                .text("x")
                .attach(Attachment::new("blob.bin", "application/octet-stream", data.clone()))
                .build()
                .unwrap();
            let rendered = render(&message);
            let encoded = last_part_body(&rendered, boundary_of(&rendered, "mixed"));

            prop_assert!(encoded.split("\r\n").all(|line| line.len() <= 76));
            prop_assert_eq!(decode_base64(encoded).unwrap(), data);
        }
    }
}
