//! # sendwire-mime
//!
//! Message model and MIME composition for outgoing email.
//!
//! ## Features
//!
//! - **Message model**: immutable [`Message`] values built with [`MessageBuilder`]
//! - **Header safety**: every header value has CR and LF stripped
//! - **Bodies**: plain, HTML, or both as `multipart/alternative`
//! - **Inline images and attachments**: `multipart/related` and `multipart/mixed`
//! - **Encoding**: Quoted-Printable bodies, Base64 binaries, RFC 2047 headers
//!
//! ## Quick Start
//!
//! ```
//! use chrono::Utc;
//! use sendwire_mime::{Attachment, Contact, Message};
//!
//! let message = Message::builder()
//!     .from(Contact::with_name("Alice", "alice@example.com"))
//!     .to("bob@example.com")
//!     .subject("Quarterly report")
//!     .alternative("See attached.", "<p>See attached.</p>")
//!     .attach(Attachment::new("report.csv", "text/csv", b"a,b\n1,2\n".to_vec()))
//!     .build()?;
//!
//! let bytes = message.render(Utc::now(), "example.com");
//! assert!(bytes.ends_with(b"\r\n"));
//! # Ok::<(), sendwire_mime::Error>(())
//! ```
//!
//! ### Encoding helpers
//!
//! ```
//! use sendwire_mime::encoding::{decode_quoted_printable, encode_quoted_printable};
//!
//! let encoded = encode_quoted_printable("Héllo");
//! assert_eq!(encoded, "H=C3=A9llo");
//! assert_eq!(decode_quoted_printable(&encoded)?, "Héllo");
//! # Ok::<(), sendwire_mime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod attachment;
mod contact;
mod content_type;
mod error;
mod header;
mod message;

pub mod builder;
pub mod encoding;

pub use attachment::{Attachment, InlineImage};
pub use builder::{TransferEncoding, build};
pub use contact::Contact;
pub use content_type::{ContentType, MultipartKind};
pub use error::{Error, Result};
pub use header::{Headers, sanitize};
pub use message::{Body, Message, MessageBuilder, Priority};
