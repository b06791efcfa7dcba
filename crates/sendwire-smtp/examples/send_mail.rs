#![allow(clippy::expect_used, clippy::doc_markdown, clippy::uninlined_format_args)]
//! Example: send one message through a submission server
//!
//! Settings come from the environment:
//!
//! - `SMTP_HOST` (required), `SMTP_PORT` (default 587)
//! - `SMTP_USER` / `SMTP_PASSWORD`: AUTH LOGIN over STARTTLS when set
//! - `MAIL_FROM`, `MAIL_TO` (required)
//!
//! ## Running
//!
//! ```bash
//! RUST_LOG=sendwire_smtp=debug SMTP_HOST=smtp.example.com \
//!     MAIL_FROM=me@example.com MAIL_TO=you@example.com \
//!     cargo run --package sendwire-smtp --example send_mail
//! ```

use std::env;

use sendwire_smtp::{AuthPolicy, Client, Config, Message};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sendwire_smtp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = env::var("SMTP_HOST").expect("SMTP_HOST is required");
    let port = env::var("SMTP_PORT").map_or(Ok(587), |port| port.parse())?;
    let from = env::var("MAIL_FROM").expect("MAIL_FROM is required");
    let to = env::var("MAIL_TO").expect("MAIL_TO is required");

    let auth = match (env::var("SMTP_USER"), env::var("SMTP_PASSWORD")) {
        (Ok(user), Ok(password)) => AuthPolicy::login(user, password),
        _ => AuthPolicy::None,
    };

    let config = Config::builder(host).port(port).auth(auth).build();

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject("sendwire test message")
        .alternative(
            "Hello from sendwire.\n\nThis message was sent by the send_mail example.",
            "<p>Hello from <b>sendwire</b>.</p>\
             <p>This message was sent by the send_mail example.</p>",
        )
        .build()?;

    let mut client = Client::new(config);
    client.send_one(&message).await?;

    println!("Message sent.");
    Ok(())
}
