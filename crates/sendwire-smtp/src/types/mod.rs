//! Core SMTP types.

mod capability;
mod reply;

pub use capability::{AuthMechanism, Capabilities};
pub use reply::{Reply, ReplyCode};
