//! Multi-channel notification dispatch.
//!
//! Decides per recipient and per notification category which channels (mail,
//! Discord, Pushover) fire now, which are held back for a digest, and delivers
//! through each channel independently so one failing transport never blocks
//! the rest.

pub mod channels;
pub mod digest;
pub mod dispatcher;
pub mod notification;
pub mod preferences;
pub mod usage;

pub use dispatcher::{DispatchReport, Dispatcher};
pub use notification::{
    DiscordMessage, DiscordRenderable, MailMessage, MailRenderable, Notification,
    PushoverMessage, PushoverRenderable,
};
