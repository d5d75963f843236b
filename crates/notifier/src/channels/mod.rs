//! Channel adapters.
//!
//! Each adapter delivers one rendered notification to one recipient over one
//! transport and reports a [`DeliveryOutcome`]:
//! - Mail (delegates to an external templated [`Mailer`])
//! - Discord bot direct messages
//! - Pushover push notifications
//!
//! Transport failures never escape an adapter; they become
//! `DeliveryOutcome::Failed`. Only rendering errors are returned as `Err`.

mod discord;
mod mail;
mod pushover;

pub use discord::{DiscordApi, DiscordBotClient, DiscordChannel};
pub use mail::{MailChannel, Mailer};
pub use pushover::PushoverChannel;

use async_trait::async_trait;

use beacon_common::error::Result;
use beacon_common::types::{Channel, DeliveryOutcome, Recipient};

use crate::notification::Notification;

/// A delivery transport for one [`Channel`].
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// The channel this adapter serves.
    fn channel(&self) -> Channel;

    /// Attempt delivery of `notification` to `recipient`.
    async fn deliver(
        &self,
        recipient: &Recipient,
        notification: &dyn Notification,
    ) -> Result<DeliveryOutcome>;
}

/// Truncate `text` to at most `limit` characters, marking the cut.
pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "…";
    let budget = limit.saturating_sub(suffix.chars().count());
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}
