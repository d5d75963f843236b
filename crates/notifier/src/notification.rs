//! Notification payloads and per-channel rendering capabilities.
//!
//! A notification opts into a channel by returning a capability from the
//! matching accessor on [`Notification`]. Channels whose capability is absent
//! skip the notification without treating it as a failure.

use serde::{Deserialize, Serialize};

use beacon_common::error::Result;
use beacon_common::types::Recipient;

/// Templated mail handed to the [`Mailer`](crate::channels::Mailer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub subject: String,
    /// Template identifier understood by the mail collaborator.
    pub template: String,
    /// Variables passed to the template.
    pub data: serde_json::Value,
}

impl MailMessage {
    pub fn new(subject: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            template: template.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Direct message sent to each of the recipient's linked Discord accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<serde_json::Value>,
}

impl DiscordMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            embeds: Vec::new(),
        }
    }

    pub fn with_embed(mut self, embed: serde_json::Value) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.embeds.is_empty()
    }
}

/// Push message for the Pushover gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushoverMessage {
    pub message: String,
    /// Defaults to the application name when absent.
    pub title: Option<String>,
    pub url: Option<String>,
    /// Pushover priority, -2..=2. Defaults to normal (0).
    pub priority: Option<i8>,
}

impl PushoverMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            title: None,
            url: None,
            priority: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_priority(mut self, priority: i8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.message.trim().is_empty()
    }
}

/// Renders a notification as mail. `Ok(None)` means "nothing to send".
pub trait MailRenderable: Send + Sync {
    fn to_mail(&self, recipient: &Recipient) -> Result<Option<MailMessage>>;
}

/// Renders a notification as a Discord direct message.
pub trait DiscordRenderable: Send + Sync {
    fn to_discord(&self, recipient: &Recipient) -> Result<Option<DiscordMessage>>;
}

/// Renders a notification as a Pushover push.
pub trait PushoverRenderable: Send + Sync {
    fn to_pushover(&self, recipient: &Recipient) -> Result<Option<PushoverMessage>>;
}

/// A notification that can be dispatched to one or more channels.
pub trait Notification: Send + Sync {
    /// Short type name used in logs (e.g. `"ticket_assigned"`).
    fn kind(&self) -> &str;

    fn as_mail(&self) -> Option<&dyn MailRenderable> {
        None
    }

    fn as_discord(&self) -> Option<&dyn DiscordRenderable> {
        None
    }

    fn as_pushover(&self) -> Option<&dyn PushoverRenderable> {
        None
    }
}
