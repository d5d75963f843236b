use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Mail,
    Discord,
    Pushover,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Mail, Channel::Discord, Channel::Pushover];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Mail => "mail",
            Channel::Discord => "discord",
            Channel::Pushover => "pushover",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often a recipient wants non-urgent mail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestFrequency {
    #[default]
    Immediate,
    Daily,
    Weekly,
}

impl std::fmt::Display for DigestFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DigestFrequency::Immediate => write!(f, "immediate"),
            DigestFrequency::Daily => write!(f, "daily"),
            DigestFrequency::Weekly => write!(f, "weekly"),
        }
    }
}

/// Notification classes used to select preference defaults and deferral rules.
///
/// Keys that don't match a known class are kept as `Unknown` so that stored
/// preferences for them still resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Account,
    StaffAlerts,
    Tickets,
    Meetings,
    Announcements,
    Brig,
    Community,
    Unknown(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Account => "account",
            Category::StaffAlerts => "staff_alerts",
            Category::Tickets => "tickets",
            Category::Meetings => "meetings",
            Category::Announcements => "announcements",
            Category::Brig => "brig",
            Category::Community => "community",
            Category::Unknown(key) => key,
        }
    }

    /// Privileged categories always deliver mail immediately.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Category::Account | Category::StaffAlerts)
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "account" => Category::Account,
            "staff_alerts" => Category::StaffAlerts,
            "tickets" => Category::Tickets,
            "meetings" => Category::Meetings,
            "announcements" => Category::Announcements,
            "brig" => Category::Brig,
            "community" => Category::Community,
            other => Category::Unknown(other.to_string()),
        })
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        match value.parse::<Category>() {
            Ok(category) => category,
            Err(never) => match never {},
        }
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Category::from(value.to_string())
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved per-category channel toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPreference {
    pub email: bool,
    pub pushover: bool,
    pub discord: bool,
}

impl ChannelPreference {
    pub const fn new(email: bool, pushover: bool, discord: bool) -> Self {
        Self {
            email,
            pushover,
            discord,
        }
    }

    pub fn allows(&self, channel: Channel) -> bool {
        match channel {
            Channel::Mail => self.email,
            Channel::Discord => self.discord,
            Channel::Pushover => self.pushover,
        }
    }
}

/// A preference entry as stored on the recipient record.
///
/// All keys are optional; a missing key falls back to the category default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPreference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushover: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<bool>,
}

impl StoredPreference {
    /// Overlay the stored keys on top of `defaults`.
    pub fn merge_over(&self, defaults: ChannelPreference) -> ChannelPreference {
        ChannelPreference {
            email: self.email.unwrap_or(defaults.email),
            pushover: self.pushover.unwrap_or(defaults.pushover),
            discord: self.discord.unwrap_or(defaults.discord),
        }
    }
}

impl From<ChannelPreference> for StoredPreference {
    fn from(value: ChannelPreference) -> Self {
        Self {
            email: Some(value.email),
            pushover: Some(value.pushover),
            discord: Some(value.discord),
        }
    }
}

/// Status of a linked external account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

/// An external account (Discord, Minecraft) linked to a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedAccount {
    /// Platform-side user id.
    pub external_id: String,
    pub username: Option<String>,
    pub status: AccountStatus,
}

impl LinkedAccount {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// A community member that can receive notifications.
///
/// Owned and mutated by the surrounding application; dispatch only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    /// Category key -> stored channel toggles.
    #[serde(default)]
    pub notification_preferences: HashMap<String, StoredPreference>,
    #[serde(default)]
    pub digest_frequency: DigestFrequency,
    /// Last time the recipient looked at their notifications.
    pub last_notification_read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub discord_accounts: Vec<LinkedAccount>,
    #[serde(default)]
    pub minecraft_accounts: Vec<LinkedAccount>,
    pub pushover_key: Option<String>,
    /// Pushover messages sent this month, as persisted on the record.
    #[serde(default)]
    pub pushover_monthly_count: u64,
}

impl Recipient {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: None,
            notification_preferences: HashMap::new(),
            digest_frequency: DigestFrequency::Immediate,
            last_notification_read_at: None,
            discord_accounts: Vec::new(),
            minecraft_accounts: Vec::new(),
            pushover_key: None,
            pushover_monthly_count: 0,
        }
    }

    pub fn stored_preference(&self, category: &Category) -> Option<&StoredPreference> {
        self.notification_preferences.get(category.as_str())
    }

    pub fn active_discord_accounts(&self) -> impl Iterator<Item = &LinkedAccount> {
        self.discord_accounts.iter().filter(|a| a.is_active())
    }

    pub fn has_active_discord_account(&self) -> bool {
        self.active_discord_accounts().next().is_some()
    }

    /// The Pushover user key, if one is set and non-blank.
    pub fn pushover_key(&self) -> Option<&str> {
        self.pushover_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// The mail address, if one is set and non-blank.
    pub fn email_address(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

/// Result of one channel delivery attempt for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    /// The notification doesn't render for this channel.
    SkippedNoCapability,
    /// The render method produced nothing.
    SkippedEmptyMessage,
    /// A token, key, address or linked account is missing.
    SkippedNoConfig,
    /// The recipient's monthly push quota is used up.
    SkippedLimitReached,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DeliveryOutcome::Failed(_))
    }

    pub fn is_skipped(&self) -> bool {
        !self.is_delivered() && !self.is_failed()
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryOutcome::Delivered => write!(f, "delivered"),
            DeliveryOutcome::SkippedNoCapability => write!(f, "skipped_no_capability"),
            DeliveryOutcome::SkippedEmptyMessage => write!(f, "skipped_empty_message"),
            DeliveryOutcome::SkippedNoConfig => write!(f, "skipped_no_config"),
            DeliveryOutcome::SkippedLimitReached => write!(f, "skipped_limit_reached"),
            DeliveryOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
