//! Notification dispatch.
//!
//! For each recipient:
//! 1. Resolve per-category channel preferences (via `PreferenceResolver`)
//! 2. Drop channels the recipient can't receive on (no linked account, no key)
//! 3. Hold mail back for the digest when `DigestPolicy` says so
//! 4. Deliver through every remaining channel concurrently and join
//!
//! Delivery failures are recorded in the returned [`DispatchReport`] and never
//! abort other channels or other recipients.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use uuid::Uuid;

use beacon_common::config::NotifierConfig;
use beacon_common::error::Result;
use beacon_common::types::{Category, Channel, DeliveryOutcome, Recipient};

use crate::channels::{DiscordChannel, MailChannel, Mailer, NotificationChannel, PushoverChannel};
use crate::digest::DigestPolicy;
use crate::notification::Notification;
use crate::preferences::PreferenceResolver;
use crate::usage::UsageCounter;

/// Default number of recipients dispatched concurrently.
const DEFAULT_CONCURRENCY: usize = 8;

/// What happened for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub recipient_id: Uuid,
    pub category: Category,
    /// One entry per channel that was attempted.
    pub outcomes: BTreeMap<Channel, DeliveryOutcome>,
    /// Channels held back for the digest.
    pub deferred: Vec<Channel>,
}

impl DispatchReport {
    pub fn outcome(&self, channel: Channel) -> Option<&DeliveryOutcome> {
        self.outcomes.get(&channel)
    }

    pub fn delivered(&self) -> impl Iterator<Item = Channel> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_delivered())
            .map(|(c, _)| *c)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_failed()).count()
    }
}

/// Channel plan for one recipient before delivery.
struct ChannelPlan {
    enabled: BTreeSet<Channel>,
    deferred: Vec<Channel>,
}

/// Fan-out entry point for notifications.
pub struct Dispatcher {
    resolver: PreferenceResolver,
    digest: DigestPolicy,
    channels: HashMap<Channel, Arc<dyn NotificationChannel>>,
    concurrency: usize,
}

impl Dispatcher {
    /// An empty dispatcher; register adapters with [`Dispatcher::with_channel`].
    pub fn new(digest: DigestPolicy) -> Self {
        Self {
            resolver: PreferenceResolver::new(),
            digest,
            channels: HashMap::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Build a dispatcher with the mail, Discord and Pushover adapters.
    pub fn from_config(
        config: &NotifierConfig,
        mailer: Arc<dyn Mailer>,
        usage: Arc<dyn UsageCounter>,
    ) -> Result<Self> {
        let discord = DiscordChannel::from_config(config)?;
        let pushover = PushoverChannel::from_config(config, usage)?;

        if !discord.is_configured() {
            tracing::info!("Discord bot token not set, Discord notifications disabled");
        }
        if !pushover.is_configured() {
            tracing::info!("Pushover token not set, push notifications disabled");
        }

        Ok(Self::new(DigestPolicy::from_config(config))
            .with_channel(Arc::new(MailChannel::new(mailer)))
            .with_channel(Arc::new(discord))
            .with_channel(Arc::new(pushover))
            .with_concurrency(config.dispatch_concurrency))
    }

    /// Register (or replace) the adapter for its channel.
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.insert(channel.channel(), channel);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Channels that [`Dispatcher::send`] would attempt right now.
    ///
    /// Pure: no delivery, no state change.
    pub fn determine_channels(
        &self,
        recipient: &Recipient,
        category: &Category,
    ) -> BTreeSet<Channel> {
        self.determine_channels_at(recipient, category, Utc::now())
    }

    /// [`Dispatcher::determine_channels`] evaluated at a fixed instant.
    pub fn determine_channels_at(
        &self,
        recipient: &Recipient,
        category: &Category,
        now: DateTime<Utc>,
    ) -> BTreeSet<Channel> {
        self.plan(recipient, category, now).enabled
    }

    fn plan(&self, recipient: &Recipient, category: &Category, now: DateTime<Utc>) -> ChannelPlan {
        let preference = self.resolver.resolve(recipient, category);

        let mut enabled = BTreeSet::new();
        let mut deferred = Vec::new();

        for channel in Channel::ALL {
            if !preference.allows(channel) || !Self::is_eligible(recipient, channel) {
                continue;
            }
            if channel == Channel::Mail && self.digest.should_defer_mail(recipient, category, now)
            {
                deferred.push(channel);
                continue;
            }
            enabled.insert(channel);
        }

        ChannelPlan { enabled, deferred }
    }

    /// Whether the recipient has what `channel` needs to reach them.
    fn is_eligible(recipient: &Recipient, channel: Channel) -> bool {
        match channel {
            Channel::Mail => true,
            Channel::Discord => recipient.has_active_discord_account(),
            Channel::Pushover => recipient.pushover_key().is_some(),
        }
    }

    /// Deliver `notification` to one recipient on every enabled channel.
    ///
    /// Only rendering errors are returned as `Err`; every channel is attempted
    /// before that happens.
    pub async fn send(
        &self,
        recipient: &Recipient,
        notification: &dyn Notification,
        category: &Category,
    ) -> Result<DispatchReport> {
        let plan = self.plan(recipient, category, Utc::now());

        if !plan.deferred.is_empty() {
            tracing::debug!(
                recipient_id = %recipient.id,
                category = %category,
                digest_frequency = %recipient.digest_frequency,
                "Mail deferred to digest"
            );
        }

        let deliveries = plan.enabled.iter().map(|&channel| async move {
            let result = match self.channels.get(&channel) {
                Some(adapter) => adapter.deliver(recipient, notification).await,
                None => {
                    tracing::debug!(channel = %channel, "No adapter registered, skipping");
                    Ok(DeliveryOutcome::SkippedNoConfig)
                }
            };
            (channel, result)
        });
        let results = join_all(deliveries).await;

        let mut outcomes = BTreeMap::new();
        let mut render_error = None;
        for (channel, result) in results {
            match result {
                Ok(outcome) => {
                    outcomes.insert(channel, outcome);
                }
                Err(e) => {
                    tracing::error!(
                        recipient_id = %recipient.id,
                        channel = %channel,
                        notification = notification.kind(),
                        error = %e,
                        "Notification rendering failed"
                    );
                    render_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = render_error {
            return Err(e);
        }

        let report = DispatchReport {
            recipient_id: recipient.id,
            category: category.clone(),
            outcomes,
            deferred: plan.deferred,
        };

        tracing::info!(
            recipient_id = %recipient.id,
            category = %category,
            notification = notification.kind(),
            delivered = report.delivered().count(),
            failed = report.failed_count(),
            deferred = report.deferred.len(),
            "Notification dispatched"
        );

        Ok(report)
    }

    /// [`Dispatcher::send`] for each recipient independently.
    ///
    /// Returns one result per recipient, in input order. A failing recipient
    /// never stops the others.
    pub async fn send_to_many(
        &self,
        recipients: &[Recipient],
        notification: &dyn Notification,
        category: &Category,
    ) -> Vec<Result<DispatchReport>> {
        let results: Vec<Result<DispatchReport>> = stream::iter(recipients)
            .map(|recipient| self.send(recipient, notification, category))
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(
                category = %category,
                notification = notification.kind(),
                recipients = recipients.len(),
                failed,
                "Some recipients could not be notified"
            );
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_common::types::{AccountStatus, ChannelPreference, DigestFrequency, LinkedAccount};
    use chrono::Duration;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(DigestPolicy::default())
    }

    fn recipient() -> Recipient {
        let mut r = Recipient::new(Uuid::new_v4(), "planner");
        r.email = Some("planner@example.com".to_string());
        r
    }

    fn active_discord() -> LinkedAccount {
        LinkedAccount {
            external_id: "80351110224678912".to_string(),
            username: Some("planner".to_string()),
            status: AccountStatus::Active,
        }
    }

    #[test]
    fn test_defaults_for_tickets() {
        let channels = dispatcher().determine_channels(&recipient(), &Category::Tickets);
        assert_eq!(channels, BTreeSet::from([Channel::Mail]));
    }

    #[test]
    fn test_discord_requires_preference_and_active_account() {
        let d = dispatcher();
        let mut r = recipient();
        r.notification_preferences.insert(
            "tickets".to_string(),
            ChannelPreference::new(true, false, true).into(),
        );

        // preference on, no account
        assert!(!d.determine_channels(&r, &Category::Tickets).contains(&Channel::Discord));

        r.discord_accounts.push(active_discord());
        assert!(d.determine_channels(&r, &Category::Tickets).contains(&Channel::Discord));

        // account on, preference off
        r.notification_preferences.insert(
            "tickets".to_string(),
            ChannelPreference::new(true, false, false).into(),
        );
        assert!(!d.determine_channels(&r, &Category::Tickets).contains(&Channel::Discord));
    }

    #[test]
    fn test_pushover_requires_key() {
        let d = dispatcher();
        let mut r = recipient();
        // staff_alerts defaults pushover on
        assert!(!d.determine_channels(&r, &Category::StaffAlerts).contains(&Channel::Pushover));
        r.pushover_key = Some("uQiRzpo4DXghDmr9QzzfQu27cmVRsG".to_string());
        assert!(d.determine_channels(&r, &Category::StaffAlerts).contains(&Channel::Pushover));
    }

    #[test]
    fn test_plan_records_deferred_mail() {
        let d = dispatcher();
        let now = Utc::now();
        let mut r = recipient();
        r.digest_frequency = DigestFrequency::Weekly;
        r.last_notification_read_at = Some(now - Duration::days(10));

        let plan = d.plan(&r, &Category::Announcements, now);
        assert!(plan.enabled.is_empty());
        assert_eq!(plan.deferred, vec![Channel::Mail]);
    }

    #[test]
    fn test_disabled_mail_is_not_reported_as_deferred() {
        let d = dispatcher();
        let mut r = recipient();
        r.digest_frequency = DigestFrequency::Daily;
        // community defaults email off
        let plan = d.plan(&r, &Category::Community, Utc::now());
        assert!(plan.deferred.is_empty());
    }

    #[test]
    fn test_concurrency_is_at_least_one() {
        assert_eq!(dispatcher().with_concurrency(0).concurrency, 1);
    }

    #[tokio::test]
    async fn test_send_without_adapters_skips() {
        struct Plain;
        impl Notification for Plain {
            fn kind(&self) -> &str {
                "plain"
            }
        }

        let report = dispatcher()
            .send(&recipient(), &Plain, &Category::Tickets)
            .await
            .unwrap();
        assert_eq!(
            report.outcome(Channel::Mail),
            Some(&DeliveryOutcome::SkippedNoConfig)
        );
        assert_eq!(report.delivered().count(), 0);
    }
}
