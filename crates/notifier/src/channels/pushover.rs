//! Pushover push notification channel.
//!
//! Sends a form POST (`token, user, message, title, url, priority`) to the
//! Pushover messages endpoint. A missing app token or user key is a no-op.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, warn};

use beacon_common::config::NotifierConfig;
use beacon_common::error::{NotifyError, Result};
use beacon_common::types::{Channel, DeliveryOutcome, Recipient};

use super::{NotificationChannel, truncate_chars};
use crate::notification::{Notification, PushoverMessage};
use crate::usage::UsageCounter;

/// Pushover message body limit (characters).
const PUSHOVER_MESSAGE_LIMIT: usize = 1024;

/// Pushover title limit (characters).
const PUSHOVER_TITLE_LIMIT: usize = 250;

/// Normal priority.
const DEFAULT_PRIORITY: i8 = 0;

pub struct PushoverChannel {
    client: Client,
    api_url: String,
    token: Option<String>,
    app_name: String,
    monthly_limit: u64,
    usage: Arc<dyn UsageCounter>,
}

impl PushoverChannel {
    pub fn from_config(config: &NotifierConfig, usage: Arc<dyn UsageCounter>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_url: config.pushover_api_url.clone(),
            token: config.pushover_token().map(str::to_string),
            app_name: config.app_name.clone(),
            monthly_limit: config.pushover_monthly_limit,
            usage,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    /// Form fields for one push. `url` is left out when absent.
    fn build_form(
        &self,
        token: &str,
        user_key: &str,
        message: &PushoverMessage,
    ) -> Vec<(&'static str, String)> {
        let title = message
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(self.app_name.as_str());

        let mut form = vec![
            ("token", token.to_string()),
            ("user", user_key.to_string()),
            ("message", truncate_chars(&message.message, PUSHOVER_MESSAGE_LIMIT)),
            ("title", truncate_chars(title, PUSHOVER_TITLE_LIMIT)),
        ];
        if let Some(url) = message.url.as_deref().filter(|u| !u.is_empty()) {
            form.push(("url", url.to_string()));
        }
        form.push((
            "priority",
            message.priority.unwrap_or(DEFAULT_PRIORITY).to_string(),
        ));
        form
    }

    async fn post(&self, form: &[(&'static str, String)]) -> Result<()> {
        let response = self.client.post(&self.api_url).form(form).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Api {
            service: "pushover".to_string(),
            status: status.as_u16(),
            body,
        })
    }

    /// Claim one slot of the monthly allowance.
    async fn reserve(&self, recipient: &Recipient, now: DateTime<Utc>) -> Reservation {
        if recipient.pushover_monthly_count >= self.monthly_limit {
            return Reservation::LimitReached;
        }
        match self
            .usage
            .try_reserve(recipient.id, now, self.monthly_limit)
            .await
        {
            Ok(Some(count)) => Reservation::Counted(count),
            Ok(None) => Reservation::LimitReached,
            Err(e) => {
                warn!(recipient_id = %recipient.id, error = %e, "Failed to reserve push usage");
                Reservation::Uncounted
            }
        }
    }
}

/// Result of claiming a slot before a push goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reservation {
    Counted(u64),
    /// Counter unreachable; the send goes ahead without being counted.
    Uncounted,
    LimitReached,
}

#[async_trait]
impl NotificationChannel for PushoverChannel {
    fn channel(&self) -> Channel {
        Channel::Pushover
    }

    async fn deliver(
        &self,
        recipient: &Recipient,
        notification: &dyn Notification,
    ) -> Result<DeliveryOutcome> {
        let Some(renderable) = notification.as_pushover() else {
            return Ok(DeliveryOutcome::SkippedNoCapability);
        };

        let (Some(token), Some(user_key)) = (self.token.as_deref(), recipient.pushover_key())
        else {
            debug!(recipient_id = %recipient.id, "Pushover token or user key missing, skipping");
            return Ok(DeliveryOutcome::SkippedNoConfig);
        };

        let message = match renderable.to_pushover(recipient)? {
            Some(message) if !message.is_empty() => message,
            _ => return Ok(DeliveryOutcome::SkippedEmptyMessage),
        };

        let now = Utc::now();
        let reservation = self.reserve(recipient, now).await;
        if reservation == Reservation::LimitReached {
            debug!(
                recipient_id = %recipient.id,
                limit = self.monthly_limit,
                "Pushover monthly limit reached, skipping"
            );
            return Ok(DeliveryOutcome::SkippedLimitReached);
        }

        let form = self.build_form(token, user_key, &message);
        if let Err(e) = self.post(&form).await {
            warn!(
                recipient_id = %recipient.id,
                notification = notification.kind(),
                error = %e,
                "Pushover delivery failed"
            );
            if let Reservation::Counted(_) = reservation {
                if let Err(e) = self.usage.release(recipient.id, now).await {
                    warn!(recipient_id = %recipient.id, error = %e, "Failed to release push usage");
                }
            }
            return Ok(DeliveryOutcome::Failed(e.to_string()));
        }

        debug!(recipient_id = %recipient.id, reservation = ?reservation, "Pushover sent");
        Ok(DeliveryOutcome::Delivered)
    }
}
