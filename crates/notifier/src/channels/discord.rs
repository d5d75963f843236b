//! Discord bot direct-message channel.
//!
//! A DM is two REST calls: open (or fetch) the DM channel with the user, then
//! post the message into it. 429 responses are retried honoring the
//! `Retry-After` / `X-RateLimit-Reset-After` headers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use beacon_common::config::NotifierConfig;
use beacon_common::error::{NotifyError, Result};
use beacon_common::types::{Channel, DeliveryOutcome, Recipient};

use super::{NotificationChannel, truncate_chars};
use crate::notification::{DiscordMessage, Notification};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Discord message content limit (characters).
const DISCORD_CONTENT_LIMIT: usize = 2000;

/// Sends a direct message to one Discord user.
#[async_trait]
pub trait DiscordApi: Send + Sync {
    async fn send_direct_message(
        &self,
        discord_user_id: &str,
        message: &DiscordMessage,
    ) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct DmChannel {
    id: String,
}

/// REST client authenticated as a bot.
pub struct DiscordBotClient {
    client: Client,
    api_url: String,
    bot_token: String,
}

impl DiscordBotClient {
    pub fn new(
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    fn build_payload(message: &DiscordMessage) -> serde_json::Value {
        let mut payload = json!({
            "content": truncate_chars(&message.content, DISCORD_CONTENT_LIMIT),
        });
        if !message.embeds.is_empty() {
            payload["embeds"] = json!(message.embeds);
        }
        payload
    }

    async fn open_dm_channel(&self, discord_user_id: &str) -> Result<String> {
        let url = format!("{}/users/@me/channels", self.api_url);
        let response = self
            .post_with_retry(&url, &json!({ "recipient_id": discord_user_id }))
            .await?;
        let channel: DmChannel = response.json().await?;
        Ok(channel.id)
    }

    /// POST `payload`, retrying on 429. Non-success statuses become `NotifyError::Api`.
    async fn post_with_retry(&self, url: &str, payload: &serde_json::Value) -> Result<Response> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(url)
                .header("Authorization", format!("Bot {}", self.bot_token))
                .json(payload)
                .send()
                .await?;

            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status.as_u16() == 429 {
                let retry_after = Self::parse_retry_after(response.headers());

                if attempts > MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        max_retries = MAX_RATE_LIMIT_RETRIES,
                        retry_after = ?retry_after,
                        "Discord rate limit: max retries exceeded"
                    );
                    return Err(NotifyError::Api {
                        service: "discord".to_string(),
                        status: 429,
                        body: format!("rate limited after {} attempts", attempts),
                    });
                }

                let wait = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    wait_ms = wait.as_millis() as u64,
                    attempt = attempts,
                    "Discord rate limited (429), waiting before retry"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                service: "discord".to_string(),
                status: status.as_u16(),
                body,
            });
        }
    }

    /// Wait requested by a 429, in (possibly fractional) seconds.
    fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
        ["Retry-After", "X-RateLimit-Reset-After"]
            .iter()
            .filter_map(|name| headers.get(*name))
            .filter_map(|value| value.to_str().ok()?.parse::<f64>().ok())
            .find_map(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

#[async_trait]
impl DiscordApi for DiscordBotClient {
    async fn send_direct_message(
        &self,
        discord_user_id: &str,
        message: &DiscordMessage,
    ) -> Result<()> {
        let channel_id = self.open_dm_channel(discord_user_id).await?;
        let url = format!("{}/channels/{}/messages", self.api_url, channel_id);
        self.post_with_retry(&url, &Self::build_payload(message)).await?;
        Ok(())
    }
}

/// Discord channel adapter. Messages every active linked account independently.
pub struct DiscordChannel {
    api: Option<Arc<dyn DiscordApi>>,
}

impl DiscordChannel {
    pub fn new(api: Arc<dyn DiscordApi>) -> Self {
        Self { api: Some(api) }
    }

    /// Build from configuration; without a bot token the channel is a no-op.
    pub fn from_config(config: &NotifierConfig) -> Result<Self> {
        let api = match config.discord_bot_token() {
            Some(token) => {
                let client = DiscordBotClient::new(
                    config.discord_api_url.clone(),
                    token,
                    Duration::from_secs(config.http_timeout_secs),
                )?;
                Some(Arc::new(client) as Arc<dyn DiscordApi>)
            }
            None => None,
        };
        Ok(Self { api })
    }

    pub fn is_configured(&self) -> bool {
        self.api.is_some()
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn channel(&self) -> Channel {
        Channel::Discord
    }

    async fn deliver(
        &self,
        recipient: &Recipient,
        notification: &dyn Notification,
    ) -> Result<DeliveryOutcome> {
        let Some(renderable) = notification.as_discord() else {
            return Ok(DeliveryOutcome::SkippedNoCapability);
        };

        let accounts: Vec<_> = recipient.active_discord_accounts().collect();
        if accounts.is_empty() {
            debug!(recipient_id = %recipient.id, "No active Discord account, skipping");
            return Ok(DeliveryOutcome::SkippedNoConfig);
        }

        let Some(api) = &self.api else {
            debug!("Discord bot token not configured, skipping");
            return Ok(DeliveryOutcome::SkippedNoConfig);
        };

        let message = match renderable.to_discord(recipient)? {
            Some(message) if !message.is_empty() => message,
            _ => return Ok(DeliveryOutcome::SkippedEmptyMessage),
        };

        let attempts = accounts.iter().map(|account| {
            let api = api.clone();
            let message = &message;
            async move {
                let result = api.send_direct_message(&account.external_id, message).await;
                if let Err(e) = &result {
                    warn!(
                        recipient_id = %recipient.id,
                        discord_user_id = %account.external_id,
                        error = %e,
                        "Failed to send Discord direct message"
                    );
                }
                result
            }
        });
        let results = join_all(attempts).await;

        let total = results.len();
        let delivered = results.iter().filter(|r| r.is_ok()).count();

        if delivered > 0 {
            debug!(
                recipient_id = %recipient.id,
                notification = notification.kind(),
                delivered,
                total,
                "Discord direct messages sent"
            );
            return Ok(DeliveryOutcome::Delivered);
        }

        let reason = results
            .into_iter()
            .filter_map(|r| r.err())
            .last()
            .map(|e| e.to_string())
            .unwrap_or_default();
        Ok(DeliveryOutcome::Failed(format!(
            "all {} direct messages failed: {}",
            total, reason
        )))
    }
}
