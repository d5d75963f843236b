use serde::Deserialize;

const DEFAULT_PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";
const DEFAULT_DISCORD_API_URL: &str = "https://discord.com/api/v10";

/// Notification dispatch configuration loaded from environment variables.
///
/// Passed explicitly into each channel adapter so tests can use fake tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Application name, used as the default push title
    pub app_name: String,

    /// Public application URL
    pub app_url: Option<String>,

    /// Pushover application token
    pub pushover_token: Option<String>,

    /// Pushover messages endpoint
    pub pushover_api_url: String,

    /// Maximum Pushover messages per recipient per calendar month (default: 10000)
    pub pushover_monthly_limit: u64,

    /// Discord bot token used for direct messages
    pub discord_bot_token: Option<String>,

    /// Discord REST API base URL
    pub discord_api_url: String,

    /// Hours without a visit before daily-digest mail is deferred (default: 24)
    pub digest_daily_threshold_hours: u64,

    /// Hours without a visit before weekly-digest mail is deferred (default: 168)
    pub digest_weekly_threshold_hours: u64,

    /// Recipients dispatched concurrently by `send_to_many` (default: 8)
    pub dispatch_concurrency: usize,

    /// Outbound HTTP request timeout in seconds (default: 10)
    pub http_timeout_secs: u64,

    /// Redis connection string for the shared push usage counter
    pub redis_url: Option<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            app_name: "Beacon".to_string(),
            app_url: None,
            pushover_token: None,
            pushover_api_url: DEFAULT_PUSHOVER_API_URL.to_string(),
            pushover_monthly_limit: 10_000,
            discord_bot_token: None,
            discord_api_url: DEFAULT_DISCORD_API_URL.to_string(),
            digest_daily_threshold_hours: 24,
            digest_weekly_threshold_hours: 168,
            dispatch_concurrency: 8,
            http_timeout_secs: 10,
            redis_url: None,
        }
    }
}

impl NotifierConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Ok(Self {
            app_name: std::env::var("APP_NAME").unwrap_or(defaults.app_name),
            app_url: non_empty_var("APP_URL"),
            pushover_token: non_empty_var("PUSHOVER_TOKEN"),
            pushover_api_url: std::env::var("PUSHOVER_API_URL")
                .unwrap_or(defaults.pushover_api_url),
            pushover_monthly_limit: std::env::var("PUSHOVER_MONTHLY_LIMIT")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PUSHOVER_MONTHLY_LIMIT must be a valid u64"))?,
            discord_bot_token: non_empty_var("DISCORD_BOT_TOKEN"),
            discord_api_url: std::env::var("DISCORD_API_URL").unwrap_or(defaults.discord_api_url),
            digest_daily_threshold_hours: std::env::var("DIGEST_DAILY_THRESHOLD_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| {
                    anyhow::anyhow!("DIGEST_DAILY_THRESHOLD_HOURS must be a valid u64")
                })?,
            digest_weekly_threshold_hours: std::env::var("DIGEST_WEEKLY_THRESHOLD_HOURS")
                .unwrap_or_else(|_| "168".to_string())
                .parse()
                .map_err(|_| {
                    anyhow::anyhow!("DIGEST_WEEKLY_THRESHOLD_HOURS must be a valid u64")
                })?,
            dispatch_concurrency: std::env::var("DISPATCH_CONCURRENCY")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DISPATCH_CONCURRENCY must be a valid usize"))?,
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a valid u64"))?,
            redis_url: non_empty_var("REDIS_URL"),
        })
    }

    /// Pushover token, if configured and non-blank.
    pub fn pushover_token(&self) -> Option<&str> {
        self.pushover_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Discord bot token, if configured and non-blank.
    pub fn discord_bot_token(&self) -> Option<&str> {
        self.discord_bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NotifierConfig::default();
        assert_eq!(config.app_name, "Beacon");
        assert_eq!(config.digest_daily_threshold_hours, 24);
        assert_eq!(config.digest_weekly_threshold_hours, 168);
        assert_eq!(config.pushover_monthly_limit, 10_000);
        assert!(config.pushover_token().is_none());
    }

    #[test]
    fn test_blank_tokens_are_absent() {
        let config = NotifierConfig {
            pushover_token: Some("  ".to_string()),
            discord_bot_token: Some(String::new()),
            ..Default::default()
        };
        assert!(config.pushover_token().is_none());
        assert!(config.discord_bot_token().is_none());
    }
}
