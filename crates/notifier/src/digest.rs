//! Digest deferral policy for the mail channel.
//!
//! Recipients on a daily or weekly digest still get mail immediately while they
//! are actively visiting. Once their last visit is older than the digest
//! window, mail is held back for the digest job.

use chrono::{DateTime, Duration, Utc};

use beacon_common::config::NotifierConfig;
use beacon_common::types::{Category, DigestFrequency, Recipient};

/// Default daily window (hours).
const DEFAULT_DAILY_THRESHOLD_HOURS: i64 = 24;

/// Default weekly window (hours).
const DEFAULT_WEEKLY_THRESHOLD_HOURS: i64 = 24 * 7;

/// Decides whether mail is held back for a digest.
#[derive(Debug, Clone, Copy)]
pub struct DigestPolicy {
    daily_threshold: Duration,
    weekly_threshold: Duration,
}

impl DigestPolicy {
    pub fn new(daily_threshold: Duration, weekly_threshold: Duration) -> Self {
        Self {
            daily_threshold,
            weekly_threshold,
        }
    }

    pub fn from_config(config: &NotifierConfig) -> Self {
        Self::new(
            hours(config.digest_daily_threshold_hours),
            hours(config.digest_weekly_threshold_hours),
        )
    }

    /// Returns `true` when mail should be suppressed now and left to the digest.
    ///
    /// A recipient with no recorded visit counts as not having visited.
    pub fn should_defer_mail(
        &self,
        recipient: &Recipient,
        category: &Category,
        now: DateTime<Utc>,
    ) -> bool {
        if category.is_privileged() {
            return false;
        }

        let threshold = match recipient.digest_frequency {
            DigestFrequency::Immediate => return false,
            DigestFrequency::Daily => self.daily_threshold,
            DigestFrequency::Weekly => self.weekly_threshold,
        };

        match recipient.last_notification_read_at {
            Some(last_read) => now.signed_duration_since(last_read) >= threshold,
            None => true,
        }
    }
}

impl Default for DigestPolicy {
    fn default() -> Self {
        Self::new(
            Duration::hours(DEFAULT_DAILY_THRESHOLD_HOURS),
            Duration::hours(DEFAULT_WEEKLY_THRESHOLD_HOURS),
        )
    }
}

fn hours(hours: u64) -> Duration {
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn make_recipient(frequency: DigestFrequency, last_read: Option<DateTime<Utc>>) -> Recipient {
        let mut r = Recipient::new(Uuid::new_v4(), "digest");
        r.digest_frequency = frequency;
        r.last_notification_read_at = last_read;
        r
    }

    #[test]
    fn test_immediate_never_defers() {
        let policy = DigestPolicy::default();
        let now = Utc::now();
        let r = make_recipient(DigestFrequency::Immediate, Some(now - Duration::days(30)));
        assert!(!policy.should_defer_mail(&r, &Category::Tickets, now));
        let r = make_recipient(DigestFrequency::Immediate, None);
        assert!(!policy.should_defer_mail(&r, &Category::Tickets, now));
    }

    #[test]
    fn test_daily_defers_after_two_days() {
        let policy = DigestPolicy::default();
        let now = Utc::now();
        let r = make_recipient(DigestFrequency::Daily, Some(now - Duration::days(2)));
        assert!(policy.should_defer_mail(&r, &Category::Tickets, now));
    }

    #[test]
    fn test_daily_recent_visit_sends_now() {
        let policy = DigestPolicy::default();
        let now = Utc::now();
        let r = make_recipient(DigestFrequency::Daily, Some(now - Duration::hours(3)));
        assert!(!policy.should_defer_mail(&r, &Category::Tickets, now));
    }

    #[test]
    fn test_threshold_boundary_defers() {
        let policy = DigestPolicy::default();
        let now = Utc::now();
        let r = make_recipient(DigestFrequency::Daily, Some(now - Duration::hours(24)));
        assert!(policy.should_defer_mail(&r, &Category::Meetings, now));
    }

    #[test]
    fn test_weekly_window() {
        let policy = DigestPolicy::default();
        let now = Utc::now();
        let r = make_recipient(DigestFrequency::Weekly, Some(now - Duration::days(3)));
        assert!(!policy.should_defer_mail(&r, &Category::Tickets, now));
        let r = make_recipient(DigestFrequency::Weekly, Some(now - Duration::days(8)));
        assert!(policy.should_defer_mail(&r, &Category::Tickets, now));
    }

    #[test]
    fn test_never_visited_defers() {
        let policy = DigestPolicy::default();
        let r = make_recipient(DigestFrequency::Daily, None);
        assert!(policy.should_defer_mail(&r, &Category::Tickets, Utc::now()));
    }

    #[test]
    fn test_privileged_categories_bypass() {
        let policy = DigestPolicy::default();
        let now = Utc::now();
        let r = make_recipient(DigestFrequency::Weekly, None);
        assert!(!policy.should_defer_mail(&r, &Category::Account, now));
        assert!(!policy.should_defer_mail(&r, &Category::StaffAlerts, now));
    }

    #[test]
    fn test_thresholds_from_config() {
        let config = NotifierConfig {
            digest_daily_threshold_hours: 48,
            ..Default::default()
        };
        let policy = DigestPolicy::from_config(&config);
        let now = Utc::now();
        let r = make_recipient(DigestFrequency::Daily, Some(now - Duration::hours(30)));
        assert!(!policy.should_defer_mail(&r, &Category::Tickets, now));
    }
}
