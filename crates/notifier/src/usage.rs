//! Monthly push usage counters.
//!
//! Counts Pushover sends per recipient per calendar month. A send reserves its
//! slot before going out: the limit check and the increment happen as one
//! atomic step, so concurrent dispatches can neither undercount nor overshoot
//! the limit. Sends that fail give their slot back.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use uuid::Uuid;

use beacon_common::error::Result;

/// Redis keys outlive the month they count by a little over a week.
const REDIS_KEY_TTL_SECS: i64 = 40 * 24 * 60 * 60;

fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

#[async_trait]
pub trait UsageCounter: Send + Sync {
    /// Sends counted so far in the month containing `now`.
    async fn current(&self, recipient_id: Uuid, now: DateTime<Utc>) -> Result<u64>;

    /// Count one send if the monthly total stays within `limit`.
    ///
    /// Returns the new total, or `None` when the limit was already reached.
    async fn try_reserve(
        &self,
        recipient_id: Uuid,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Option<u64>>;

    /// Return a reserved slot whose send did not go out.
    async fn release(&self, recipient_id: Uuid, now: DateTime<Utc>) -> Result<()>;
}

/// Process-local counter. Only the current month is kept.
#[derive(Default)]
pub struct InMemoryUsageCounter {
    counts: Mutex<HashMap<(Uuid, String), u64>>,
}

impl InMemoryUsageCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageCounter for InMemoryUsageCounter {
    async fn current(&self, recipient_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let counts = self.counts.lock().await;
        Ok(counts
            .get(&(recipient_id, month_key(now)))
            .copied()
            .unwrap_or(0))
    }

    async fn try_reserve(
        &self,
        recipient_id: Uuid,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Option<u64>> {
        let month = month_key(now);
        let mut counts = self.counts.lock().await;
        counts.retain(|(_, m), _| *m == month);

        let count = counts.entry((recipient_id, month)).or_insert(0);
        if *count >= limit {
            return Ok(None);
        }
        *count += 1;
        Ok(Some(*count))
    }

    async fn release(&self, recipient_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut counts = self.counts.lock().await;
        if let Some(count) = counts.get_mut(&(recipient_id, month_key(now))) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }
}

/// Counter shared across processes through Redis.
///
/// Uses `INCR` + `EXPIRE` in a `MULTI` pipeline on
/// `pushover:usage:{recipient}:{YYYY-MM}`. An increment that lands past the
/// limit is undone with `DECR`.
#[derive(Clone)]
pub struct RedisUsageCounter {
    redis: ConnectionManager,
}

impl RedisUsageCounter {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Open a managed connection to `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        tracing::info!("Connected to Redis for push usage counting");
        Ok(Self::new(manager))
    }

    fn key(recipient_id: Uuid, now: DateTime<Utc>) -> String {
        format!("pushover:usage:{}:{}", recipient_id, month_key(now))
    }
}

#[async_trait]
impl UsageCounter for RedisUsageCounter {
    async fn current(&self, recipient_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let mut redis = self.redis.clone();
        let count: Option<u64> = redis.get(Self::key(recipient_id, now)).await?;
        Ok(count.unwrap_or(0))
    }

    async fn try_reserve(
        &self,
        recipient_id: Uuid,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Option<u64>> {
        let mut redis = self.redis.clone();
        let key = Self::key(recipient_id, now);

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(&key, 1u64)
            .expire(&key, REDIS_KEY_TTL_SECS)
            .ignore()
            .query_async(&mut redis)
            .await?;

        if count > limit {
            let _: i64 = redis.decr(&key, 1u64).await?;
            return Ok(None);
        }
        Ok(Some(count))
    }

    async fn release(&self, recipient_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: i64 = redis.decr(Self::key(recipient_id, now), 1u64).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[test]
    fn test_redis_key_format() {
        let id = Uuid::nil();
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        assert_eq!(
            RedisUsageCounter::key(id, now),
            "pushover:usage:00000000-0000-0000-0000-000000000000:2026-03"
        );
    }

    #[tokio::test]
    async fn test_in_memory_counts_per_month() {
        let counter = InMemoryUsageCounter::new();
        let id = Uuid::new_v4();
        let march = Utc.with_ymd_and_hms(2026, 3, 31, 23, 0, 0).unwrap();
        let april = Utc.with_ymd_and_hms(2026, 4, 1, 0, 30, 0).unwrap();

        assert_eq!(counter.try_reserve(id, march, 10).await.unwrap(), Some(1));
        assert_eq!(counter.try_reserve(id, march, 10).await.unwrap(), Some(2));
        assert_eq!(counter.current(id, april).await.unwrap(), 0);
        assert_eq!(counter.try_reserve(id, april, 10).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_in_memory_drops_past_months() {
        let counter = InMemoryUsageCounter::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let march = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        let april = Utc.with_ymd_and_hms(2026, 4, 10, 0, 0, 0).unwrap();

        counter.try_reserve(a, march, 10).await.unwrap();
        counter.try_reserve(b, march, 10).await.unwrap();
        counter.try_reserve(a, april, 10).await.unwrap();

        assert_eq!(counter.counts.lock().await.len(), 1);
        assert_eq!(counter.current(a, march).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_in_memory_reserve_stops_at_limit() {
        let counter = InMemoryUsageCounter::new();
        let id = Uuid::new_v4();
        let now = Utc::now();

        assert_eq!(counter.try_reserve(id, now, 2).await.unwrap(), Some(1));
        assert_eq!(counter.try_reserve(id, now, 2).await.unwrap(), Some(2));
        assert_eq!(counter.try_reserve(id, now, 2).await.unwrap(), None);
        assert_eq!(counter.current(id, now).await.unwrap(), 2);

        counter.release(id, now).await.unwrap();
        assert_eq!(counter.try_reserve(id, now, 2).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_release_without_reservation_stays_at_zero() {
        let counter = InMemoryUsageCounter::new();
        let id = Uuid::new_v4();
        let now = Utc::now();

        counter.release(id, now).await.unwrap();
        assert_eq!(counter.current(id, now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_in_memory_concurrent_reservations_respect_limit() {
        let counter = Arc::new(InMemoryUsageCounter::new());
        let id = Uuid::new_v4();
        let now = Utc::now();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let counter = counter.clone();
                tokio::spawn(async move { counter.try_reserve(id, now, 20).await.unwrap() })
            })
            .collect();
        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap().is_some() {
                granted += 1;
            }
        }

        assert_eq!(granted, 20);
        assert_eq!(counter.current(id, now).await.unwrap(), 20);
    }
}
