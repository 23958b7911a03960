//! Redis-backed presence, rate-limit and dedup store.
//!
//! Connections come from a `bb8` pool over a multiplexed Redis connection.
//! Commands are issued with `redis::cmd` so the adapter stays independent of
//! the convenience trait surface of any particular `redis` release.
//!
//! The online set is a sorted set scored by each member's presence expiry
//! (unix seconds). Members whose score has passed are treated as offline and
//! pruned on read, so a node that dies without announcing its users offline
//! cannot keep them online past the presence TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::bb8::{Pool, PooledConnection};
use bb8_redis::redis::{self, RedisError};
use bb8_redis::RedisConnectionManager;
use chrono::{DateTime, Utc};
use mockable::{Clock, DefaultClock};
use tracing::debug;

use crate::domain::ports::{
    CacheError, DedupClaim, DedupStore, PresenceStore, RateLimitStore, RateWindow,
};
use crate::domain::{CorrelationId, MessageId, PresenceRecord, UserId};

use super::keys;

const PENDING_MARKER: &str = "pending";

/// Pool sizing for [`RedisStore`].
#[derive(Debug, Clone)]
pub struct RedisConfig {
    url: String,
    max_size: u32,
    connection_timeout: Duration,
}

impl RedisConfig {
    /// Configuration with a pool of 16 connections and a 5 second checkout
    /// timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_size: 16,
            connection_timeout: Duration::from_secs(5),
        }
    }

    /// Set the maximum number of pooled connections.
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the checkout timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Redis URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Shared-cache adapter over Redis.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool<RedisConnectionManager>,
    clock: Arc<dyn Clock>,
}

impl RedisStore {
    /// Build the pool. Connections are opened lazily so the gateway can start
    /// while Redis is down and report itself degraded.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] when the URL cannot be parsed.
    pub fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .map_err(|err| CacheError::unavailable(err.to_string()))?;
        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build_unchecked(manager);
        Ok(Self {
            pool,
            clock: Arc::new(DefaultClock),
        })
    }

    /// Replace the clock used to score online-set members.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn now_score(&self) -> i64 {
        self.clock.utc().timestamp()
    }

    async fn connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|err| CacheError::unavailable(err.to_string()))
    }
}

fn map_redis_error(err: RedisError) -> CacheError {
    debug!(error = %err, "redis command failed");
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        CacheError::unavailable(err.to_string())
    } else {
        CacheError::protocol(err.to_string())
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn expiry_score(now: DateTime<Utc>, ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
    now.timestamp().saturating_add(ttl)
}

fn encode_record(record: &PresenceRecord) -> Result<String, CacheError> {
    serde_json::to_string(record).map_err(|err| CacheError::serialization(err.to_string()))
}

#[async_trait]
impl PresenceStore for RedisStore {
    async fn mark_online(&self, record: &PresenceRecord, ttl: Duration) -> Result<(), CacheError> {
        let payload = encode_record(record)?;
        let score = expiry_score(self.clock.utc(), ttl);
        let mut conn = self.connection().await?;
        let (): () = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(keys::online_set())
            .arg(score)
            .arg(record.user_id.to_string())
            .ignore()
            .cmd("SET")
            .arg(keys::presence(&record.user_id))
            .arg(payload)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .ignore()
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn mark_offline(
        &self,
        record: &PresenceRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = encode_record(record)?;
        let mut conn = self.connection().await?;
        let (): () = redis::pipe()
            .atomic()
            .cmd("ZREM")
            .arg(keys::online_set())
            .arg(record.user_id.to_string())
            .ignore()
            .cmd("SET")
            .arg(keys::presence(&record.user_id))
            .arg(payload)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .ignore()
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn presence(&self, user: &UserId) -> Result<Option<PresenceRecord>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(keys::presence(user))
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        raw.map(|value| {
            serde_json::from_str(&value).map_err(|err| CacheError::serialization(err.to_string()))
        })
        .transpose()
    }

    async fn online_users(&self) -> Result<Vec<UserId>, CacheError> {
        let now = self.now_score();
        let mut conn = self.connection().await?;
        let (members,): (Vec<String>,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(keys::online_set())
            .arg("-inf")
            .arg(now)
            .ignore()
            .cmd("ZRANGEBYSCORE")
            .arg(keys::online_set())
            .arg(format!("({now}"))
            .arg("+inf")
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        members
            .into_iter()
            .map(|member| {
                UserId::new(&member).map_err(|err| CacheError::serialization(err.to_string()))
            })
            .collect()
    }

    async fn online_count(&self) -> Result<u64, CacheError> {
        let now = self.now_score();
        let mut conn = self.connection().await?;
        let count: u64 = redis::cmd("ZCOUNT")
            .arg(keys::online_set())
            .arg(format!("({now}"))
            .arg("+inf")
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(count)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(CacheError::protocol(format!("unexpected PING reply {reply}")))
        }
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn increment(&self, sender: &UserId, window: Duration) -> Result<RateWindow, CacheError> {
        let key = keys::rate(sender);
        let window_secs = ttl_secs(window);
        let mut conn = self.connection().await?;

        let count: u64 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        if count == 1 {
            let _: bool = redis::cmd("EXPIRE")
                .arg(&key)
                .arg(window_secs)
                .query_async(&mut *conn)
                .await
                .map_err(map_redis_error)?;
        }

        let remaining_ms: i64 = redis::cmd("PTTL")
            .arg(&key)
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        // A counter without expiry would never reset; repair it.
        let resets_in = match u64::try_from(remaining_ms) {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                let _: bool = redis::cmd("EXPIRE")
                    .arg(&key)
                    .arg(window_secs)
                    .query_async(&mut *conn)
                    .await
                    .map_err(map_redis_error)?;
                window
            }
        };
        Ok(RateWindow { count, resets_in })
    }
}

#[async_trait]
impl DedupStore for RedisStore {
    async fn claim(
        &self,
        sender: &UserId,
        correlation_id: &CorrelationId,
        ttl: Duration,
    ) -> Result<DedupClaim, CacheError> {
        let key = keys::dedup(sender, correlation_id);
        let mut conn = self.connection().await?;
        let created: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(PENDING_MARKER)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        if created.is_some() {
            return Ok(DedupClaim::Claimed);
        }

        let existing: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(DedupClaim::Duplicate(
            existing
                .filter(|value| value != PENDING_MARKER)
                .and_then(|value| MessageId::parse(&value).ok()),
        ))
    }

    async fn record(
        &self,
        sender: &UserId,
        correlation_id: &CorrelationId,
        message_id: &MessageId,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        // SET without NX: the pending marker may have expired while the
        // message was persisting.
        let _: Option<String> = redis::cmd("SET")
            .arg(keys::dedup(sender, correlation_id))
            .arg(message_id.to_string())
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn release(
        &self,
        sender: &UserId,
        correlation_id: &CorrelationId,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: u64 = redis::cmd("DEL")
            .arg(keys::dedup(sender, correlation_id))
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}
