//! Process-local shared-cache adapter.
//!
//! Mirrors the Redis key semantics (online set scored by expiry, expiring
//! records, fixed windows, set-if-absent markers) with expiry driven by an
//! injected clock. Expired entries are evicted at most once per
//! [`EVICTION_INTERVAL_SECS`] whenever the store is touched. Used for
//! single-node development and by tests, which can also switch the store off
//! to exercise degraded paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;

use crate::domain::ports::{
    CacheError, DedupClaim, DedupStore, PresenceStore, RateLimitStore, RateWindow,
};
use crate::domain::{CorrelationId, MessageId, PresenceRecord, UserId};

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

impl<T> Expiring<T> {
    fn live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Minimum spacing between eviction passes.
pub const EVICTION_INTERVAL_SECS: i64 = 30;

#[derive(Default)]
struct State {
    online: HashMap<UserId, DateTime<Utc>>,
    records: HashMap<UserId, Expiring<PresenceRecord>>,
    counters: HashMap<UserId, Expiring<u64>>,
    markers: HashMap<(UserId, CorrelationId), Expiring<Option<MessageId>>>,
    next_eviction: Option<DateTime<Utc>>,
}

impl State {
    fn evict_expired(&mut self, now: DateTime<Utc>) {
        if self.next_eviction.is_some_and(|at| now < at) {
            return;
        }
        self.online.retain(|_, until| *until > now);
        self.records.retain(|_, entry| entry.live(now));
        self.counters.retain(|_, entry| entry.live(now));
        self.markers.retain(|_, entry| entry.live(now));
        self.next_eviction = now.checked_add_signed(TimeDelta::seconds(EVICTION_INTERVAL_SECS));
    }

    fn online_at(&self, now: DateTime<Utc>) -> impl Iterator<Item = &UserId> {
        self.online
            .iter()
            .filter(move |(_, until)| **until > now)
            .map(|(user, _)| user)
    }
}

/// In-process implementation of the cache ports.
pub struct InMemoryStore {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl InMemoryStore {
    /// Empty store reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, CacheError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("in-memory store switched off"));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| CacheError::unavailable("in-memory store lock poisoned"))?;
        state.evict_expired(self.clock.utc());
        Ok(state)
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let now = self.clock.utc();
        TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[async_trait]
impl PresenceStore for InMemoryStore {
    async fn mark_online(&self, record: &PresenceRecord, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = self.expiry(ttl);
        let mut state = self.state()?;
        state.online.insert(record.user_id, expires_at);
        state.records.insert(
            record.user_id,
            Expiring {
                value: record.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn mark_offline(
        &self,
        record: &PresenceRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = self.expiry(ttl);
        let mut state = self.state()?;
        state.online.remove(&record.user_id);
        state.records.insert(
            record.user_id,
            Expiring {
                value: record.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn presence(&self, user: &UserId) -> Result<Option<PresenceRecord>, CacheError> {
        let now = self.clock.utc();
        let state = self.state()?;
        Ok(state
            .records
            .get(user)
            .filter(|entry| entry.live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn online_users(&self) -> Result<Vec<UserId>, CacheError> {
        let now = self.clock.utc();
        let state = self.state()?;
        let mut users: Vec<UserId> = state.online_at(now).copied().collect();
        users.sort();
        Ok(users)
    }

    async fn online_count(&self) -> Result<u64, CacheError> {
        let now = self.clock.utc();
        let state = self.state()?;
        Ok(state.online_at(now).count() as u64)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.state().map(|_| ())
    }
}

#[async_trait]
impl RateLimitStore for InMemoryStore {
    async fn increment(&self, sender: &UserId, window: Duration) -> Result<RateWindow, CacheError> {
        let now = self.clock.utc();
        let fresh_expiry = self.expiry(window);
        let mut state = self.state()?;
        let entry = state
            .counters
            .entry(*sender)
            .and_modify(|entry| {
                if entry.live(now) {
                    entry.value += 1;
                } else {
                    *entry = Expiring {
                        value: 1,
                        expires_at: fresh_expiry,
                    };
                }
            })
            .or_insert(Expiring {
                value: 1,
                expires_at: fresh_expiry,
            });
        let resets_in = (entry.expires_at - now).to_std().unwrap_or(Duration::ZERO);
        Ok(RateWindow {
            count: entry.value,
            resets_in,
        })
    }
}

#[async_trait]
impl DedupStore for InMemoryStore {
    async fn claim(
        &self,
        sender: &UserId,
        correlation_id: &CorrelationId,
        ttl: Duration,
    ) -> Result<DedupClaim, CacheError> {
        let now = self.clock.utc();
        let expires_at = self.expiry(ttl);
        let mut state = self.state()?;
        let key = (*sender, correlation_id.clone());
        if let Some(existing) = state.markers.get(&key).filter(|entry| entry.live(now)) {
            return Ok(DedupClaim::Duplicate(existing.value));
        }
        state.markers.insert(
            key,
            Expiring {
                value: None,
                expires_at,
            },
        );
        Ok(DedupClaim::Claimed)
    }

    async fn record(
        &self,
        sender: &UserId,
        correlation_id: &CorrelationId,
        message_id: &MessageId,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = self.expiry(ttl);
        let mut state = self.state()?;
        state.markers.insert(
            (*sender, correlation_id.clone()),
            Expiring {
                value: Some(*message_id),
                expires_at,
            },
        );
        Ok(())
    }

    async fn release(
        &self,
        sender: &UserId,
        correlation_id: &CorrelationId,
    ) -> Result<(), CacheError> {
        let mut state = self.state()?;
        state.markers.remove(&(*sender, correlation_id.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MutableClock;
    use rstest::{fixture, rstest};

    struct Fixture {
        clock: Arc<MutableClock>,
        store: InMemoryStore,
    }

    #[fixture]
    fn fx() -> Fixture {
        let clock = MutableClock::fixed();
        let store = InMemoryStore::new(clock.clone());
        Fixture { clock, store }
    }

    fn correlation(raw: &str) -> CorrelationId {
        CorrelationId::new(raw).expect("valid correlation id")
    }

    #[rstest]
    #[tokio::test]
    async fn presence_records_expire(fx: Fixture) {
        let user = UserId::random();
        let record = PresenceRecord::online(user, fx.clock.utc());
        fx.store
            .mark_online(&record, Duration::from_secs(90))
            .await
            .expect("stored");

        assert_eq!(fx.store.presence(&user).await.expect("read"), Some(record));
        assert_eq!(fx.store.online_count().await.expect("count"), 1);

        fx.clock.advance(Duration::from_secs(91));
        assert_eq!(fx.store.presence(&user).await.expect("read"), None);
    }

    #[rstest]
    #[tokio::test]
    async fn offline_removes_from_online_set(fx: Fixture) {
        let user = UserId::random();
        let now = fx.clock.utc();
        fx.store
            .mark_online(&PresenceRecord::online(user, now), Duration::from_secs(90))
            .await
            .expect("online");
        fx.store
            .mark_offline(&PresenceRecord::offline(user, now), Duration::from_secs(90))
            .await
            .expect("offline");

        assert!(fx.store.online_users().await.expect("users").is_empty());
        let stored = fx.store.presence(&user).await.expect("read").expect("kept");
        assert_eq!(stored.last_seen, now);
    }

    #[rstest]
    #[tokio::test]
    async fn lapsed_presence_leaves_online_set(fx: Fixture) {
        let user = UserId::random();
        let record = PresenceRecord::online(user, fx.clock.utc());
        fx.store
            .mark_online(&record, Duration::from_secs(90))
            .await
            .expect("stored");

        fx.clock.advance(Duration::from_secs(3600));

        assert_eq!(fx.store.presence(&user).await.expect("read"), None);
        assert!(fx.store.online_users().await.expect("users").is_empty());
        assert_eq!(fx.store.online_count().await.expect("count"), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn refreshed_presence_stays_online(fx: Fixture) {
        let user = UserId::random();
        let ttl = Duration::from_secs(90);
        for _ in 0..3 {
            let record = PresenceRecord::online(user, fx.clock.utc());
            fx.store.mark_online(&record, ttl).await.expect("refreshed");
            fx.clock.advance(Duration::from_secs(60));
        }

        assert_eq!(fx.store.online_users().await.expect("users"), vec![user]);
    }

    #[rstest]
    #[tokio::test]
    async fn rate_window_counts_then_resets(fx: Fixture) {
        let user = UserId::random();
        let window = Duration::from_secs(60);
        for expected in 1..=3 {
            let state = fx.store.increment(&user, window).await.expect("counted");
            assert_eq!(state.count, expected);
        }

        fx.clock.advance(Duration::from_secs(20));
        let state = fx.store.increment(&user, window).await.expect("counted");
        assert_eq!(state.count, 4);
        assert_eq!(state.resets_in, Duration::from_secs(40));

        fx.clock.advance(Duration::from_secs(41));
        let state = fx.store.increment(&user, window).await.expect("counted");
        assert_eq!(state.count, 1);
        assert_eq!(state.resets_in, window);
    }

    #[rstest]
    #[tokio::test]
    async fn claim_is_set_if_absent(fx: Fixture) {
        let user = UserId::random();
        let corr = correlation("c-1");
        let ttl = Duration::from_secs(3600);

        assert_eq!(
            fx.store.claim(&user, &corr, ttl).await.expect("claim"),
            DedupClaim::Claimed
        );
        assert_eq!(
            fx.store.claim(&user, &corr, ttl).await.expect("claim"),
            DedupClaim::Duplicate(None)
        );

        let id = MessageId::random();
        fx.store.record(&user, &corr, &id, ttl).await.expect("record");
        assert_eq!(
            fx.store.claim(&user, &corr, ttl).await.expect("claim"),
            DedupClaim::Duplicate(Some(id))
        );

        let other_sender = UserId::random();
        assert_eq!(
            fx.store.claim(&other_sender, &corr, ttl).await.expect("claim"),
            DedupClaim::Claimed
        );
    }

    #[rstest]
    #[tokio::test]
    async fn released_and_expired_markers_can_be_reclaimed(fx: Fixture) {
        let user = UserId::random();
        let corr = correlation("c-2");
        let ttl = Duration::from_secs(3600);

        fx.store.claim(&user, &corr, ttl).await.expect("claim");
        fx.store.release(&user, &corr).await.expect("release");
        assert_eq!(
            fx.store.claim(&user, &corr, ttl).await.expect("claim"),
            DedupClaim::Claimed
        );

        fx.clock.advance(Duration::from_secs(3601));
        assert_eq!(
            fx.store.claim(&user, &corr, ttl).await.expect("claim"),
            DedupClaim::Claimed
        );
    }

    #[rstest]
    #[tokio::test]
    async fn expired_entries_are_evicted(fx: Fixture) {
        let user = UserId::random();
        let ttl = Duration::from_secs(1);
        for _ in 0..1000 {
            fx.store
                .claim(&user, &CorrelationId::generated(), ttl)
                .await
                .expect("claim");
        }
        fx.store.increment(&user, ttl).await.expect("counted");
        fx.store
            .mark_online(&PresenceRecord::online(user, fx.clock.utc()), ttl)
            .await
            .expect("online");

        fx.clock
            .advance(Duration::from_secs(EVICTION_INTERVAL_SECS.unsigned_abs() + 1));
        fx.store
            .claim(&user, &CorrelationId::generated(), ttl)
            .await
            .expect("claim");

        let state = fx.store.state.lock().expect("state lock");
        assert_eq!(state.markers.len(), 1);
        assert!(state.counters.is_empty());
        assert!(state.records.is_empty());
        assert!(state.online.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn switched_off_store_is_unavailable(fx: Fixture) {
        fx.store.set_available(false);
        assert!(matches!(
            fx.store.ping().await,
            Err(CacheError::Unavailable { .. })
        ));
        assert!(fx.store.increment(&UserId::random(), Duration::from_secs(1)).await.is_err());

        fx.store.set_available(true);
        assert!(fx.store.ping().await.is_ok());
    }
}
