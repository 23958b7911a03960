//! Port for presence state in the shared cache.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{PresenceRecord, UserId};

use super::CacheError;

/// Online set plus per-user presence metadata.
///
/// `mark_online` doubles as the TTL refresh used by the presence sweep.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Add the user to the online set and store the record with `ttl`.
    async fn mark_online(&self, record: &PresenceRecord, ttl: Duration) -> Result<(), CacheError>;

    /// Remove the user from the online set and store the offline record.
    async fn mark_offline(&self, record: &PresenceRecord, ttl: Duration)
    -> Result<(), CacheError>;

    /// Stored presence for one user.
    async fn presence(&self, user: &UserId) -> Result<Option<PresenceRecord>, CacheError>;

    /// Members of the online set.
    async fn online_users(&self) -> Result<Vec<UserId>, CacheError>;

    /// Cardinality of the online set.
    async fn online_count(&self) -> Result<u64, CacheError>;

    /// Round-trip to the store, used by health checks.
    async fn ping(&self) -> Result<(), CacheError>;
}
