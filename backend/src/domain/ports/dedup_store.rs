//! Port for send deduplication markers.
//!
//! A marker is keyed by sender and correlation id. It holds a pending
//! placeholder while the first attempt is persisting and the persisted
//! message id afterwards.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{CorrelationId, MessageId, UserId};

use super::CacheError;

/// Result of trying to claim a correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupClaim {
    /// No marker existed; the caller owns this send.
    Claimed,
    /// A marker existed. Carries the original id once it is known.
    Duplicate(Option<MessageId>),
}

/// Atomic set-if-absent markers with a fixed expiry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Atomically create a pending marker unless one exists.
    async fn claim(
        &self,
        sender: &UserId,
        correlation_id: &CorrelationId,
        ttl: Duration,
    ) -> Result<DedupClaim, CacheError>;

    /// Replace the pending marker with the persisted message id.
    async fn record(
        &self,
        sender: &UserId,
        correlation_id: &CorrelationId,
        message_id: &MessageId,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Drop the marker so a retry can proceed.
    async fn release(
        &self,
        sender: &UserId,
        correlation_id: &CorrelationId,
    ) -> Result<(), CacheError>;
}
