//! Driving port for reconnection catch-up.
//!
//! Inbound adapters call it without knowing which repository backs it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Error, SyncedMessage, UserId};

/// Use-case port for fetching messages missed while disconnected.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSync: Send + Sync {
    /// Messages involving `user` created strictly after `since` (the epoch
    /// when absent), oldest first.
    async fn sync(
        &self,
        user: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SyncedMessage>, Error>;
}
