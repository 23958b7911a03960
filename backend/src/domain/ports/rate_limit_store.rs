//! Port for per-sender rate-limit counters.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::UserId;

use super::CacheError;

/// Counter state after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Attempts recorded in the current window, including this one.
    pub count: u64,
    /// Time until the window expires and the counter resets.
    pub resets_in: Duration,
}

/// Fixed-window counter keyed by sender.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increment the sender's counter, starting a new `window` when none is
    /// active.
    async fn increment(&self, sender: &UserId, window: Duration) -> Result<RateWindow, CacheError>;
}
