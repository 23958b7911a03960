//! Runtime tunables for the gateway services.
//!
//! Built from validated settings at startup; every duration here has already
//! been clamped, so services use the values as given.

use std::time::Duration;

/// Characters of message content included in push previews.
pub const PUSH_PREVIEW_CHARS: usize = 100;

/// Timeouts, limits and feature flags shared by the gateway services.
///
/// # Example
///
/// ```
/// # use messaging_gateway::domain::GatewayConfig;
/// # use std::time::Duration;
/// let config = GatewayConfig::default();
/// assert_eq!(config.rate_limit, 100);
/// assert_eq!(config.rate_window, Duration::from_secs(60));
/// assert!(config.rate_limit_enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Time allowed between upgrade and a successful `authenticate`.
    pub auth_timeout: Duration,
    /// Typing indicators stop automatically after this delay.
    pub typing_expiry: Duration,
    /// Lifetime of send deduplication markers.
    pub dedup_ttl: Duration,
    /// Length of the fixed rate-limit window.
    pub rate_window: Duration,
    /// Sends allowed per sender per window.
    pub rate_limit: u64,
    /// Interval between presence sweeps.
    pub reap_interval: Duration,
    /// Connections silent for longer than this are disconnected.
    pub inactivity_threshold: Duration,
    /// Expiry applied to presence records; refreshed on every sweep.
    pub presence_ttl: Duration,
    /// Interval between WebSocket pings.
    pub heartbeat_interval: Duration,
    /// Apply the per-sender rate limit.
    pub rate_limit_enabled: bool,
    /// Push to offline receivers.
    pub push_fallback_enabled: bool,
    /// Reject sends that carry no client correlation id.
    pub require_correlation_id: bool,
}

impl GatewayConfig {
    /// Default auth handshake timeout in seconds.
    pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 10;
    /// Default typing expiry in seconds.
    pub const DEFAULT_TYPING_EXPIRY_SECS: u64 = 5;
    /// Default dedup marker lifetime in seconds.
    pub const DEFAULT_DEDUP_TTL_SECS: u64 = 3600;
    /// Default rate window in seconds.
    pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;
    /// Default sends per window.
    pub const DEFAULT_RATE_LIMIT: u64 = 100;
    /// Default sweep interval in seconds.
    pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 30;
    /// Default inactivity threshold in seconds.
    pub const DEFAULT_INACTIVITY_SECS: u64 = 300;
    /// Default ping interval in seconds.
    pub const DEFAULT_HEARTBEAT_SECS: u64 = 15;

    /// Presence records outlive three missed sweeps.
    pub fn presence_ttl_for(reap_interval: Duration) -> Duration {
        reap_interval.saturating_mul(3)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let reap_interval = Duration::from_secs(Self::DEFAULT_REAP_INTERVAL_SECS);
        Self {
            auth_timeout: Duration::from_secs(Self::DEFAULT_AUTH_TIMEOUT_SECS),
            typing_expiry: Duration::from_secs(Self::DEFAULT_TYPING_EXPIRY_SECS),
            dedup_ttl: Duration::from_secs(Self::DEFAULT_DEDUP_TTL_SECS),
            rate_window: Duration::from_secs(Self::DEFAULT_RATE_WINDOW_SECS),
            rate_limit: Self::DEFAULT_RATE_LIMIT,
            reap_interval,
            inactivity_threshold: Duration::from_secs(Self::DEFAULT_INACTIVITY_SECS),
            presence_ttl: Self::presence_ttl_for(reap_interval),
            heartbeat_interval: Duration::from_secs(Self::DEFAULT_HEARTBEAT_SECS),
            rate_limit_enabled: true,
            push_fallback_enabled: true,
            require_correlation_id: false,
        }
    }
}
