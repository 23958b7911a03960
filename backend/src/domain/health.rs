//! Gateway diagnostics.
//!
//! The report never fails: an unreachable store turns into a `degraded`
//! status instead of an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use super::ConnectionRegistry;
use super::ports::PresenceStore;

/// Tracks whether presence writes have been failing.
#[derive(Debug, Default)]
pub struct DependencyMonitor {
    presence_failing: AtomicBool,
    presence_failures: AtomicU64,
}

impl DependencyMonitor {
    /// Create a monitor with no recorded failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed presence write.
    pub fn record_presence_failure(&self) {
        self.presence_failing.store(true, Ordering::Release);
        self.presence_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful presence write.
    pub fn record_presence_success(&self) {
        self.presence_failing.store(false, Ordering::Release);
    }

    /// Whether the most recent presence write failed.
    pub fn presence_failing(&self) -> bool {
        self.presence_failing.load(Ordering::Acquire)
    }

    /// Total presence write failures since startup.
    pub fn presence_failures(&self) -> u64 {
        self.presence_failures.load(Ordering::Relaxed)
    }
}

/// Overall gateway status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every dependency responded.
    Healthy,
    /// The shared cache is unreachable or presence writes are failing.
    Degraded,
}

/// Reachability of the shared cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    /// Responded to a ping.
    Up,
    /// Did not respond.
    Down,
}

/// Snapshot returned by the health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Shared cache reachability.
    pub cache: DependencyStatus,
    /// Connections registered on this instance.
    pub registered_connections: usize,
    /// Online users according to the shared cache; absent when unreachable.
    pub online_users: Option<u64>,
    /// Whether recent presence writes failed.
    pub presence_degraded: bool,
    /// Presence write failures since startup.
    pub presence_failures: u64,
}

/// Builds [`HealthReport`]s.
#[derive(Clone)]
pub struct HealthReporter {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<dyn PresenceStore>,
    monitor: Arc<DependencyMonitor>,
}

impl HealthReporter {
    /// Create a reporter over the registry and presence store.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        presence: Arc<dyn PresenceStore>,
        monitor: Arc<DependencyMonitor>,
    ) -> Self {
        Self {
            registry,
            presence,
            monitor,
        }
    }

    /// Probe dependencies and summarise gateway state.
    pub async fn report(&self) -> HealthReport {
        let cache = match self.presence.ping().await {
            Ok(()) => DependencyStatus::Up,
            Err(err) => {
                warn!(error = %err, "cache ping failed during health check");
                DependencyStatus::Down
            }
        };

        let online_users = if cache == DependencyStatus::Up {
            match self.presence.online_count().await {
                Ok(count) => Some(count),
                Err(err) => {
                    warn!(error = %err, "online count unavailable during health check");
                    None
                }
            }
        } else {
            None
        };

        let presence_degraded = self.monitor.presence_failing();
        let status = if cache == DependencyStatus::Up && !presence_degraded {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            cache,
            registered_connections: self.registry.connection_count(),
            online_users,
            presence_degraded,
            presence_failures: self.monitor.presence_failures(),
        }
    }
}
