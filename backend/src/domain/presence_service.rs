//! Online/offline transitions and the periodic presence sweep.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ports::PresenceStore;
use super::{
    ConnectionHandle, ConnectionId, ConnectionRegistry, DependencyMonitor, DisconnectReason,
    GatewayEvent, PresenceRecord, UserId,
};

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections closed for inactivity.
    pub reaped: usize,
    /// Presence records whose TTL was refreshed.
    pub refreshed: usize,
}

/// Presence timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTiming {
    /// Expiry written with every presence record.
    pub presence_ttl: Duration,
    /// Silence after which a connection is reaped.
    pub inactivity_threshold: Duration,
    /// Interval between sweeps.
    pub reap_interval: Duration,
}

/// Registers connections and keeps shared presence in step with the registry.
pub struct PresenceService {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn PresenceStore>,
    monitor: Arc<DependencyMonitor>,
    clock: Arc<dyn Clock>,
    timing: PresenceTiming,
}

impl PresenceService {
    /// Create the service.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn PresenceStore>,
        monitor: Arc<DependencyMonitor>,
        clock: Arc<dyn Clock>,
        timing: PresenceTiming,
    ) -> Self {
        Self {
            registry,
            store,
            monitor,
            clock,
            timing,
        }
    }

    /// Register an authenticated connection and announce the user online.
    ///
    /// Returns the connection that was evicted, if any.
    pub async fn connect(&self, user: UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let connection_id = handle.id();
        let evicted = self.registry.register(user, handle);
        let record = PresenceRecord::online(user, self.clock.utc());
        self.write_online(&record).await;

        info!(user_id = %user, connection_id = %connection_id, "user online");
        self.registry
            .broadcast(&GatewayEvent::UserOnline { user_id: user });
        self.registry
            .broadcast(&GatewayEvent::PresenceUpdate(record));
        evicted
    }

    /// Remove the connection and announce the user offline.
    ///
    /// Does nothing if `connection` was already replaced or removed, so a
    /// replaced session never flips its successor offline.
    pub async fn disconnect(&self, user: &UserId, connection: ConnectionId) -> bool {
        if !self.registry.unregister(user, connection) {
            debug!(user_id = %user, connection_id = %connection, "connection no longer registered");
            return false;
        }

        let record = PresenceRecord::offline(*user, self.clock.utc());
        match self.store.mark_offline(&record, self.timing.presence_ttl).await {
            Ok(()) => self.monitor.record_presence_success(),
            Err(err) => {
                warn!(user_id = %user, error = %err, "failed to mark user offline");
                self.monitor.record_presence_failure();
            }
        }

        info!(user_id = %user, connection_id = %connection, "user offline");
        self.registry.broadcast(&GatewayEvent::UserOffline {
            user_id: *user,
            last_seen: record.last_seen,
        });
        self.registry
            .broadcast(&GatewayEvent::PresenceUpdate(record));
        true
    }

    /// Users the shared cache lists as online, or the local registry when
    /// the cache is unavailable.
    pub async fn online_users(&self) -> Vec<UserId> {
        match self.store.online_users().await {
            Ok(users) => users,
            Err(err) => {
                warn!(error = %err, "online set unavailable; falling back to local registry");
                self.registry.registered_users()
            }
        }
    }

    /// Reap idle connections and refresh presence TTLs for the rest.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for (user, connection) in self
            .registry
            .idle_connections(self.timing.inactivity_threshold)
        {
            info!(user_id = %user, connection_id = %connection, "reaping idle connection");
            self.registry
                .disconnect(&user, connection, DisconnectReason::Inactivity);
            if self.disconnect(&user, connection).await {
                report.reaped += 1;
            }
        }

        let now = self.clock.utc();
        for user in self.registry.registered_users() {
            let record = PresenceRecord::online(user, now);
            if self.write_online(&record).await {
                report.refreshed += 1;
            }
        }
        report
    }

    /// Run [`PresenceService::sweep`] on the configured interval until the
    /// task is aborted.
    pub fn spawn_reaper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.timing.reap_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = self.sweep().await;
                debug!(
                    reaped = report.reaped,
                    refreshed = report.refreshed,
                    "presence sweep finished"
                );
            }
        })
    }

    async fn write_online(&self, record: &PresenceRecord) -> bool {
        match self.store.mark_online(record, self.timing.presence_ttl).await {
            Ok(()) => {
                self.monitor.record_presence_success();
                true
            }
            Err(err) => {
                warn!(user_id = %record.user_id, error = %err, "failed to write presence");
                self.monitor.record_presence_failure();
                false
            }
        }
    }
}
