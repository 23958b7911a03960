//! In-process map of authenticated identities to their single live connection.
//!
//! Each identity owns one delivery room, and the room is the identity itself:
//! delivering to a user means writing to whichever connection is registered
//! for them right now. Registering a second connection evicts the first.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use mockable::Clock;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ConnectionCommand, DisconnectReason, GatewayEvent, UserId};

/// Server-assigned identifier for one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

/// Receiving half owned by the connection task.
pub type ConnectionReceiver = mpsc::UnboundedReceiver<ConnectionCommand>;

/// Sending half of a connection's outbound command channel.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<ConnectionCommand>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the connection task drains.
    pub fn channel() -> (Self, ConnectionReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::random(),
                sender,
            },
            receiver,
        )
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a command; returns `false` when the connection task is gone.
    pub fn send(&self, command: ConnectionCommand) -> bool {
        self.sender.send(command).is_ok()
    }
}

#[derive(Debug)]
struct RegisteredConnection {
    handle: ConnectionHandle,
    last_activity: DateTime<Utc>,
}

/// Identity to connection map enforcing one active session per user.
pub struct ConnectionRegistry {
    connections: DashMap<UserId, RegisteredConnection>,
    clock: Arc<dyn Clock>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            connections: DashMap::new(),
            clock,
        }
    }

    /// Bind `handle` to `user`, evicting any earlier connection.
    ///
    /// The evicted connection is told to disconnect with
    /// [`DisconnectReason::NewerSession`]; delivery is fire-and-forget.
    /// Returns the evicted handle, if any.
    pub fn register(&self, user: UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let entry = RegisteredConnection {
            handle,
            last_activity: self.clock.utc(),
        };
        let evicted = match self.connections.entry(user) {
            Entry::Occupied(mut occupied) => Some(occupied.insert(entry).handle),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                None
            }
        };

        if let Some(old) = &evicted {
            info!(
                user_id = %user,
                connection_id = %old.id(),
                "evicting older session for user"
            );
            if !old.send(ConnectionCommand::Disconnect(DisconnectReason::NewerSession)) {
                debug!(connection_id = %old.id(), "evicted connection already closed");
            }
        }
        evicted
    }

    /// Remove `user`'s mapping if `connection` is still the registered one.
    pub fn unregister(&self, user: &UserId, connection: ConnectionId) -> bool {
        self.connections
            .remove_if(user, |_, registered| registered.handle.id() == connection)
            .is_some()
    }

    /// Record inbound activity on the connection.
    pub fn touch(&self, user: &UserId, connection: ConnectionId) {
        if let Some(mut registered) = self.connections.get_mut(user) {
            if registered.handle.id() == connection {
                registered.last_activity = self.clock.utc();
            }
        }
    }

    /// Deliver an event to `user`'s room. Returns `false` when nobody is
    /// registered or the connection already closed.
    pub fn deliver(&self, user: &UserId, event: GatewayEvent) -> bool {
        let Some(handle) = self.handle_for(user) else {
            return false;
        };
        handle.send(ConnectionCommand::Deliver(event))
    }

    /// Deliver an event to every registered connection.
    pub fn broadcast(&self, event: &GatewayEvent) -> usize {
        let handles: Vec<ConnectionHandle> = self
            .connections
            .iter()
            .map(|entry| entry.value().handle.clone())
            .collect();
        handles
            .into_iter()
            .filter(|handle| handle.send(ConnectionCommand::Deliver(event.clone())))
            .count()
    }

    /// Ask the connection to close if it is still the registered one.
    pub fn disconnect(
        &self,
        user: &UserId,
        connection: ConnectionId,
        reason: DisconnectReason,
    ) -> bool {
        match self.handle_for(user) {
            Some(handle) if handle.id() == connection => {
                handle.send(ConnectionCommand::Disconnect(reason))
            }
            _ => false,
        }
    }

    /// Whether `user` currently has a registered connection.
    pub fn is_registered(&self, user: &UserId) -> bool {
        self.connections.contains_key(user)
    }

    /// Id of the registered connection for `user`.
    pub fn connection_id(&self, user: &UserId) -> Option<ConnectionId> {
        self.connections.get(user).map(|entry| entry.handle.id())
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Identities with a registered connection.
    pub fn registered_users(&self) -> Vec<UserId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Connections silent for longer than `threshold`.
    pub fn idle_connections(&self, threshold: Duration) -> Vec<(UserId, ConnectionId)> {
        let threshold = TimeDelta::from_std(threshold).unwrap_or(TimeDelta::MAX);
        let now = self.clock.utc();
        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity) > threshold)
            .map(|entry| (*entry.key(), entry.value().handle.id()))
            .collect()
    }

    fn handle_for(&self, user: &UserId) -> Option<ConnectionHandle> {
        self.connections.get(user).map(|entry| entry.handle.clone())
    }
}
