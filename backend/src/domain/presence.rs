//! Presence state shared between connections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserId;

/// Online/offline state of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// At least one authenticated connection is registered.
    Online,
    /// No connection is registered.
    Offline,
}

impl PresenceStatus {
    /// Wire representation used by cache adapters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Presence metadata for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    /// Subject of the record.
    #[schema(value_type = String, format = Uuid)]
    pub user_id: UserId,
    /// Current status.
    pub status: PresenceStatus,
    /// Last time the status changed or was refreshed.
    pub last_seen: DateTime<Utc>,
}

impl PresenceRecord {
    /// Record for a user who just came online.
    pub fn online(user_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            status: PresenceStatus::Online,
            last_seen: at,
        }
    }

    /// Record for a user who just went offline.
    pub fn offline(user_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            status: PresenceStatus::Offline,
            last_seen: at,
        }
    }
}
