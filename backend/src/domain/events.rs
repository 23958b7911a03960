//! Events pushed from the gateway to connected clients.
//!
//! Serialises adjacently tagged as `{"event": NAME, "data": {...}}`, which is
//! the frame shape the WebSocket adapter writes verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ErrorCode, Message, MessageId, PresenceRecord, ReadReceipt, UserId};

/// Why the gateway closed a connection on its own initiative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The same identity authenticated on another connection.
    NewerSession,
    /// No inbound traffic within the inactivity threshold.
    Inactivity,
}

/// Server-initiated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayEvent {
    /// Handshake accepted.
    #[serde(rename_all = "camelCase")]
    ConnectionSuccess {
        /// Verified identity bound to the connection.
        user_id: UserId,
        /// Server-assigned connection id.
        connection_id: Uuid,
    },
    /// Handshake rejected; the connection closes afterwards.
    ConnectionError {
        /// Failure category.
        code: ErrorCode,
        /// Human-readable reason.
        message: String,
    },
    /// A message addressed to the receiving connection.
    NewMessage(Message),
    /// Confirmation to the sender that a message was persisted.
    #[serde(rename_all = "camelCase")]
    MessageSent {
        /// Persisted message id.
        message_id: MessageId,
        /// Correlation id the send was deduplicated under.
        correlation_id: String,
        /// Recipient of the message.
        receiver_id: UserId,
        /// Persisted creation time.
        created_at: DateTime<Utc>,
    },
    /// A peer started or stopped typing.
    #[serde(rename_all = "camelCase")]
    UserTyping {
        /// Who is typing.
        user_id: UserId,
        /// `true` on start, `false` on stop or expiry.
        is_typing: bool,
    },
    /// The receiver read one of the sender's messages.
    MessageReadUpdate(ReadReceipt),
    /// A message was edited by its sender.
    MessageEdited(Message),
    /// A message was soft-deleted by its sender.
    MessageDeleted(Message),
    /// A user came online.
    #[serde(rename_all = "camelCase")]
    UserOnline {
        /// User that connected.
        user_id: UserId,
    },
    /// A user went offline.
    #[serde(rename_all = "camelCase")]
    UserOffline {
        /// User that disconnected.
        user_id: UserId,
        /// Time of the disconnect.
        last_seen: DateTime<Utc>,
    },
    /// Presence record after any transition.
    #[serde(rename = "USER_PRESENCE_UPDATE")]
    PresenceUpdate(PresenceRecord),
    /// The connection is about to be closed by the server.
    ForceDisconnect {
        /// Why the gateway is closing the connection.
        reason: DisconnectReason,
    },
    /// A send was rejected by the rate limiter.
    #[serde(rename_all = "camelCase")]
    RateLimitExceeded {
        /// Seconds until the current window resets.
        retry_after_secs: u64,
    },
}

impl GatewayEvent {
    /// Wire name of the event, used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionSuccess { .. } => "CONNECTION_SUCCESS",
            Self::ConnectionError { .. } => "CONNECTION_ERROR",
            Self::NewMessage(_) => "NEW_MESSAGE",
            Self::MessageSent { .. } => "MESSAGE_SENT",
            Self::UserTyping { .. } => "USER_TYPING",
            Self::MessageReadUpdate(_) => "MESSAGE_READ_UPDATE",
            Self::MessageEdited(_) => "MESSAGE_EDITED",
            Self::MessageDeleted(_) => "MESSAGE_DELETED",
            Self::UserOnline { .. } => "USER_ONLINE",
            Self::UserOffline { .. } => "USER_OFFLINE",
            Self::PresenceUpdate(_) => "USER_PRESENCE_UPDATE",
            Self::ForceDisconnect { .. } => "FORCE_DISCONNECT",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
        }
    }
}

/// Instruction delivered to a connection task through its outbound channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionCommand {
    /// Write the event to the socket.
    Deliver(GatewayEvent),
    /// Send `FORCE_DISCONNECT` and close the socket.
    Disconnect(DisconnectReason),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PresenceStatus;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn typing_event_uses_wire_shape() {
        let user_id = UserId::random();
        let value = serde_json::to_value(GatewayEvent::UserTyping {
            user_id,
            is_typing: true,
        })
        .expect("serialises");

        assert_eq!(
            value,
            json!({
                "event": "USER_TYPING",
                "data": {"userId": user_id.to_string(), "isTyping": true}
            })
        );
    }

    #[rstest]
    fn presence_update_is_renamed() {
        let record = PresenceRecord::online(UserId::random(), Utc::now());
        let event = GatewayEvent::PresenceUpdate(record);
        let value = serde_json::to_value(&event).expect("serialises");

        assert_eq!(value["event"], json!("USER_PRESENCE_UPDATE"));
        assert_eq!(value["data"]["status"], json!(PresenceStatus::Online.as_str()));
        assert_eq!(event.name(), "USER_PRESENCE_UPDATE");
    }

    #[rstest]
    fn force_disconnect_carries_snake_case_reason() {
        let value = serde_json::to_value(GatewayEvent::ForceDisconnect {
            reason: DisconnectReason::NewerSession,
        })
        .expect("serialises");

        assert_eq!(
            value,
            json!({"event": "FORCE_DISCONNECT", "data": {"reason": "newer_session"}})
        );
    }

    #[rstest]
    fn rate_limit_event_reports_retry_hint() {
        let value = serde_json::to_value(GatewayEvent::RateLimitExceeded {
            retry_after_secs: 42,
        })
        .expect("serialises");
        assert_eq!(value["data"]["retryAfterSecs"], json!(42));
    }
}
