//! Direct messages exchanged through the gateway.
//!
//! A [`Message`] belongs to exactly one sender/receiver pair. Only the sender
//! may edit or delete it, and deletion is soft: the row survives with its
//! content replaced by [`DELETED_MESSAGE_MARKER`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::UserId;

/// Content stored in place of the original text once a message is deleted.
pub const DELETED_MESSAGE_MARKER: &str = "This message was deleted";

/// Maximum message length in characters.
pub const MESSAGE_CONTENT_MAX: usize = 5000;

/// Maximum correlation id length in characters.
pub const CORRELATION_ID_MAX: usize = 128;

/// Validation failures for message payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageValidationError {
    /// Content was empty or whitespace.
    #[error("message content must not be empty")]
    EmptyContent,
    /// Content exceeded [`MESSAGE_CONTENT_MAX`].
    #[error("message content must be at most {max} characters")]
    ContentTooLong {
        /// Configured ceiling.
        max: usize,
    },
    /// Correlation id was empty or whitespace.
    #[error("correlation id must not be empty")]
    EmptyCorrelationId,
    /// Correlation id exceeded [`CORRELATION_ID_MAX`].
    #[error("correlation id must be at most {max} characters")]
    CorrelationIdTooLong {
        /// Configured ceiling.
        max: usize,
    },
    /// Message id was not a UUID.
    #[error("message id must be a valid UUID")]
    InvalidMessageId,
}

/// Unique identifier of a persisted message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
#[schema(value_type = String, format = Uuid)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse a message id from client input.
    pub fn parse(raw: &str) -> Result<Self, MessageValidationError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| MessageValidationError::InvalidMessageId)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

/// Validated message body.
///
/// ## Invariants
/// - Non-empty once trimmed.
/// - At most [`MESSAGE_CONTENT_MAX`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageContent(String);

impl MessageContent {
    /// Validate and wrap message content.
    ///
    /// # Examples
    /// ```
    /// use messaging_gateway::domain::MessageContent;
    ///
    /// assert!(MessageContent::new("hello").is_ok());
    /// assert!(MessageContent::new("   ").is_err());
    /// ```
    pub fn new(content: impl Into<String>) -> Result<Self, MessageValidationError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(MessageValidationError::EmptyContent);
        }
        if content.chars().count() > MESSAGE_CONTENT_MAX {
            return Err(MessageValidationError::ContentTooLong {
                max: MESSAGE_CONTENT_MAX,
            });
        }
        Ok(Self(content))
    }

    /// The deletion marker as content.
    pub fn deleted_marker() -> Self {
        Self(DELETED_MESSAGE_MARKER.to_owned())
    }

    /// Borrow the content as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// First `max_chars` characters, used for push previews.
    pub fn preview(&self, max_chars: usize) -> String {
        self.0.chars().take(max_chars).collect()
    }
}

impl AsRef<str> for MessageContent {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<MessageContent> for String {
    fn from(value: MessageContent) -> Self {
        value.0
    }
}

impl TryFrom<String> for MessageContent {
    type Error = MessageValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Client-supplied identifier used to deduplicate send retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Validate a client correlation id; surrounding whitespace is dropped.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, MessageValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(MessageValidationError::EmptyCorrelationId);
        }
        if trimmed.chars().count() > CORRELATION_ID_MAX {
            return Err(MessageValidationError::CorrelationIdTooLong {
                max: CORRELATION_ID_MAX,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Server-generated id for sends that arrive without one.
    pub fn generated() -> Self {
        Self(format!("srv-{}", Uuid::new_v4()))
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CorrelationId> for String {
    fn from(value: CorrelationId) -> Self {
        value.0
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = MessageValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Persisted direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Author of the message.
    #[schema(value_type = String, format = Uuid)]
    pub sender_id: UserId,
    /// Recipient of the message.
    #[schema(value_type = String, format = Uuid)]
    pub receiver_id: UserId,
    /// Current content, or the deletion marker.
    #[schema(value_type = String, example = "See you at eight?")]
    pub content: MessageContent,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Whether the content was edited after creation.
    pub edited: bool,
    /// Timestamp of the last edit.
    pub edited_at: Option<DateTime<Utc>>,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Whether the message was soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether `user` authored the message.
    pub fn is_sender(&self, user: &UserId) -> bool {
        self.sender_id == *user
    }

    /// Whether `user` received the message.
    pub fn is_receiver(&self, user: &UserId) -> bool {
        self.receiver_id == *user
    }

    /// Whether `user` is either participant.
    pub fn involves(&self, user: &UserId) -> bool {
        self.is_sender(user) || self.is_receiver(user)
    }
}

/// Message about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Identifier assigned by the dispatcher.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Recipient.
    pub receiver_id: UserId,
    /// Validated content.
    pub content: MessageContent,
    /// Creation timestamp taken from the gateway clock.
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// Materialise the persisted form.
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.content,
            created_at: self.created_at,
            edited: false,
            edited_at: None,
            deleted_at: None,
        }
    }
}

/// Receipt recording that `reader_id` has read `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    /// Message that was read.
    pub message_id: MessageId,
    /// Reader (always the message receiver).
    #[schema(value_type = String, format = Uuid)]
    pub reader_id: UserId,
    /// When the receipt was first recorded.
    pub read_at: DateTime<Utc>,
}

/// Result of an idempotent receipt insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptOutcome {
    /// The stored receipt, new or pre-existing.
    pub receipt: ReadReceipt,
    /// `true` only for the first insert.
    pub newly_created: bool,
}

/// Message returned by reconnection sync together with its receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncedMessage {
    /// The message itself.
    #[serde(flatten)]
    pub message: Message,
    /// Receipts recorded for the message.
    pub read_receipts: Vec<ReadReceipt>,
}
