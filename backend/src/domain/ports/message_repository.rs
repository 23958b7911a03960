//! Port abstraction for the durable message log.
//!
//! Adapters own message rows and read receipts. Messages are never removed;
//! soft deletion replaces their content and stamps `deleted_at`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Message, MessageContent, MessageId, NewMessage, ReceiptOutcome, SyncedMessage, UserId,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by message repository adapters.
    pub enum MessageRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "message repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "message repository query failed: {message}",
        /// A mutation targeted a message that does not exist.
        Missing { message_id: String } => "message {message_id} does not exist",
        /// A mutation targeted a message that was already soft-deleted.
        AlreadyDeleted { message_id: String } => "message {message_id} is already deleted",
    }
}

/// Port for persisting and reading messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a new message and return the stored row.
    async fn create(&self, message: &NewMessage) -> Result<Message, MessageRepositoryError>;

    /// Fetch a message by id.
    async fn find(&self, id: &MessageId) -> Result<Option<Message>, MessageRepositoryError>;

    /// Replace the content and mark the message as edited. Soft-deleted
    /// messages are left untouched and yield `AlreadyDeleted`.
    async fn update_content(
        &self,
        id: &MessageId,
        content: &MessageContent,
        edited_at: DateTime<Utc>,
    ) -> Result<Message, MessageRepositoryError>;

    /// Replace the content with the deletion marker and stamp `deleted_at`.
    /// Deleting twice yields `AlreadyDeleted`.
    async fn soft_delete(
        &self,
        id: &MessageId,
        deleted_at: DateTime<Utc>,
    ) -> Result<Message, MessageRepositoryError>;

    /// Insert a read receipt unless one already exists for the pair.
    ///
    /// Returns the existing receipt with `newly_created == false` on repeats.
    async fn create_read_receipt(
        &self,
        message_id: &MessageId,
        reader: &UserId,
        read_at: DateTime<Utc>,
    ) -> Result<ReceiptOutcome, MessageRepositoryError>;

    /// Messages the user sent or received strictly after `since`, oldest
    /// first, with their receipts.
    async fn messages_since(
        &self,
        user: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SyncedMessage>, MessageRepositoryError>;
}
