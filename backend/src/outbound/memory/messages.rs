//! In-memory message log.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{MessageRepository, MessageRepositoryError};
use crate::domain::{
    Message, MessageContent, MessageId, NewMessage, ReadReceipt, ReceiptOutcome, SyncedMessage,
    UserId,
};

#[derive(Default)]
struct Log {
    messages: HashMap<MessageId, Message>,
    receipts: HashMap<MessageId, Vec<ReadReceipt>>,
}

/// [`MessageRepository`] holding messages and receipts in process memory.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    log: Mutex<Log>,
}

impl InMemoryMessageRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.log().map(|log| log.messages.len()).unwrap_or_default()
    }

    /// Whether no message has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn log(&self) -> Result<MutexGuard<'_, Log>, MessageRepositoryError> {
        self.log
            .lock()
            .map_err(|_| MessageRepositoryError::connection("message log lock poisoned"))
    }

    fn mutate(
        &self,
        id: &MessageId,
        apply: impl FnOnce(&mut Message),
    ) -> Result<Message, MessageRepositoryError> {
        let mut log = self.log()?;
        let message = log
            .messages
            .get_mut(id)
            .ok_or_else(|| MessageRepositoryError::missing(id.to_string()))?;
        if message.is_deleted() {
            return Err(MessageRepositoryError::already_deleted(id.to_string()));
        }
        apply(message);
        Ok(message.clone())
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create(&self, message: &NewMessage) -> Result<Message, MessageRepositoryError> {
        let mut log = self.log()?;
        if log.messages.contains_key(&message.id) {
            return Err(MessageRepositoryError::query(format!(
                "duplicate message id {}",
                message.id
            )));
        }
        let stored = message.clone().into_message();
        log.messages.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find(&self, id: &MessageId) -> Result<Option<Message>, MessageRepositoryError> {
        Ok(self.log()?.messages.get(id).cloned())
    }

    async fn update_content(
        &self,
        id: &MessageId,
        content: &MessageContent,
        edited_at: DateTime<Utc>,
    ) -> Result<Message, MessageRepositoryError> {
        self.mutate(id, |message| {
            message.content = content.clone();
            message.edited = true;
            message.edited_at = Some(edited_at);
        })
    }

    async fn soft_delete(
        &self,
        id: &MessageId,
        deleted_at: DateTime<Utc>,
    ) -> Result<Message, MessageRepositoryError> {
        self.mutate(id, |message| {
            message.content = MessageContent::deleted_marker();
            message.deleted_at = Some(deleted_at);
        })
    }

    async fn create_read_receipt(
        &self,
        message_id: &MessageId,
        reader: &UserId,
        read_at: DateTime<Utc>,
    ) -> Result<ReceiptOutcome, MessageRepositoryError> {
        let mut log = self.log()?;
        if !log.messages.contains_key(message_id) {
            return Err(MessageRepositoryError::missing(message_id.to_string()));
        }
        let receipts = log.receipts.entry(*message_id).or_default();
        if let Some(existing) = receipts.iter().find(|r| r.reader_id == *reader) {
            return Ok(ReceiptOutcome {
                receipt: existing.clone(),
                newly_created: false,
            });
        }
        let receipt = ReadReceipt {
            message_id: *message_id,
            reader_id: *reader,
            read_at,
        };
        receipts.push(receipt.clone());
        Ok(ReceiptOutcome {
            receipt,
            newly_created: true,
        })
    }

    async fn messages_since(
        &self,
        user: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SyncedMessage>, MessageRepositoryError> {
        let log = self.log()?;
        let mut synced: Vec<SyncedMessage> = log
            .messages
            .values()
            .filter(|message| message.involves(user) && message.created_at > since)
            .map(|message| SyncedMessage {
                message: message.clone(),
                read_receipts: log.receipts.get(&message.id).cloned().unwrap_or_default(),
            })
            .collect();
        synced.sort_by(|a, b| {
            a.message
                .created_at
                .cmp(&b.message.created_at)
                .then_with(|| a.message.id.cmp(&b.message.id))
        });
        Ok(synced)
    }
}
