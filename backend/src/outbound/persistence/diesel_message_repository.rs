//! PostgreSQL-backed [`MessageRepository`].
//!
//! Edits and soft deletes use `UPDATE ... RETURNING` so the caller receives
//! the stored row. Both only match rows whose `deleted_at` is still null, so
//! a concurrent delete cannot be overwritten. Read receipts rely on the `(message_id, reader_id)`
//! primary key with `ON CONFLICT DO NOTHING` for idempotency.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{MessageRepository, MessageRepositoryError};
use crate::domain::{
    Message, MessageContent, MessageId, NewMessage, ReadReceipt, ReceiptOutcome, SyncedMessage,
    UserId,
};

use super::error_mapping::{DieselFailure, classify, map_basic_diesel_error, map_pool_error};
use super::models::{MessageRow, NewMessageRow, ReadReceiptRow};
use super::pool::DbPool;
use super::schema::{messages, read_receipts};

/// Diesel implementation of the message log.
#[derive(Clone)]
pub struct DieselMessageRepository {
    pool: DbPool,
}

impl DieselMessageRepository {
    /// Create a repository over `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_diesel_error(error: diesel::result::Error) -> MessageRepositoryError {
    map_basic_diesel_error(
        error,
        MessageRepositoryError::query,
        MessageRepositoryError::connection,
    )
}

fn row_to_message(row: MessageRow) -> Result<Message, MessageRepositoryError> {
    let content = MessageContent::new(row.content).map_err(|err| {
        MessageRepositoryError::query(format!("stored content of {} is invalid: {err}", row.id))
    })?;
    Ok(Message {
        id: MessageId::from_uuid(row.id),
        sender_id: UserId::from_uuid(row.sender_id),
        receiver_id: UserId::from_uuid(row.receiver_id),
        content,
        created_at: row.created_at,
        edited: row.edited,
        edited_at: row.edited_at,
        deleted_at: row.deleted_at,
    })
}

fn row_to_receipt(row: ReadReceiptRow) -> ReadReceipt {
    ReadReceipt {
        message_id: MessageId::from_uuid(row.message_id),
        reader_id: UserId::from_uuid(row.reader_id),
        read_at: row.read_at,
    }
}

/// Error for a guarded update that matched no row. `deleted_at` is the
/// current tombstone of the target: `None` when the row does not exist.
fn unmatched_update(
    id: &MessageId,
    deleted_at: Option<Option<DateTime<Utc>>>,
) -> MessageRepositoryError {
    match deleted_at {
        None => MessageRepositoryError::missing(id.to_string()),
        Some(_) => MessageRepositoryError::already_deleted(id.to_string()),
    }
}

async fn updated_or_unmatched(
    conn: &mut AsyncPgConnection,
    id: &MessageId,
    row: Option<MessageRow>,
) -> Result<Message, MessageRepositoryError> {
    if let Some(row) = row {
        return row_to_message(row);
    }
    let deleted_at: Option<Option<DateTime<Utc>>> = messages::table
        .filter(messages::id.eq(id.as_uuid()))
        .select(messages::deleted_at)
        .first(conn)
        .await
        .optional()
        .map_err(map_diesel_error)?;
    Err(unmatched_update(id, deleted_at))
}

#[async_trait]
impl MessageRepository for DieselMessageRepository {
    async fn create(&self, message: &NewMessage) -> Result<Message, MessageRepositoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, MessageRepositoryError::connection))?;
        let row = diesel::insert_into(messages::table)
            .values(NewMessageRow {
                id: *message.id.as_uuid(),
                sender_id: *message.sender_id.as_uuid(),
                receiver_id: *message.receiver_id.as_uuid(),
                content: message.content.as_str(),
                created_at: message.created_at,
            })
            .returning(MessageRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_message(row)
    }

    async fn find(&self, id: &MessageId) -> Result<Option<Message>, MessageRepositoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, MessageRepositoryError::connection))?;
        let row: Option<MessageRow> = messages::table
            .filter(messages::id.eq(id.as_uuid()))
            .select(MessageRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_message).transpose()
    }

    async fn update_content(
        &self,
        id: &MessageId,
        content: &MessageContent,
        edited_at: DateTime<Utc>,
    ) -> Result<Message, MessageRepositoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, MessageRepositoryError::connection))?;
        let target = messages::table
            .filter(messages::id.eq(id.as_uuid()))
            .filter(messages::deleted_at.is_null());
        let row = diesel::update(target)
            .set((
                messages::content.eq(content.as_str()),
                messages::edited.eq(true),
                messages::edited_at.eq(Some(edited_at)),
            ))
            .returning(MessageRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        updated_or_unmatched(&mut conn, id, row).await
    }

    async fn soft_delete(
        &self,
        id: &MessageId,
        deleted_at: DateTime<Utc>,
    ) -> Result<Message, MessageRepositoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, MessageRepositoryError::connection))?;
        let marker = MessageContent::deleted_marker();
        let target = messages::table
            .filter(messages::id.eq(id.as_uuid()))
            .filter(messages::deleted_at.is_null());
        let row = diesel::update(target)
            .set((
                messages::content.eq(marker.as_str()),
                messages::deleted_at.eq(Some(deleted_at)),
            ))
            .returning(MessageRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        updated_or_unmatched(&mut conn, id, row).await
    }

    async fn create_read_receipt(
        &self,
        message_id: &MessageId,
        reader: &UserId,
        read_at: DateTime<Utc>,
    ) -> Result<ReceiptOutcome, MessageRepositoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, MessageRepositoryError::connection))?;
        let inserted: Option<ReadReceiptRow> = diesel::insert_into(read_receipts::table)
            .values(ReadReceiptRow {
                message_id: *message_id.as_uuid(),
                reader_id: *reader.as_uuid(),
                read_at,
            })
            .on_conflict((read_receipts::message_id, read_receipts::reader_id))
            .do_nothing()
            .returning(ReadReceiptRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(|err| match classify(&err) {
                DieselFailure::ForeignKey => MessageRepositoryError::missing(message_id.to_string()),
                _ => map_diesel_error(err),
            })?;

        if let Some(row) = inserted {
            return Ok(ReceiptOutcome {
                receipt: row_to_receipt(row),
                newly_created: true,
            });
        }

        let existing: ReadReceiptRow = read_receipts::table
            .filter(
                read_receipts::message_id
                    .eq(message_id.as_uuid())
                    .and(read_receipts::reader_id.eq(reader.as_uuid())),
            )
            .select(ReadReceiptRow::as_select())
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(ReceiptOutcome {
            receipt: row_to_receipt(existing),
            newly_created: false,
        })
    }

    async fn messages_since(
        &self,
        user: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SyncedMessage>, MessageRepositoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, MessageRepositoryError::connection))?;
        let user_uuid = *user.as_uuid();
        let rows: Vec<MessageRow> = messages::table
            .filter(
                messages::sender_id
                    .eq(user_uuid)
                    .or(messages::receiver_id.eq(user_uuid)),
            )
            .filter(messages::created_at.gt(since))
            .order((messages::created_at.asc(), messages::id.asc()))
            .select(MessageRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let receipt_rows: Vec<ReadReceiptRow> = read_receipts::table
            .filter(read_receipts::message_id.eq_any(&ids))
            .order(read_receipts::read_at.asc())
            .select(ReadReceiptRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let mut receipts: HashMap<Uuid, Vec<ReadReceipt>> = HashMap::new();
        for row in receipt_rows {
            receipts
                .entry(row.message_id)
                .or_default()
                .push(row_to_receipt(row));
        }

        rows.into_iter()
            .map(|row| {
                let read_receipts = receipts.remove(&row.id).unwrap_or_default();
                row_to_message(row).map(|message| SyncedMessage {
                    message,
                    read_receipts,
                })
            })
            .collect()
    }
}
