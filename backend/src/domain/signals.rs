//! Read receipts, edits and soft deletes.

use std::sync::Arc;

use mockable::Clock;
use serde_json::json;
use tracing::{info, warn};

use super::ports::{MessageRepository, MessageRepositoryError};
use super::{
    ConnectionRegistry, Error, GatewayEvent, Message, MessageContent, MessageId, ReadReceipt,
    UserId,
};

/// Handles per-message signals from participants.
pub struct MessageSignals {
    messages: Arc<dyn MessageRepository>,
    registry: Arc<ConnectionRegistry>,
    clock: Arc<dyn Clock>,
}

impl MessageSignals {
    /// Create the handler.
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        registry: Arc<ConnectionRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            messages,
            registry,
            clock,
        }
    }

    /// Record that `reader` read the message.
    ///
    /// Idempotent: repeats return the original receipt and notify nobody.
    pub async fn mark_read(&self, reader: UserId, message_id: MessageId) -> Result<ReadReceipt, Error> {
        let message = self.load(&message_id).await?;
        if !message.is_receiver(&reader) {
            return Err(Error::forbidden("only the receiver may mark a message read"));
        }

        let outcome = self
            .messages
            .create_read_receipt(&message_id, &reader, self.clock.utc())
            .await
            .map_err(map_repository_error)?;
        if outcome.newly_created {
            self.registry.deliver(
                &message.sender_id,
                GatewayEvent::MessageReadUpdate(outcome.receipt.clone()),
            );
        }
        Ok(outcome.receipt)
    }

    /// Replace the content of a message the editor sent.
    pub async fn edit(
        &self,
        editor: UserId,
        message_id: MessageId,
        content: String,
    ) -> Result<Message, Error> {
        let content =
            MessageContent::new(content).map_err(|err| Error::invalid_request(err.to_string()))?;
        let message = self.load(&message_id).await?;
        ensure_mutable(&message, &editor, "edit")?;

        let edited = self
            .messages
            .update_content(&message_id, &content, self.clock.utc())
            .await
            .map_err(map_repository_error)?;
        info!(message_id = %message_id, "message edited");
        self.notify_participants(&edited, GatewayEvent::MessageEdited(edited.clone()));
        Ok(edited)
    }

    /// Soft-delete a message the deleter sent.
    pub async fn delete(&self, deleter: UserId, message_id: MessageId) -> Result<Message, Error> {
        let message = self.load(&message_id).await?;
        ensure_mutable(&message, &deleter, "delete")?;

        let deleted = self
            .messages
            .soft_delete(&message_id, self.clock.utc())
            .await
            .map_err(map_repository_error)?;
        info!(message_id = %message_id, "message deleted");
        self.notify_participants(&deleted, GatewayEvent::MessageDeleted(deleted.clone()));
        Ok(deleted)
    }

    async fn load(&self, message_id: &MessageId) -> Result<Message, Error> {
        self.messages
            .find(message_id)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| Error::not_found("message not found"))
    }

    fn notify_participants(&self, message: &Message, event: GatewayEvent) {
        self.registry.deliver(&message.sender_id, event.clone());
        self.registry.deliver(&message.receiver_id, event);
    }
}

fn ensure_mutable(message: &Message, actor: &UserId, action: &str) -> Result<(), Error> {
    if !message.is_sender(actor) {
        return Err(Error::forbidden(format!(
            "only the sender may {action} a message"
        )));
    }
    if message.is_deleted() {
        return Err(already_deleted());
    }
    Ok(())
}

fn already_deleted() -> Error {
    Error::forbidden("message already deleted").with_details(json!({ "reason": "already_deleted" }))
}

fn map_repository_error(err: MessageRepositoryError) -> Error {
    match err {
        MessageRepositoryError::Missing { .. } => Error::not_found("message not found"),
        MessageRepositoryError::AlreadyDeleted { .. } => already_deleted(),
        other => {
            warn!(error = %other, "message repository failure");
            Error::service_unavailable("message store unavailable")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ConnectionCommand, ConnectionHandle, ConnectionReceiver, DELETED_MESSAGE_MARKER,
        ErrorCode, NewMessage, ReceiptOutcome,
    };
    use crate::domain::ports::MockMessageRepository;
    use crate::test_support::MutableClock;
    use chrono::Utc;
    use rstest::rstest;

    struct Harness {
        signals: MessageSignals,
        message: Message,
        sender_rx: ConnectionReceiver,
        receiver_rx: ConnectionReceiver,
    }

    fn sample_message() -> Message {
        NewMessage {
            id: MessageId::random(),
            sender_id: UserId::random(),
            receiver_id: UserId::random(),
            content: MessageContent::new("original").expect("valid content"),
            created_at: Utc::now(),
        }
        .into_message()
    }

    fn harness(message: Message, configure: impl FnOnce(&mut MockMessageRepository)) -> Harness {
        let clock = MutableClock::fixed();
        let registry = Arc::new(ConnectionRegistry::new(clock.clone()));
        let (sender_handle, sender_rx) = ConnectionHandle::channel();
        let (receiver_handle, receiver_rx) = ConnectionHandle::channel();
        registry.register(message.sender_id, sender_handle);
        registry.register(message.receiver_id, receiver_handle);

        let mut repo = MockMessageRepository::new();
        let stored = message.clone();
        repo.expect_find()
            .returning(move |id| Ok((*id == stored.id).then(|| stored.clone())));
        configure(&mut repo);

        Harness {
            signals: MessageSignals::new(Arc::new(repo), registry, clock),
            message,
            sender_rx,
            receiver_rx,
        }
    }

    fn receipt_for(message: &Message) -> ReadReceipt {
        ReadReceipt {
            message_id: message.id,
            reader_id: message.receiver_id,
            read_at: Utc::now(),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn first_read_notifies_sender() {
        let message = sample_message();
        let receipt = receipt_for(&message);
        let mut h = harness(message, |repo| {
            repo.expect_create_read_receipt().returning(move |_, _, _| {
                Ok(ReceiptOutcome {
                    receipt: receipt.clone(),
                    newly_created: true,
                })
            });
        });

        let stored = h
            .signals
            .mark_read(h.message.receiver_id, h.message.id)
            .await
            .expect("read recorded");

        assert_eq!(
            h.sender_rx.try_recv().expect("sender notified"),
            ConnectionCommand::Deliver(GatewayEvent::MessageReadUpdate(stored))
        );
    }

    #[rstest]
    #[tokio::test]
    async fn repeated_read_is_silent() {
        let message = sample_message();
        let receipt = receipt_for(&message);
        let mut h = harness(message, |repo| {
            repo.expect_create_read_receipt().returning(move |_, _, _| {
                Ok(ReceiptOutcome {
                    receipt: receipt.clone(),
                    newly_created: false,
                })
            });
        });

        h.signals
            .mark_read(h.message.receiver_id, h.message.id)
            .await
            .expect("idempotent");
        assert!(h.sender_rx.try_recv().is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn only_receiver_may_mark_read() {
        let message = sample_message();
        let h = harness(message, |repo| {
            repo.expect_create_read_receipt().never();
        });

        let err = h
            .signals
            .mark_read(h.message.sender_id, h.message.id)
            .await
            .expect_err("sender cannot mark read");
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_message_is_not_found() {
        let h = harness(sample_message(), |_| {});
        let err = h
            .signals
            .delete(h.message.sender_id, MessageId::random())
            .await
            .expect_err("missing");
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[rstest]
    #[tokio::test]
    async fn edit_notifies_both_rooms() {
        let message = sample_message();
        let mut edited = message.clone();
        edited.content = MessageContent::new("changed").expect("valid content");
        edited.edited = true;
        edited.edited_at = Some(Utc::now());
        let returned = edited.clone();
        let mut h = harness(message, move |repo| {
            repo.expect_update_content()
                .returning(move |_, _, _| Ok(returned.clone()));
        });

        let result = h
            .signals
            .edit(h.message.sender_id, h.message.id, "changed".to_owned())
            .await
            .expect("edited");

        assert_eq!(result, edited);
        let expected = ConnectionCommand::Deliver(GatewayEvent::MessageEdited(edited));
        assert_eq!(h.sender_rx.try_recv().expect("sender notified"), expected);
        assert_eq!(h.receiver_rx.try_recv().expect("receiver notified"), expected);
    }

    #[rstest]
    #[tokio::test]
    async fn receiver_cannot_edit() {
        let h = harness(sample_message(), |repo| {
            repo.expect_update_content().never();
        });
        let err = h
            .signals
            .edit(h.message.receiver_id, h.message.id, "nope".to_owned())
            .await
            .expect_err("forbidden");
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[rstest]
    #[tokio::test]
    async fn deleted_message_cannot_be_deleted_again() {
        let mut message = sample_message();
        message.content = MessageContent::deleted_marker();
        message.deleted_at = Some(Utc::now());
        let h = harness(message, |repo| {
            repo.expect_soft_delete().never();
            repo.expect_update_content().never();
        });

        let err = h
            .signals
            .delete(h.message.sender_id, h.message.id)
            .await
            .expect_err("second delete is forbidden");
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert_eq!(err.details(), Some(&json!({"reason": "already_deleted"})));

        let err = h
            .signals
            .edit(h.message.sender_id, h.message.id, "revive".to_owned())
            .await
            .expect_err("edit after delete is forbidden");
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[rstest]
    #[tokio::test]
    async fn delete_racing_another_delete_is_already_deleted() {
        let message = sample_message();
        let mut h = harness(message, |repo| {
            repo.expect_soft_delete()
                .returning(|id, _| Err(MessageRepositoryError::already_deleted(id.to_string())));
            repo.expect_update_content()
                .returning(|id, _, _| Err(MessageRepositoryError::already_deleted(id.to_string())));
        });

        let err = h
            .signals
            .delete(h.message.sender_id, h.message.id)
            .await
            .expect_err("lost the race");
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert_eq!(err.details(), Some(&json!({"reason": "already_deleted"})));

        let err = h
            .signals
            .edit(h.message.sender_id, h.message.id, "late edit".to_owned())
            .await
            .expect_err("lost the race");
        assert_eq!(err.details(), Some(&json!({"reason": "already_deleted"})));
        assert!(h.receiver_rx.try_recv().is_err(), "nothing broadcast");
    }

    #[rstest]
    #[tokio::test]
    async fn delete_replaces_content_with_marker() {
        let message = sample_message();
        let mut deleted = message.clone();
        deleted.content = MessageContent::deleted_marker();
        deleted.deleted_at = Some(Utc::now());
        let returned = deleted.clone();
        let mut h = harness(message, move |repo| {
            repo.expect_soft_delete()
                .returning(move |_, _| Ok(returned.clone()));
        });

        let result = h
            .signals
            .delete(h.message.sender_id, h.message.id)
            .await
            .expect("deleted");

        assert_eq!(result.content.as_str(), DELETED_MESSAGE_MARKER);
        assert!(h.receiver_rx.try_recv().is_ok());
        assert!(h.sender_rx.try_recv().is_ok());
    }
}
