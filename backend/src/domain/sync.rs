//! Reconnection catch-up.
//!
//! Stateless: the client supplies the timestamp of the newest message it
//! holds and receives everything strictly newer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::ports::{MessageRepository, MessageSync};
use super::{Error, SyncedMessage, UserId};

/// [`MessageSync`] backed by the message repository.
#[derive(Clone)]
pub struct SyncService {
    messages: Arc<dyn MessageRepository>,
}

impl SyncService {
    /// Create the service.
    pub fn new(messages: Arc<dyn MessageRepository>) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl MessageSync for SyncService {
    async fn sync(
        &self,
        user: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SyncedMessage>, Error> {
        let since = since.unwrap_or(DateTime::UNIX_EPOCH);
        let mut messages = self
            .messages
            .messages_since(user, since)
            .await
            .map_err(|err| {
                warn!(error = %err, user_id = %user, "sync query failed");
                Error::service_unavailable("message store unavailable")
            })?;
        // Ties on creation time are ordered by id.
        messages.sort_by(|a, b| {
            a.message
                .created_at
                .cmp(&b.message.created_at)
                .then_with(|| a.message.id.cmp(&b.message.id))
        });
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{MessageRepositoryError, MockMessageRepository};
    use crate::domain::{ErrorCode, MessageContent, MessageId, NewMessage};
    use chrono::TimeDelta;
    use mockall::predicate::{always, eq};
    use rstest::rstest;

    fn synced_at(user: UserId, created_at: DateTime<Utc>) -> SyncedMessage {
        SyncedMessage {
            message: NewMessage {
                id: MessageId::random(),
                sender_id: user,
                receiver_id: UserId::random(),
                content: MessageContent::new("hi").expect("valid content"),
                created_at,
            }
            .into_message(),
            read_receipts: Vec::new(),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn missing_since_defaults_to_epoch() {
        let user = UserId::random();
        let mut repo = MockMessageRepository::new();
        repo.expect_messages_since()
            .with(always(), eq(DateTime::UNIX_EPOCH))
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        let service = SyncService::new(Arc::new(repo));

        let messages = service.sync(&user, None).await.expect("sync succeeds");
        assert!(messages.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn results_are_ascending() {
        let user = UserId::random();
        let now = Utc::now();
        let newer = synced_at(user, now);
        let older = synced_at(user, now - TimeDelta::minutes(5));
        let unordered = vec![newer.clone(), older.clone()];
        let mut repo = MockMessageRepository::new();
        repo.expect_messages_since()
            .returning(move |_, _| Ok(unordered.clone()));
        let service = SyncService::new(Arc::new(repo));

        let messages = service
            .sync(&user, Some(now - TimeDelta::hours(1)))
            .await
            .expect("sync succeeds");
        assert_eq!(messages, vec![older, newer]);
    }

    #[rstest]
    #[tokio::test]
    async fn repository_failure_is_service_unavailable() {
        let mut repo = MockMessageRepository::new();
        repo.expect_messages_since()
            .returning(|_, _| Err(MessageRepositoryError::query("timeout")));
        let service = SyncService::new(Arc::new(repo));

        let err = service
            .sync(&UserId::random(), None)
            .await
            .expect_err("fails");
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
    }
}
