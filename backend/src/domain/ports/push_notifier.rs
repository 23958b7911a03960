//! Port for the external push delivery service.

use async_trait::async_trait;

use crate::domain::{MessageId, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by push adapters.
    pub enum PushNotifierError {
        /// The push service could not be reached.
        Transport { message: String } => "push transport failed: {message}",
        /// The push service answered with an unexpected status.
        Rejected { status: u16, message: String } => "push rejected with status {status}: {message}",
    }
}

/// Notification sent to an offline receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    /// Receiver's device token.
    pub device_token: String,
    /// Author of the message.
    pub sender_id: UserId,
    /// Title shown on the device, normally the sender's display name.
    pub sender_name: String,
    /// Leading characters of the message.
    pub preview: String,
    /// Message the notification refers to.
    pub message_id: MessageId,
}

/// Outcome reported by the push service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Accepted for delivery.
    Delivered,
    /// The device token is no longer valid and should be forgotten.
    InvalidToken,
}

/// Port for delivering new-message push notifications.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushNotifier: Send + Sync {
    /// Deliver a notification for a newly persisted message.
    async fn notify_new_message(
        &self,
        notification: &PushNotification,
    ) -> Result<PushOutcome, PushNotifierError>;
}

/// Notifier that accepts everything; used when no push endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPushNotifier;

#[async_trait]
impl PushNotifier for DisabledPushNotifier {
    async fn notify_new_message(
        &self,
        notification: &PushNotification,
    ) -> Result<PushOutcome, PushNotifierError> {
        tracing::debug!(
            message_id = %notification.message_id,
            "push endpoint not configured; dropping notification"
        );
        Ok(PushOutcome::Delivered)
    }
}
