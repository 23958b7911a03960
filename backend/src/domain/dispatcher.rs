//! Message send pipeline.
//!
//! A send is validated, authorised, rate limited, deduplicated, persisted,
//! fanned out and, for offline receivers, pushed. Steps run strictly in that
//! order; a rejection at any step prevents every later one.

use std::sync::Arc;

use mockable::Clock;
use tracing::{debug, info, warn};

use super::ports::{
    DedupClaim, DedupStore, DeviceTokenRepository, MessageRepository, PresenceStore,
    PushNotification, PushNotifier, PushOutcome, RateLimitStore, RelationshipDirectory,
};
use super::{
    ConnectionRegistry, CorrelationId, Error, GatewayConfig, GatewayEvent, Message,
    MessageContent, MessageId, NewMessage, PUSH_PREVIEW_CHARS, PresenceStatus, UserId,
};

/// Title used when the sender's display name cannot be resolved.
const FALLBACK_PUSH_TITLE: &str = "New message";

/// A client's request to send a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Intended recipient.
    pub receiver_id: UserId,
    /// Raw content, validated by the dispatcher.
    pub content: String,
    /// Client retry key.
    pub correlation_id: Option<String>,
}

/// Successful send result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// First delivery of this correlation id.
    Delivered {
        /// The persisted message.
        message: Message,
        /// Key the send was deduplicated under.
        correlation_id: CorrelationId,
    },
    /// A retry of an earlier send; nothing was persisted or broadcast.
    Duplicate {
        /// Original message id, unless the first attempt is still in flight.
        message_id: Option<MessageId>,
        /// Key the send was deduplicated under.
        correlation_id: CorrelationId,
    },
}

/// Ports the dispatcher depends on.
#[derive(Clone)]
pub struct DispatcherPorts {
    /// Relationship and user lookups.
    pub directory: Arc<dyn RelationshipDirectory>,
    /// Durable message log.
    pub messages: Arc<dyn MessageRepository>,
    /// Per-sender counters.
    pub rate_limits: Arc<dyn RateLimitStore>,
    /// Correlation markers.
    pub dedup: Arc<dyn DedupStore>,
    /// Receiver device tokens.
    pub device_tokens: Arc<dyn DeviceTokenRepository>,
    /// Push delivery service.
    pub push: Arc<dyn PushNotifier>,
}

/// Runs the send pipeline.
pub struct MessageDispatcher {
    ports: DispatcherPorts,
    presence: Arc<dyn PresenceStore>,
    registry: Arc<ConnectionRegistry>,
    clock: Arc<dyn Clock>,
    config: GatewayConfig,
}

impl MessageDispatcher {
    /// Create a dispatcher. `presence` decides whether a receiver counts as
    /// online anywhere in the cluster.
    pub fn new(
        ports: DispatcherPorts,
        presence: Arc<dyn PresenceStore>,
        registry: Arc<ConnectionRegistry>,
        clock: Arc<dyn Clock>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            ports,
            presence,
            registry,
            clock,
            config,
        }
    }

    /// Send a message from `sender`.
    pub async fn send_message(
        &self,
        sender: UserId,
        request: SendRequest,
    ) -> Result<SendOutcome, Error> {
        let content = MessageContent::new(request.content)
            .map_err(|err| Error::invalid_request(err.to_string()))?;
        let correlation_id = self.correlation_id(request.correlation_id)?;
        let receiver = request.receiver_id;

        self.authorise(&sender, &receiver).await?;
        self.enforce_rate_limit(&sender).await?;

        let claimed = match self
            .ports
            .dedup
            .claim(&sender, &correlation_id, self.config.dedup_ttl)
            .await
        {
            Ok(DedupClaim::Claimed) => true,
            Ok(DedupClaim::Duplicate(message_id)) => {
                info!(
                    sender = %sender,
                    correlation_id = %correlation_id,
                    "duplicate send suppressed"
                );
                return Ok(SendOutcome::Duplicate {
                    message_id,
                    correlation_id,
                });
            }
            Err(err) => {
                warn!(error = %err, "dedup store unavailable; sending without deduplication");
                false
            }
        };

        let new_message = NewMessage {
            id: MessageId::random(),
            sender_id: sender,
            receiver_id: receiver,
            content,
            created_at: self.clock.utc(),
        };
        let message = match self.ports.messages.create(&new_message).await {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, sender = %sender, "failed to persist message");
                if claimed {
                    self.release_claim(&sender, &correlation_id).await;
                }
                return Err(Error::service_unavailable("message could not be stored"));
            }
        };

        if claimed {
            if let Err(err) = self
                .ports
                .dedup
                .record(&sender, &correlation_id, &message.id, self.config.dedup_ttl)
                .await
            {
                warn!(error = %err, message_id = %message.id, "failed to record dedup marker");
            }
        }

        self.fan_out(&message, &correlation_id);
        if self.config.push_fallback_enabled && !self.receiver_online(&receiver).await {
            self.push_offline(&message).await;
        }

        Ok(SendOutcome::Delivered {
            message,
            correlation_id,
        })
    }

    fn correlation_id(&self, raw: Option<String>) -> Result<CorrelationId, Error> {
        match raw {
            Some(raw) => {
                CorrelationId::new(raw).map_err(|err| Error::invalid_request(err.to_string()))
            }
            None if self.config.require_correlation_id => {
                Err(Error::invalid_request("correlationId is required"))
            }
            None => Ok(CorrelationId::generated()),
        }
    }

    async fn authorise(&self, sender: &UserId, receiver: &UserId) -> Result<(), Error> {
        let exists = self
            .ports
            .directory
            .user_exists(receiver)
            .await
            .map_err(|err| {
                warn!(error = %err, "relationship directory unavailable");
                Error::service_unavailable("relationship directory unavailable")
            })?;
        if !exists {
            return Err(Error::not_found("receiver not found"));
        }

        let connected = self
            .ports
            .directory
            .are_connected(sender, receiver)
            .await
            .map_err(|err| {
                warn!(error = %err, "relationship directory unavailable");
                Error::service_unavailable("relationship directory unavailable")
            })?;
        if connected {
            Ok(())
        } else {
            Err(Error::forbidden("users are not connected"))
        }
    }

    async fn enforce_rate_limit(&self, sender: &UserId) -> Result<(), Error> {
        if !self.config.rate_limit_enabled {
            return Ok(());
        }
        let window = match self
            .ports
            .rate_limits
            .increment(sender, self.config.rate_window)
            .await
        {
            Ok(window) => window,
            Err(err) => {
                warn!(error = %err, "rate limit store unavailable; allowing send");
                return Ok(());
            }
        };
        if window.count <= self.config.rate_limit {
            return Ok(());
        }

        let error = Error::rate_limited(window.resets_in);
        let retry_after_secs = error.retry_after_secs().unwrap_or(1);
        warn!(sender = %sender, count = window.count, "rate limit exceeded");
        self.registry
            .deliver(sender, GatewayEvent::RateLimitExceeded { retry_after_secs });
        Err(error)
    }

    async fn release_claim(&self, sender: &UserId, correlation_id: &CorrelationId) {
        if let Err(err) = self.ports.dedup.release(sender, correlation_id).await {
            warn!(error = %err, correlation_id = %correlation_id, "failed to release dedup marker");
        }
    }

    fn fan_out(&self, message: &Message, correlation_id: &CorrelationId) {
        self.registry
            .deliver(&message.receiver_id, GatewayEvent::NewMessage(message.clone()));
        self.registry.deliver(
            &message.sender_id,
            GatewayEvent::MessageSent {
                message_id: message.id,
                correlation_id: correlation_id.to_string(),
                receiver_id: message.receiver_id,
                created_at: message.created_at,
            },
        );
    }

    /// Push to an offline receiver. Failures are logged, never returned.
    /// Online when connected to this node or when the shared presence record
    /// says so. Falls back to the local registry alone if the cache fails.
    async fn receiver_online(&self, receiver: &UserId) -> bool {
        if self.registry.is_registered(receiver) {
            return true;
        }
        match self.presence.presence(receiver).await {
            Ok(record) => record.is_some_and(|record| record.status == PresenceStatus::Online),
            Err(err) => {
                warn!(error = %err, receiver = %receiver, "presence lookup failed; using local registry");
                false
            }
        }
    }

    async fn push_offline(&self, message: &Message) {
        let receiver = &message.receiver_id;
        let device_token = match self.ports.device_tokens.device_token(receiver).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(receiver = %receiver, "receiver offline without device token");
                return;
            }
            Err(err) => {
                warn!(error = %err, receiver = %receiver, "device token lookup failed");
                return;
            }
        };

        let sender_name = match self.ports.directory.display_name(&message.sender_id).await {
            Ok(Some(name)) => name,
            Ok(None) => FALLBACK_PUSH_TITLE.to_owned(),
            Err(err) => {
                warn!(error = %err, "display name lookup failed; using generic title");
                FALLBACK_PUSH_TITLE.to_owned()
            }
        };

        let notification = PushNotification {
            device_token,
            sender_id: message.sender_id,
            sender_name,
            preview: message.content.preview(PUSH_PREVIEW_CHARS),
            message_id: message.id,
        };
        match self.ports.push.notify_new_message(&notification).await {
            Ok(PushOutcome::Delivered) => {
                debug!(message_id = %message.id, "push notification delivered");
            }
            Ok(PushOutcome::InvalidToken) => {
                info!(receiver = %receiver, "push token rejected; clearing");
                if let Err(err) = self.ports.device_tokens.clear_device_token(receiver).await {
                    warn!(error = %err, receiver = %receiver, "failed to clear device token");
                }
            }
            Err(err) => {
                warn!(error = %err, message_id = %message.id, "push notification failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
