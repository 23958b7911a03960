//! Gateway facade driven by the WebSocket adapter.
//!
//! Bundles the domain services behind one command entry point so a
//! connection task only deals in [`GatewayCommand`]s and [`CommandReply`]s.

use std::sync::Arc;

use mockable::Clock;

use super::ports::{CredentialVerifier, PresenceStore};
use super::{
    AuthenticationService, ConnectionHandle, ConnectionId, ConnectionRegistry, DependencyMonitor,
    DispatcherPorts, Error, GatewayConfig, HealthReport, HealthReporter, Message,
    MessageDispatcher, MessageId, MessageSignals, PresenceService, PresenceTiming, ReadReceipt,
    SendOutcome, SendRequest, TypingTracker, UserId,
};

/// Authenticated command from a connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCommand {
    /// `NEW_MESSAGE`.
    SendMessage(SendRequest),
    /// `TYPING_START`.
    TypingStart {
        /// Who the typist is writing to.
        receiver_id: UserId,
    },
    /// `TYPING_STOP`.
    TypingStop {
        /// Who the typist was writing to.
        receiver_id: UserId,
    },
    /// `MESSAGE_READ`.
    MarkRead {
        /// Message that was read.
        message_id: MessageId,
    },
    /// `EDIT_MESSAGE`.
    Edit {
        /// Message to edit.
        message_id: MessageId,
        /// Replacement content.
        content: String,
    },
    /// `DELETE_MESSAGE`.
    Delete {
        /// Message to delete.
        message_id: MessageId,
    },
    /// `GET_ONLINE_USERS`.
    GetOnlineUsers,
    /// `HEALTH_CHECK`.
    HealthCheck,
}

/// Successful command result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    /// Result of a send, first delivery or duplicate.
    Sent(SendOutcome),
    /// Typing indicator updated.
    Typing {
        /// Whether an indicator is now active.
        is_typing: bool,
    },
    /// Receipt stored (or already present).
    Receipt(ReadReceipt),
    /// Message after the edit.
    Edited(Message),
    /// Message after the soft delete.
    Deleted(Message),
    /// Users currently online.
    OnlineUsers(Vec<UserId>),
    /// Health snapshot.
    Health(HealthReport),
}

/// Adapters the gateway is assembled from.
#[derive(Clone)]
pub struct GatewayPorts {
    /// Bearer credential verification.
    pub credentials: Arc<dyn CredentialVerifier>,
    /// Presence state in the shared cache.
    pub presence: Arc<dyn PresenceStore>,
    /// Everything the send pipeline needs.
    pub dispatch: DispatcherPorts,
}

/// Entry point for connection tasks.
pub struct Gateway {
    auth: AuthenticationService,
    presence: Arc<PresenceService>,
    dispatcher: MessageDispatcher,
    signals: MessageSignals,
    typing: Arc<TypingTracker>,
    health: HealthReporter,
    registry: Arc<ConnectionRegistry>,
    config: GatewayConfig,
}

impl Gateway {
    /// Wire the domain services over the given adapters.
    pub fn new(ports: GatewayPorts, clock: Arc<dyn Clock>, config: GatewayConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(clock.clone()));
        let monitor = Arc::new(DependencyMonitor::new());
        let presence = Arc::new(PresenceService::new(
            registry.clone(),
            ports.presence.clone(),
            monitor.clone(),
            clock.clone(),
            PresenceTiming {
                presence_ttl: config.presence_ttl,
                inactivity_threshold: config.inactivity_threshold,
                reap_interval: config.reap_interval,
            },
        ));
        let signals = MessageSignals::new(
            ports.dispatch.messages.clone(),
            registry.clone(),
            clock.clone(),
        );
        let dispatcher = MessageDispatcher::new(
            ports.dispatch,
            ports.presence.clone(),
            registry.clone(),
            clock,
            config.clone(),
        );
        Self {
            auth: AuthenticationService::new(ports.credentials),
            typing: Arc::new(TypingTracker::new(registry.clone(), config.typing_expiry)),
            health: HealthReporter::new(registry.clone(), ports.presence, monitor),
            presence,
            dispatcher,
            signals,
            registry,
            config,
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Connection registry shared by the services.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Presence service, used to start the sweep.
    pub fn presence(&self) -> &Arc<PresenceService> {
        &self.presence
    }

    /// Verify an `authenticate` signal.
    pub fn authenticate(&self, asserted_user: &str, credential: &str) -> Result<UserId, Error> {
        self.auth.authenticate(asserted_user, credential)
    }

    /// Register an authenticated connection.
    pub async fn connect(&self, user: UserId, handle: ConnectionHandle) {
        self.presence.connect(user, handle).await;
    }

    /// Tear down a connection and clear its typing indicators.
    pub async fn disconnect(&self, user: &UserId, connection: ConnectionId) {
        if self.presence.disconnect(user, connection).await {
            self.typing.stop_all(*user);
        }
    }

    /// Record inbound activity for the inactivity sweep.
    pub fn touch(&self, user: &UserId, connection: ConnectionId) {
        self.registry.touch(user, connection);
    }

    /// Health snapshot.
    pub async fn health(&self) -> HealthReport {
        self.health.report().await
    }

    /// Execute a command on behalf of `user`.
    pub async fn handle(&self, user: UserId, command: GatewayCommand) -> Result<CommandReply, Error> {
        match command {
            GatewayCommand::SendMessage(request) => self
                .dispatcher
                .send_message(user, request)
                .await
                .map(CommandReply::Sent),
            GatewayCommand::TypingStart { receiver_id } => {
                self.typing.start(user, receiver_id);
                Ok(CommandReply::Typing { is_typing: true })
            }
            GatewayCommand::TypingStop { receiver_id } => {
                self.typing.stop(user, receiver_id);
                Ok(CommandReply::Typing { is_typing: false })
            }
            GatewayCommand::MarkRead { message_id } => self
                .signals
                .mark_read(user, message_id)
                .await
                .map(CommandReply::Receipt),
            GatewayCommand::Edit {
                message_id,
                content,
            } => self
                .signals
                .edit(user, message_id, content)
                .await
                .map(CommandReply::Edited),
            GatewayCommand::Delete { message_id } => self
                .signals
                .delete(user, message_id)
                .await
                .map(CommandReply::Deleted),
            GatewayCommand::GetOnlineUsers => {
                Ok(CommandReply::OnlineUsers(self.presence.online_users().await))
            }
            GatewayCommand::HealthCheck => Ok(CommandReply::Health(self.health().await)),
        }
    }
}
