//! Domain primitives, services and ports.
//!
//! Purpose: hold the messaging gateway's behaviour independent of transport
//! and storage. Inbound adapters drive [`Gateway`] and [`ports::MessageSync`];
//! outbound adapters implement the traits in [`ports`].
//!
//! Public surface:
//! - Error (alias to `error::Error`): transport-agnostic failure payload.
//! - ErrorCode (alias to `error::ErrorCode`): stable error identifier.
//! - Gateway (alias to `gateway::Gateway`): command entry point for
//!   connection tasks.
//! - ConnectionRegistry: one live connection per identity.

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod gateway;
pub mod health;
pub mod message;
pub mod ports;
pub mod presence;
pub mod presence_service;
pub mod registry;
pub mod signals;
pub mod sync;
pub mod typing;
pub mod user;

pub use self::auth::AuthenticationService;
pub use self::config::{GatewayConfig, PUSH_PREVIEW_CHARS};
pub use self::dispatcher::{DispatcherPorts, MessageDispatcher, SendOutcome, SendRequest};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::events::{ConnectionCommand, DisconnectReason, GatewayEvent};
pub use self::gateway::{CommandReply, Gateway, GatewayCommand, GatewayPorts};
pub use self::health::{
    DependencyMonitor, DependencyStatus, HealthReport, HealthReporter, HealthStatus,
};
pub use self::message::{
    CorrelationId, DELETED_MESSAGE_MARKER, Message, MessageContent, MessageId,
    MessageValidationError, NewMessage, ReadReceipt, ReceiptOutcome, SyncedMessage,
};
pub use self::presence::{PresenceRecord, PresenceStatus};
pub use self::presence_service::{PresenceService, PresenceTiming, SweepReport};
pub use self::registry::{ConnectionHandle, ConnectionId, ConnectionReceiver, ConnectionRegistry};
pub use self::signals::MessageSignals;
pub use self::sync::SyncService;
pub use self::typing::TypingTracker;
pub use self::user::{UserId, UserValidationError};
