//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod cache_error;
mod credential_verifier;
mod dedup_store;
mod device_token_repository;
mod message_repository;
mod message_sync;
mod presence_store;
mod push_notifier;
mod rate_limit_store;
mod relationship_directory;

pub use cache_error::CacheError;
#[cfg(test)]
pub use credential_verifier::MockCredentialVerifier;
pub use credential_verifier::{CredentialError, CredentialVerifier, VerifiedCredential};
#[cfg(test)]
pub use dedup_store::MockDedupStore;
pub use dedup_store::{DedupClaim, DedupStore};
#[cfg(test)]
pub use device_token_repository::MockDeviceTokenRepository;
pub use device_token_repository::{DeviceTokenRepository, DeviceTokenRepositoryError};
#[cfg(test)]
pub use message_repository::MockMessageRepository;
pub use message_repository::{MessageRepository, MessageRepositoryError};
#[cfg(test)]
pub use message_sync::MockMessageSync;
pub use message_sync::MessageSync;
#[cfg(test)]
pub use presence_store::MockPresenceStore;
pub use presence_store::PresenceStore;
#[cfg(test)]
pub use push_notifier::MockPushNotifier;
pub use push_notifier::{
    DisabledPushNotifier, PushNotification, PushNotifier, PushNotifierError, PushOutcome,
};
#[cfg(test)]
pub use rate_limit_store::MockRateLimitStore;
pub use rate_limit_store::{RateLimitStore, RateWindow};
#[cfg(test)]
pub use relationship_directory::MockRelationshipDirectory;
pub use relationship_directory::{RelationshipDirectory, RelationshipDirectoryError};
