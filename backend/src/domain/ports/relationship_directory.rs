//! Port for the user and connection graph owned by the social platform.
//!
//! The gateway never edits relationships; it only asks whether two users may
//! exchange messages and how a sender should be named in push titles.

use async_trait::async_trait;

use crate::domain::UserId;

use super::define_port_error;

define_port_error! {
    /// Errors raised by relationship directory adapters.
    pub enum RelationshipDirectoryError {
        /// Backing store connection could not be established.
        Connection { message: String } => "relationship directory connection failed: {message}",
        /// Lookup failed during execution.
        Query { message: String } => "relationship directory query failed: {message}",
    }
}

/// Read-only view of users and their accepted connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationshipDirectory: Send + Sync {
    /// Whether the user exists at all.
    async fn user_exists(&self, user: &UserId) -> Result<bool, RelationshipDirectoryError>;

    /// Whether `a` and `b` hold an accepted connection in either direction.
    async fn are_connected(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<bool, RelationshipDirectoryError>;

    /// Display name used as the push notification title.
    async fn display_name(
        &self,
        user: &UserId,
    ) -> Result<Option<String>, RelationshipDirectoryError>;
}
