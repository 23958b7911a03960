//! Port for verifying bearer credentials.

use chrono::{DateTime, Utc};

use crate::domain::UserId;

use super::define_port_error;

define_port_error! {
    /// Reasons a credential is rejected.
    pub enum CredentialError {
        /// The credential could not be decoded or its signature is wrong.
        Invalid { message: String } => "credential invalid: {message}",
        /// The credential was valid but has expired.
        Expired => "credential expired",
    }
}

/// Identity proven by a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    /// Subject of the credential.
    pub user_id: UserId,
    /// Expiry claimed by the credential.
    pub expires_at: DateTime<Utc>,
}

/// Verifies signed, time-bound credentials.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialVerifier: Send + Sync {
    /// Verify `credential` and return the identity it proves.
    fn verify(&self, credential: &str) -> Result<VerifiedCredential, CredentialError>;
}
