//! Authentication handshake.
//!
//! The first signal on every connection must carry a user id and a bearer
//! credential. The credential is authoritative: if it names a different user
//! than the one asserted, the verified subject is bound to the connection.

use std::sync::Arc;

use tracing::warn;

use super::ports::{CredentialError, CredentialVerifier};
use super::{Error, UserId};

/// Verifies `authenticate` signals.
#[derive(Clone)]
pub struct AuthenticationService {
    verifier: Arc<dyn CredentialVerifier>,
}

impl AuthenticationService {
    /// Wrap a credential verifier.
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { verifier }
    }

    /// Verify the handshake and return the identity to bind.
    ///
    /// Every failure maps to `authentication_failed`.
    pub fn authenticate(&self, asserted_user: &str, credential: &str) -> Result<UserId, Error> {
        let asserted_user = asserted_user.trim();
        let credential = credential.trim();
        if asserted_user.is_empty() || credential.is_empty() {
            return Err(Error::authentication_failed(
                "userId and token are required",
            ));
        }

        let verified = self.verify(credential)?;
        if asserted_user != verified.to_string() {
            warn!(
                asserted = asserted_user,
                verified = %verified,
                "asserted user id differs from credential subject; using credential subject"
            );
        }
        Ok(verified)
    }

    /// Verify a bare bearer credential, as presented to the HTTP API.
    pub fn authenticate_bearer(&self, credential: &str) -> Result<UserId, Error> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(Error::authentication_failed("bearer credential required"));
        }
        self.verify(credential)
    }

    fn verify(&self, credential: &str) -> Result<UserId, Error> {
        self.verifier
            .verify(credential)
            .map(|verified| verified.user_id)
            .map_err(|err| match err {
                CredentialError::Expired => Error::authentication_failed("credential expired"),
                CredentialError::Invalid { .. } => {
                    warn!(error = %err, "rejected credential");
                    Error::authentication_failed("invalid credential")
                }
            })
    }
}
