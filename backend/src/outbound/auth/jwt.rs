//! HS256 JSON Web Token verification.
//!
//! Tokens are issued by the social platform's login flow and carry the user
//! id in `sub` and the expiry in `exp`. The gateway shares the signing secret
//! and never talks to the issuer.

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::ports::{CredentialError, CredentialVerifier, VerifiedCredential};
use crate::domain::UserId;

/// Claims carried by a gateway credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// User id.
    pub sub: String,
    /// Expiry as seconds since the Unix epoch.
    pub exp: i64,
    /// Issue time as seconds since the Unix epoch.
    #[serde(default)]
    pub iat: i64,
}

/// [`CredentialVerifier`] for HS256-signed tokens.
pub struct JwtCredentialVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtCredentialVerifier {
    /// Build a verifier for tokens signed with `secret`.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign a token for `user` valid for `lifetime` from `now`.
    ///
    /// Used by development tooling and tests; production tokens come from
    /// the platform.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Invalid`] if signing fails.
    pub fn issue(
        &self,
        user: &UserId,
        now: DateTime<Utc>,
        lifetime: TimeDelta,
    ) -> Result<String, CredentialError> {
        let claims = JwtClaims {
            sub: user.to_string(),
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| CredentialError::invalid(err.to_string()))
    }
}

impl CredentialVerifier for JwtCredentialVerifier {
    fn verify(&self, credential: &str) -> Result<VerifiedCredential, CredentialError> {
        let data = decode::<JwtClaims>(credential, &self.decoding, &self.validation).map_err(
            |err| match err.kind() {
                ErrorKind::ExpiredSignature => CredentialError::expired(),
                _ => {
                    debug!(error = %err, "credential rejected");
                    CredentialError::invalid(err.to_string())
                }
            },
        )?;
        let user_id = UserId::new(&data.claims.sub)
            .map_err(|err| CredentialError::invalid(format!("subject: {err}")))?;
        let expires_at = DateTime::from_timestamp(data.claims.exp, 0)
            .ok_or_else(|| CredentialError::invalid("expiry out of range"))?;
        Ok(VerifiedCredential {
            user_id,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn verifier() -> JwtCredentialVerifier {
        JwtCredentialVerifier::new(b"test-secret-with-enough-entropy")
    }

    #[rstest]
    fn issued_token_verifies(verifier: JwtCredentialVerifier) {
        let user = UserId::random();
        let token = verifier
            .issue(&user, Utc::now(), TimeDelta::hours(1))
            .expect("signed");

        let verified = verifier.verify(&token).expect("valid");
        assert_eq!(verified.user_id, user);
        assert!(verified.expires_at > Utc::now());
    }

    #[rstest]
    fn expired_token_is_reported_as_expired(verifier: JwtCredentialVerifier) {
        let token = verifier
            .issue(
                &UserId::random(),
                Utc::now() - TimeDelta::hours(2),
                TimeDelta::hours(1),
            )
            .expect("signed");

        assert_eq!(verifier.verify(&token), Err(CredentialError::Expired));
    }

    #[rstest]
    fn foreign_signature_is_invalid(verifier: JwtCredentialVerifier) {
        let other = JwtCredentialVerifier::new(b"some-other-secret");
        let token = other
            .issue(&UserId::random(), Utc::now(), TimeDelta::hours(1))
            .expect("signed");

        assert!(matches!(
            verifier.verify(&token),
            Err(CredentialError::Invalid { .. })
        ));
    }

    #[rstest]
    #[case("")]
    #[case("not-a-jwt")]
    #[case("a.b.c")]
    fn malformed_tokens_are_invalid(verifier: JwtCredentialVerifier, #[case] token: &str) {
        assert!(matches!(
            verifier.verify(token),
            Err(CredentialError::Invalid { .. })
        ));
    }

    #[rstest]
    fn non_uuid_subject_is_invalid(verifier: JwtCredentialVerifier) {
        let claims = JwtClaims {
            sub: "ada".to_owned(),
            exp: (Utc::now() + TimeDelta::hours(1)).timestamp(),
            iat: Utc::now().timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &verifier.encoding)
            .expect("signed");

        assert!(matches!(
            verifier.verify(&token),
            Err(CredentialError::Invalid { .. })
        ));
    }
}
