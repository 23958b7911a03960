//! Credential verification adapters.

mod jwt;

pub use jwt::{JwtClaims, JwtCredentialVerifier};
