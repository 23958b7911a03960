//! Bearer authentication for HTTP handlers.
//!
//! Keeps handlers focused on request/response mapping by resolving the
//! `Authorization: Bearer <credential>` header to a verified identity.

use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use futures_util::future::{Ready, ready};

use crate::domain::{Error, UserId};

use super::state::HttpState;

/// Identity proven by the request's bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BearerIdentity(pub UserId);

impl BearerIdentity {
    /// The verified user.
    pub fn user_id(&self) -> UserId {
        self.0
    }
}

fn bearer_token(req: &HttpRequest) -> Result<&str, Error> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| Error::authentication_failed("bearer credential required"))?;
    let value = header
        .to_str()
        .map_err(|_| Error::authentication_failed("malformed Authorization header"))?;
    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| Error::authentication_failed("malformed Authorization header"))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(Error::authentication_failed(
            "Authorization scheme must be Bearer",
        ));
    }
    Ok(token)
}

fn resolve(req: &HttpRequest) -> Result<BearerIdentity, Error> {
    let state = req
        .app_data::<web::Data<HttpState>>()
        .ok_or_else(|| Error::internal("HTTP state not configured"))?;
    let token = bearer_token(req)?;
    state.auth.authenticate_bearer(token).map(BearerIdentity)
}

impl FromRequest for BearerIdentity {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(resolve(req))
    }
}
