//! WebSocket inbound adapter bridging client frames to the gateway.
//!
//! Responsibilities:
//! - validate upgrade requests against the configured `Origin` allow-list
//! - spawn one task per connection running the session loop
//! - keep WebSocket-specific concerns at the edge of the system

use actix_web::http::header::{HeaderValue, ORIGIN};
use actix_web::web::{self, Payload};
use actix_web::{HttpRequest, HttpResponse, get};
use tracing::{error, warn};
use url::Url;

mod session;

pub mod messages;
pub mod state;

pub use state::{AllowedOrigins, OriginPattern, WsState};

/// Handle WebSocket upgrade for the `/ws` endpoint.
#[get("/ws")]
pub async fn ws_entry(
    state: web::Data<WsState>,
    req: HttpRequest,
    stream: Payload,
) -> actix_web::Result<HttpResponse> {
    let mut origin_iter = req.headers().get_all(ORIGIN);
    match origin_iter.next() {
        Some(origin_header) => {
            if origin_iter.next().is_some() {
                error!("multiple Origin headers on WebSocket upgrade");
                return Err(actix_web::error::ErrorBadRequest("Invalid Origin header"));
            }
            validate_origin(&state.origins, origin_header)?;
        }
        None if state.origins.allows_missing() => {}
        None => {
            warn!("missing Origin header on WebSocket upgrade");
            return Err(actix_web::error::ErrorForbidden("Origin not allowed"));
        }
    }

    let (response, session, messages) = actix_ws::handle(&req, stream).map_err(|error| {
        error!(error = %error, "WebSocket upgrade failed");
        actix_web::error::ErrorInternalServerError("WebSocket upgrade failed")
    })?;
    actix_web::rt::spawn(session::handle_ws_session(
        state.gateway.clone(),
        session,
        messages,
    ));
    Ok(response)
}

fn validate_origin(allowed: &AllowedOrigins, origin_header: &HeaderValue) -> actix_web::Result<()> {
    let origin_value = origin_header.to_str().map_err(|error| {
        error!(error = %error, "failed to parse Origin header as string");
        actix_web::error::ErrorBadRequest("Invalid Origin header")
    })?;
    let origin = Url::parse(origin_value).map_err(|error| {
        error!(error = %error, "failed to parse Origin header as URL");
        actix_web::error::ErrorBadRequest("Invalid Origin header")
    })?;

    if allowed.allows(&origin) {
        Ok(())
    } else {
        warn!(
            origin = origin_value,
            "rejected WebSocket upgrade due to disallowed Origin"
        );
        Err(actix_web::error::ErrorForbidden("Origin not allowed"))
    }
}
