//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers the REST endpoints of the inbound HTTP adapter, the
//! schemas they return and the bearer security scheme used by the sync
//! endpoint. Swagger UI serves it in debug builds.

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::{
    DependencyStatus, Error, ErrorCode, HealthReport, HealthStatus, Message, ReadReceipt,
    SyncedMessage,
};
use crate::inbound::http::sync::SyncResponse;

/// Enrich the generated document with the bearer security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        let mut bearer = Http::new(HttpAuthScheme::Bearer);
        bearer.bearer_format = Some("JWT".to_owned());
        components.add_security_scheme("BearerAuth", SecurityScheme::Http(bearer));
    }
}

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Messaging gateway API",
        description = "Reconnection sync and health endpoints of the messaging gateway. \
                       Real-time traffic uses the WebSocket endpoint at /ws."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("BearerAuth" = [])),
    paths(
        crate::inbound::http::sync::sync_messages,
        crate::inbound::http::health::report,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        Error,
        ErrorCode,
        Message,
        ReadReceipt,
        SyncedMessage,
        SyncResponse,
        HealthReport,
        HealthStatus,
        DependencyStatus
    )),
    tags(
        (name = "messages", description = "Message history"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;
