//! Server construction and route wiring.

mod config;
mod state_builders;

pub use config::ServerConfig;

use state_builders::build_states;

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
use tokio::task::JoinHandle;
use tracing::info;

#[cfg(debug_assertions)]
use messaging_gateway::doc::ApiDoc;
use messaging_gateway::inbound::http::health::{HealthState, live, ready, report};
use messaging_gateway::inbound::http::state::HttpState;
use messaging_gateway::inbound::http::sync::sync_messages;
use messaging_gateway::inbound::ws;
use messaging_gateway::inbound::ws::WsState;
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

#[derive(Clone)]
struct AppDependencies {
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
    ws_state: web::Data<WsState>,
}

fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
        ws_state,
    } = deps;

    let api = web::scope("/api/v1").service(sync_messages);

    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .app_data(ws_state)
        .service(api)
        .service(ws::ws_entry)
        .service(report)
        .service(ready)
        .service(live);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    #[cfg(not(debug_assertions))]
    let app = app;

    app
}

/// A bound server and the presence sweep running alongside it.
pub struct RunningServer {
    /// Server future; must be awaited to drive the listener.
    pub server: Server,
    /// Presence sweep task; abort it once the server stops.
    pub reaper: JoinHandle<()>,
}

/// Construct the gateway, start its presence sweep and bind the HTTP server.
///
/// # Errors
///
/// Propagates [`std::io::Error`] when binding the socket or building an
/// adapter fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> std::io::Result<RunningServer> {
    let states = build_states(&config)?;
    let reaper = states.gateway.presence().clone().spawn_reaper();
    let http_state = web::Data::new(states.http);
    let ws_state = web::Data::new(states.ws);
    let server_health_state = health_state.clone();

    let server = HttpServer::new(move || {
        build_app(AppDependencies {
            health_state: server_health_state.clone(),
            http_state: http_state.clone(),
            ws_state: ws_state.clone(),
        })
    })
    .bind(config.bind_addr)?
    .run();

    info!(addr = %config.bind_addr, "gateway listening");
    health_state.mark_ready();
    Ok(RunningServer { server, reaper })
}
