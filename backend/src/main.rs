//! Gateway entry-point: loads settings, connects adapters and serves the
//! WebSocket, sync and health endpoints.

mod server;

use actix_web::web;
use mockable::DefaultEnv;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use zeroize::Zeroizing;

use messaging_gateway::inbound::http::health::HealthState;
use messaging_gateway::outbound::cache::{RedisConfig, RedisStore};
use messaging_gateway::outbound::persistence::{DbPool, PoolConfig, run_migrations};
use messaging_gateway::outbound::push::PushEndpoint;
use messaging_gateway::settings::{BuildMode, GatewaySettings, jwt_secret_from_env};
use server::{RunningServer, ServerConfig, create_server};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = GatewaySettings::load().map_err(|e| std::io::Error::other(e.to_string()))?;
    let config = build_server_config(&settings).await?;

    let health_state = web::Data::new(HealthState::new());
    let RunningServer { server, reaper } = create_server(health_state.clone(), config)?;
    let result = server.await;
    health_state.mark_unhealthy();
    reaper.abort();
    info!("gateway stopped");
    result
}

async fn build_server_config(settings: &GatewaySettings) -> std::io::Result<ServerConfig> {
    let mode = BuildMode::from_debug_assertions();
    let to_io = |e: messaging_gateway::settings::SettingsError| std::io::Error::other(e.to_string());

    let mut config = ServerConfig::new(
        settings.bind_addr().map_err(to_io)?,
        settings.gateway_config(),
        settings.allowed_origins(mode).map_err(to_io)?,
        jwt_secret_from_env(&DefaultEnv::new(), mode).map_err(to_io)?,
    );

    if let Some(url) = settings.database_url.clone() {
        let migration_url = url.clone();
        tokio::task::spawn_blocking(move || run_migrations(&migration_url))
            .await
            .map_err(|e| std::io::Error::other(format!("migration task failed: {e}")))?
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let mut pool_config = PoolConfig::new(url);
        if let Some(max) = settings.database_max_connections {
            pool_config = pool_config.with_max_size(max.max(1));
        }
        let pool = DbPool::new(pool_config)
            .await
            .map_err(|e| std::io::Error::other(e.into_message()))?;
        config = config.with_db_pool(pool);
    }

    if let Some(url) = settings.redis_url.as_deref() {
        let store = RedisStore::connect(&RedisConfig::new(url))
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        config = config.with_redis(store);
    }

    if let Some((url, timeout)) = settings.push_target().map_err(to_io)? {
        config = config.with_push(PushEndpoint {
            url,
            api_key: settings.push_api_key.clone().map(Zeroizing::new),
            timeout,
        });
    }

    Ok(config)
}
