//! Builders choosing adapters for each port.
//!
//! Database-backed adapters are used when a pool is configured and the
//! in-memory ones otherwise; the same applies to Redis and the push relay.

use std::sync::Arc;

use mockable::{Clock, DefaultClock};
use tracing::{info, warn};

use messaging_gateway::domain::ports::{
    CredentialVerifier, DedupStore, DeviceTokenRepository, DisabledPushNotifier,
    MessageRepository, MessageSync, PresenceStore, PushNotifier, RateLimitStore,
    RelationshipDirectory,
};
use messaging_gateway::domain::{
    AuthenticationService, DispatcherPorts, Gateway, GatewayPorts, SyncService,
};
use messaging_gateway::inbound::http::state::HttpState;
use messaging_gateway::inbound::ws::WsState;
use messaging_gateway::outbound::auth::JwtCredentialVerifier;
use messaging_gateway::outbound::cache::InMemoryStore;
use messaging_gateway::outbound::memory::{InMemoryDirectory, InMemoryMessageRepository};
use messaging_gateway::outbound::persistence::{DieselMessageRepository, DieselUserDirectory};
use messaging_gateway::outbound::push::HttpPushNotifier;

use super::ServerConfig;

/// Everything the HTTP and WebSocket adapters share.
pub(crate) struct AppStates {
    pub(crate) gateway: Arc<Gateway>,
    pub(crate) http: HttpState,
    pub(crate) ws: WsState,
}

struct Repositories {
    directory: Arc<dyn RelationshipDirectory>,
    device_tokens: Arc<dyn DeviceTokenRepository>,
    messages: Arc<dyn MessageRepository>,
}

struct CacheStores {
    presence: Arc<dyn PresenceStore>,
    rate_limits: Arc<dyn RateLimitStore>,
    dedup: Arc<dyn DedupStore>,
}

fn build_repositories(config: &ServerConfig) -> Repositories {
    match &config.db_pool {
        Some(pool) => {
            let users = Arc::new(DieselUserDirectory::new(pool.clone()));
            Repositories {
                directory: users.clone(),
                device_tokens: users,
                messages: Arc::new(DieselMessageRepository::new(pool.clone())),
            }
        }
        None => {
            warn!("no database configured; messages are kept in memory");
            let directory = Arc::new(InMemoryDirectory::new());
            Repositories {
                directory: directory.clone(),
                device_tokens: directory,
                messages: Arc::new(InMemoryMessageRepository::new()),
            }
        }
    }
}

fn build_cache_stores(config: &ServerConfig, clock: &Arc<dyn Clock>) -> CacheStores {
    match &config.redis {
        Some(store) => {
            let store = Arc::new(store.clone());
            CacheStores {
                presence: store.clone(),
                rate_limits: store.clone(),
                dedup: store,
            }
        }
        None => {
            warn!("no Redis configured; presence and dedup are local to this instance");
            let store = Arc::new(InMemoryStore::new(clock.clone()));
            CacheStores {
                presence: store.clone(),
                rate_limits: store.clone(),
                dedup: store,
            }
        }
    }
}

fn build_push_notifier(config: &ServerConfig) -> std::io::Result<Arc<dyn PushNotifier>> {
    match &config.push {
        Some(endpoint) => {
            info!(url = %endpoint.url, "push relay configured");
            let notifier = HttpPushNotifier::new(endpoint.clone())
                .map_err(|err| std::io::Error::other(format!("push client: {err}")))?;
            Ok(Arc::new(notifier))
        }
        None => Ok(Arc::new(DisabledPushNotifier)),
    }
}

/// Assemble the gateway and the adapter states around it.
///
/// # Errors
///
/// Returns [`std::io::Error`] when the push client cannot be constructed.
pub(crate) fn build_states(config: &ServerConfig) -> std::io::Result<AppStates> {
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let repositories = build_repositories(config);
    let caches = build_cache_stores(config, &clock);
    let credentials: Arc<dyn CredentialVerifier> =
        Arc::new(JwtCredentialVerifier::new(&config.jwt_secret));

    let ports = GatewayPorts {
        credentials: credentials.clone(),
        presence: caches.presence,
        dispatch: DispatcherPorts {
            directory: repositories.directory,
            messages: repositories.messages.clone(),
            rate_limits: caches.rate_limits,
            dedup: caches.dedup,
            device_tokens: repositories.device_tokens,
            push: build_push_notifier(config)?,
        },
    };
    let gateway = Arc::new(Gateway::new(ports, clock, config.gateway.clone()));
    let sync: Arc<dyn MessageSync> = Arc::new(SyncService::new(repositories.messages));

    Ok(AppStates {
        http: HttpState::new(AuthenticationService::new(credentials), sync, gateway.clone()),
        ws: WsState::new(gateway.clone(), config.origins.clone()),
        gateway,
    })
}
