//! HTTP server configuration object and helpers.

use std::net::SocketAddr;

use messaging_gateway::domain::GatewayConfig;
use messaging_gateway::inbound::ws::AllowedOrigins;
use messaging_gateway::outbound::cache::RedisStore;
use messaging_gateway::outbound::persistence::DbPool;
use messaging_gateway::outbound::push::PushEndpoint;
use zeroize::Zeroizing;

/// Builder-style configuration for creating the HTTP server.
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) gateway: GatewayConfig,
    pub(crate) origins: AllowedOrigins,
    pub(crate) jwt_secret: Zeroizing<Vec<u8>>,
    pub(crate) db_pool: Option<DbPool>,
    pub(crate) redis: Option<RedisStore>,
    pub(crate) push: Option<PushEndpoint>,
}

impl ServerConfig {
    /// Configuration with in-memory adapters and push disabled.
    #[must_use]
    pub fn new(
        bind_addr: SocketAddr,
        gateway: GatewayConfig,
        origins: AllowedOrigins,
        jwt_secret: Zeroizing<Vec<u8>>,
    ) -> Self {
        Self {
            bind_addr,
            gateway,
            origins,
            jwt_secret,
            db_pool: None,
            redis: None,
            push: None,
        }
    }

    /// Attach a database connection pool for the persistence adapters.
    #[must_use]
    pub fn with_db_pool(mut self, pool: DbPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    /// Use Redis for presence, rate limits and dedup.
    #[must_use]
    pub fn with_redis(mut self, store: RedisStore) -> Self {
        self.redis = Some(store);
        self
    }

    /// Deliver push notifications through an HTTP relay.
    #[must_use]
    pub fn with_push(mut self, endpoint: PushEndpoint) -> Self {
        self.push = Some(endpoint);
        self
    }
}
