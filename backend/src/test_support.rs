//! Test utilities for the gateway crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`). Only
//! compiled for tests or with the `test-support` feature.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;

use crate::domain::ports::{
    CredentialError, CredentialVerifier, DisabledPushNotifier, PushNotifier, VerifiedCredential,
};
use crate::domain::{DispatcherPorts, Gateway, GatewayConfig, GatewayPorts, UserId};
use crate::outbound::cache::InMemoryStore;
use crate::outbound::memory::{InMemoryDirectory, InMemoryMessageRepository};

/// Clock whose time only moves when a test advances it.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    /// Start the clock at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    /// Clock starting at a fixed, arbitrary instant.
    pub fn fixed() -> Arc<Self> {
        let start = match Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single() {
            Some(value) => value,
            None => panic!("fixture timestamp is unambiguous"),
        };
        Arc::new(Self::new(start))
    }

    /// Move time forward.
    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}")
            }
        };
        *self.lock_clock() += delta;
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

/// Verifier accepting `token-<uuid>` credentials for the embedded user id.
///
/// Anything else is rejected as invalid and `expired` as expired.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticCredentialVerifier;

impl StaticCredentialVerifier {
    /// Credential accepted for `user`.
    pub fn token_for(user: &UserId) -> String {
        format!("token-{user}")
    }
}

impl CredentialVerifier for StaticCredentialVerifier {
    fn verify(&self, credential: &str) -> Result<VerifiedCredential, CredentialError> {
        if credential == "expired" {
            return Err(CredentialError::expired());
        }
        let raw = credential
            .strip_prefix("token-")
            .ok_or_else(|| CredentialError::invalid("unrecognised credential"))?;
        let user_id = UserId::new(raw).map_err(|err| CredentialError::invalid(err.to_string()))?;
        Ok(VerifiedCredential {
            user_id,
            expires_at: Utc::now() + TimeDelta::hours(1),
        })
    }
}

/// Gateway assembled over the in-memory adapters, with handles on each
/// adapter so tests can seed and inspect state.
pub struct GatewayHarness {
    /// Gateway under test.
    pub gateway: Arc<Gateway>,
    /// Users, relationships and device tokens.
    pub directory: Arc<InMemoryDirectory>,
    /// Message log.
    pub messages: Arc<InMemoryMessageRepository>,
    /// Presence, rate-limit and dedup state.
    pub store: Arc<InMemoryStore>,
    /// Clock shared by every component.
    pub clock: Arc<MutableClock>,
}

impl GatewayHarness {
    /// Harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    /// Harness with a custom configuration and push disabled.
    pub fn with_config(config: GatewayConfig) -> Self {
        Self::with_config_and_push(config, Arc::new(DisabledPushNotifier))
    }

    /// Harness that hands offline notifications to `push`.
    pub fn with_config_and_push(config: GatewayConfig, push: Arc<dyn PushNotifier>) -> Self {
        let clock = MutableClock::fixed();
        let directory = Arc::new(InMemoryDirectory::new());
        let messages = Arc::new(InMemoryMessageRepository::new());
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let ports = GatewayPorts {
            credentials: Arc::new(StaticCredentialVerifier),
            presence: store.clone(),
            dispatch: DispatcherPorts {
                directory: directory.clone(),
                messages: messages.clone(),
                rate_limits: store.clone(),
                dedup: store.clone(),
                device_tokens: directory.clone(),
                push,
            },
        };
        let gateway = Arc::new(Gateway::new(ports, clock.clone(), config));
        Self {
            gateway,
            directory,
            messages,
            store,
            clock,
        }
    }

    /// Register two users and connect them to each other.
    pub fn connected_pair(&self) -> (UserId, UserId) {
        let (alice, bob) = (UserId::random(), UserId::random());
        self.directory.add_user(alice, Some("Alice"));
        self.directory.add_user(bob, Some("Bob"));
        self.directory.connect(alice, bob);
        (alice, bob)
    }
}

impl Default for GatewayHarness {
    fn default() -> Self {
        Self::new()
    }
}
