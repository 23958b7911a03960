//! Gateway configuration loaded via OrthoConfig, plus secret handling.
//!
//! Plain settings come from `GATEWAY_*` environment variables, CLI flags or a
//! config file and are clamped into a [`GatewayConfig`]. The JWT signing
//! secret is read from a file named by the environment so it never passes
//! through the settings layer.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use mockable::Env;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use tracing::warn;
use url::Url;
use zeroize::{Zeroize, Zeroizing};

use crate::domain::GatewayConfig;
use crate::inbound::ws::{AllowedOrigins, state::OriginPatternError};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const JWT_SECRET_DEFAULT_PATH: &str = "/var/run/secrets/jwt_secret";
const JWT_SECRET_MIN_LEN: usize = 32;
const JWT_SECRET_FILE_ENV: &str = "GATEWAY_JWT_SECRET_FILE";
const JWT_ALLOW_EPHEMERAL_ENV: &str = "GATEWAY_JWT_ALLOW_EPHEMERAL";
const DEFAULT_PUSH_TIMEOUT_SECS: u64 = 5;

/// Build mode for configuration validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildMode {
    /// Debug builds tolerate missing secrets and origins, with warnings.
    Debug,
    /// Release builds require explicit values.
    Release,
}

impl BuildMode {
    /// Determine the build mode from `cfg!(debug_assertions)`.
    #[must_use]
    pub fn from_debug_assertions() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Release
        }
    }

    fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }
}

/// Errors raised while validating settings.
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    /// OrthoConfig could not assemble the settings.
    #[error("failed to load settings: {message}")]
    Load { message: String },
    /// A value is present but unusable.
    #[error("invalid value for {name}='{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    /// An origin allow-list entry did not parse.
    #[error(transparent)]
    Origin(#[from] OriginPatternError),
    /// Release builds must list their allowed origins.
    #[error("GATEWAY_ALLOWED_ORIGINS must be set in release builds")]
    OriginsRequired,
    /// Reading the JWT secret file failed.
    #[error("failed to read JWT secret at {path}: {source}")]
    SecretRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The JWT secret is too short to sign tokens safely.
    #[error("JWT secret at {path} too short: need >= {min_len} bytes, got {length}")]
    SecretTooShort {
        path: PathBuf,
        length: usize,
        min_len: usize,
    },
    /// Release builds must not sign with a generated secret.
    #[error("GATEWAY_JWT_ALLOW_EPHEMERAL must be 0 in release builds")]
    EphemeralNotAllowed,
}

/// Gateway settings.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "GATEWAY")]
pub struct GatewaySettings {
    /// Socket address the HTTP server binds to.
    pub bind_addr: Option<String>,
    /// Redis URL for presence, rate limits and dedup; in-process state
    /// when absent.
    pub redis_url: Option<String>,
    /// PostgreSQL URL; in-memory repositories when absent.
    pub database_url: Option<String>,
    /// Maximum PostgreSQL connections.
    pub database_max_connections: Option<u32>,
    /// URL of the push relay; push is disabled when absent.
    pub push_endpoint: Option<String>,
    /// Bearer key presented to the push relay.
    pub push_api_key: Option<String>,
    /// Push request timeout in seconds.
    pub push_timeout_secs: Option<u64>,
    /// Comma-separated `Origin` allow-list; `*` accepts everything.
    pub allowed_origins: Option<String>,
    /// Seconds allowed for the authenticate handshake.
    pub auth_timeout_secs: Option<u64>,
    /// Seconds before a typing indicator stops on its own.
    pub typing_expiry_secs: Option<u64>,
    /// Lifetime of send deduplication markers in seconds.
    pub dedup_ttl_secs: Option<u64>,
    /// Length of the rate-limit window in seconds.
    pub rate_window_secs: Option<u64>,
    /// Sends allowed per sender per window.
    pub rate_limit: Option<u64>,
    /// Seconds between presence sweeps.
    pub reap_interval_secs: Option<u64>,
    /// Seconds of silence before a connection is reaped.
    pub inactivity_secs: Option<u64>,
    /// Seconds between WebSocket pings.
    pub heartbeat_secs: Option<u64>,
    /// Turn off the per-sender rate limit.
    #[ortho_config(default = false)]
    pub disable_rate_limit: bool,
    /// Turn off push notifications for offline receivers.
    #[ortho_config(default = false)]
    pub disable_push: bool,
    /// Reject sends without a client correlation id.
    #[ortho_config(default = false)]
    pub require_correlation_id: bool,
}

fn clamped_secs(name: &'static str, value: Option<u64>, default: u64, min: u64, max: u64) -> Duration {
    let secs = match value {
        Some(raw) if !(min..=max).contains(&raw) => {
            let clamped = raw.clamp(min, max);
            warn!(setting = name, value = raw, clamped, "setting out of range; clamping");
            clamped
        }
        Some(raw) => raw,
        None => default,
    };
    Duration::from_secs(secs)
}

impl GatewaySettings {
    /// Socket address to bind, defaulting to `0.0.0.0:8080`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let raw = self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        raw.parse().map_err(|err: std::net::AddrParseError| SettingsError::Invalid {
            name: "GATEWAY_BIND_ADDR",
            value: raw.to_owned(),
            reason: err.to_string(),
        })
    }

    /// Service tunables with every duration clamped to a sane range.
    pub fn gateway_config(&self) -> GatewayConfig {
        let reap_interval = clamped_secs(
            "reap_interval_secs",
            self.reap_interval_secs,
            GatewayConfig::DEFAULT_REAP_INTERVAL_SECS,
            5,
            600,
        );
        let rate_limit = match self.rate_limit {
            Some(0) => {
                warn!("rate_limit of 0 would block every send; using 1");
                1
            }
            Some(limit) => limit,
            None => GatewayConfig::DEFAULT_RATE_LIMIT,
        };
        GatewayConfig {
            auth_timeout: clamped_secs(
                "auth_timeout_secs",
                self.auth_timeout_secs,
                GatewayConfig::DEFAULT_AUTH_TIMEOUT_SECS,
                1,
                60,
            ),
            typing_expiry: clamped_secs(
                "typing_expiry_secs",
                self.typing_expiry_secs,
                GatewayConfig::DEFAULT_TYPING_EXPIRY_SECS,
                1,
                60,
            ),
            dedup_ttl: clamped_secs(
                "dedup_ttl_secs",
                self.dedup_ttl_secs,
                GatewayConfig::DEFAULT_DEDUP_TTL_SECS,
                60,
                86_400,
            ),
            rate_window: clamped_secs(
                "rate_window_secs",
                self.rate_window_secs,
                GatewayConfig::DEFAULT_RATE_WINDOW_SECS,
                1,
                3_600,
            ),
            rate_limit,
            reap_interval,
            inactivity_threshold: clamped_secs(
                "inactivity_secs",
                self.inactivity_secs,
                GatewayConfig::DEFAULT_INACTIVITY_SECS,
                30,
                86_400,
            ),
            presence_ttl: GatewayConfig::presence_ttl_for(reap_interval),
            heartbeat_interval: clamped_secs(
                "heartbeat_secs",
                self.heartbeat_secs,
                GatewayConfig::DEFAULT_HEARTBEAT_SECS,
                5,
                120,
            ),
            rate_limit_enabled: !self.disable_rate_limit,
            push_fallback_enabled: !self.disable_push,
            require_correlation_id: self.require_correlation_id,
        }
    }

    /// Parsed `Origin` allow-list.
    ///
    /// Debug builds fall back to accepting any origin when none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Origin`] for an unparsable entry and
    /// [`SettingsError::OriginsRequired`] when a release build has none.
    pub fn allowed_origins(&self, mode: BuildMode) -> Result<AllowedOrigins, SettingsError> {
        let entries: Vec<&str> = self
            .allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect();
        if entries.is_empty() {
            if mode.is_debug() {
                warn!("GATEWAY_ALLOWED_ORIGINS not set; accepting any origin (dev only)");
                return Ok(AllowedOrigins::any());
            }
            return Err(SettingsError::OriginsRequired);
        }
        Ok(AllowedOrigins::parse(entries)?)
    }

    /// Push relay URL and timeout, when push is configured and enabled.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] when the URL does not parse.
    pub fn push_target(&self) -> Result<Option<(Url, Duration)>, SettingsError> {
        if self.disable_push {
            return Ok(None);
        }
        let Some(raw) = self.push_endpoint.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(raw).map_err(|err| SettingsError::Invalid {
            name: "GATEWAY_PUSH_ENDPOINT",
            value: raw.to_owned(),
            reason: err.to_string(),
        })?;
        let timeout = clamped_secs(
            "push_timeout_secs",
            self.push_timeout_secs,
            DEFAULT_PUSH_TIMEOUT_SECS,
            1,
            60,
        );
        Ok(Some((url, timeout)))
    }
}

/// Load the JWT signing secret from the file named by
/// `GATEWAY_JWT_SECRET_FILE`.
///
/// Debug builds, or `GATEWAY_JWT_ALLOW_EPHEMERAL=1`, fall back to a random
/// secret when the file cannot be read; tokens then only verify against this
/// process.
///
/// # Errors
///
/// Returns [`SettingsError`] when the file is missing or too short in a
/// release build, or when an ephemeral secret is requested in release.
pub fn jwt_secret_from_env<E: Env>(
    env: &E,
    mode: BuildMode,
) -> Result<Zeroizing<Vec<u8>>, SettingsError> {
    let allow_ephemeral = match env.string(JWT_ALLOW_EPHEMERAL_ENV).as_deref().map(parse_bool) {
        Some(Some(true)) if !mode.is_debug() => return Err(SettingsError::EphemeralNotAllowed),
        Some(Some(flag)) => flag,
        Some(None) => {
            warn!("invalid GATEWAY_JWT_ALLOW_EPHEMERAL; defaulting to disabled");
            false
        }
        None => false,
    };
    let path = PathBuf::from(
        env.string(JWT_SECRET_FILE_ENV)
            .unwrap_or_else(|| JWT_SECRET_DEFAULT_PATH.to_owned()),
    );

    match std::fs::read(&path) {
        Ok(mut bytes) => {
            let length = bytes.len();
            if mode == BuildMode::Release && length < JWT_SECRET_MIN_LEN {
                bytes.zeroize();
                return Err(SettingsError::SecretTooShort {
                    path,
                    length,
                    min_len: JWT_SECRET_MIN_LEN,
                });
            }
            Ok(Zeroizing::new(bytes))
        }
        Err(error) => {
            if mode.is_debug() || allow_ephemeral {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "using temporary JWT secret (dev only)"
                );
                Ok(ephemeral_secret())
            } else {
                Err(SettingsError::SecretRead {
                    path,
                    source: error,
                })
            }
        }
    }
}

fn ephemeral_secret() -> Zeroizing<Vec<u8>> {
    let mut secret = Vec::with_capacity(JWT_SECRET_MIN_LEN);
    secret.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    secret.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    Zeroizing::new(secret)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests;
