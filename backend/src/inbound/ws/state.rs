//! Shared WebSocket adapter state.

use std::sync::Arc;

use url::Url;

use crate::domain::Gateway;

/// Dependency bundle for the WebSocket entry point.
#[derive(Clone)]
pub struct WsState {
    /// Gateway every connection task drives.
    pub gateway: Arc<Gateway>,
    /// Origins allowed to upgrade.
    pub origins: Arc<AllowedOrigins>,
}

impl WsState {
    /// Construct state from the gateway and origin policy.
    pub fn new(gateway: Arc<Gateway>, origins: AllowedOrigins) -> Self {
        Self {
            gateway,
            origins: Arc::new(origins),
        }
    }
}

/// One allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPattern {
    /// `*`: any origin, including none at all.
    Any,
    /// Exact scheme, host and port.
    Exact {
        /// `http` or `https`.
        scheme: String,
        /// Host name.
        host: String,
        /// Effective port.
        port: Option<u16>,
    },
    /// `scheme://*.domain`: any strict subdomain.
    Subdomains {
        /// `http` or `https`.
        scheme: String,
        /// Domain suffix including the leading dot.
        suffix: String,
    },
}

/// Error returned for an unparsable allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid origin pattern {pattern:?}: {reason}")]
pub struct OriginPatternError {
    pattern: String,
    reason: String,
}

impl OriginPattern {
    /// Parse `*`, `scheme://*.domain` or an absolute origin URL.
    pub fn parse(raw: &str) -> Result<Self, OriginPatternError> {
        let raw = raw.trim();
        let invalid = |reason: &str| OriginPatternError {
            pattern: raw.to_owned(),
            reason: reason.to_owned(),
        };
        if raw == "*" {
            return Ok(Self::Any);
        }
        if let Some((scheme, rest)) = raw.split_once("://*.") {
            let domain = rest.trim_end_matches('/');
            if domain.is_empty() || domain.contains('/') {
                return Err(invalid("wildcard must be followed by a bare domain"));
            }
            return Ok(Self::Subdomains {
                scheme: scheme.to_ascii_lowercase(),
                suffix: format!(".{}", domain.to_ascii_lowercase()),
            });
        }
        let url = Url::parse(raw).map_err(|err| invalid(&err.to_string()))?;
        let host = url.host_str().ok_or_else(|| invalid("origin has no host"))?;
        Ok(Self::Exact {
            scheme: url.scheme().to_owned(),
            host: host.to_owned(),
            port: url.port_or_known_default(),
        })
    }

    fn matches(&self, origin: &Url) -> bool {
        let Some(host) = origin.host_str() else {
            return false;
        };
        match self {
            Self::Any => true,
            Self::Exact { scheme, host: h, port } => {
                origin.scheme() == scheme.as_str()
                    && host == h.as_str()
                    && origin.port_or_known_default() == *port
            }
            Self::Subdomains { scheme, suffix } => {
                origin.scheme() == scheme.as_str()
                    && host
                        .strip_suffix(suffix.as_str())
                        .is_some_and(|label| !label.is_empty())
            }
        }
    }
}

/// Runtime-configured `Origin` allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllowedOrigins {
    patterns: Vec<OriginPattern>,
}

impl AllowedOrigins {
    /// Parse every entry.
    pub fn parse<I, S>(raw: I) -> Result<Self, OriginPatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = raw
            .into_iter()
            .map(|entry| OriginPattern::parse(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Allow-list accepting everything, for tests and native-only clients.
    pub fn any() -> Self {
        Self {
            patterns: vec![OriginPattern::Any],
        }
    }

    /// Whether `origin` matches any entry.
    pub fn allows(&self, origin: &Url) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(origin))
    }

    /// Whether upgrades without an `Origin` header are accepted. Native
    /// clients do not send one.
    pub fn allows_missing(&self) -> bool {
        self.patterns.contains(&OriginPattern::Any)
    }
}
