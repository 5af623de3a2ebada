//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single origin server
//! - Hold its base URL and `host:port` identity
//! - Guard the liveness flag with a reader/writer lock

use std::fmt;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;
use url::Url;

/// Reasons a backend URL is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendUrlError {
    #[error("malformed backend URL {url:?}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("unsupported scheme {scheme:?} in backend URL {url:?} (only http is forwarded)")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("backend URL {0:?} has no host")]
    MissingHost(String),
}

/// Parse a configured backend base URL and derive its `host:port` identity.
pub fn parse_backend_url(raw: &str) -> Result<(Url, String), BackendUrlError> {
    let url = Url::parse(raw).map_err(|e| BackendUrlError::Malformed {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" {
        return Err(BackendUrlError::UnsupportedScheme {
            url: raw.to_string(),
            scheme: url.scheme().to_string(),
        });
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| BackendUrlError::MissingHost(raw.to_string()))?;
    let port = url.port_or_known_default().ok_or_else(|| BackendUrlError::Malformed {
        url: raw.to_string(),
        reason: "no port and no default port for scheme".to_string(),
    })?;

    let identity = format!("{}:{}", host, port);
    Ok((url, identity))
}

/// A single origin server.
#[derive(Debug)]
pub struct Backend {
    /// Base URL as configured.
    url: Url,
    /// `host:port`, unique within a pool.
    identity: String,
    /// Liveness flag. Many readers (every dispatch), one writer at a time.
    alive: RwLock<bool>,
}

impl Backend {
    /// Create a backend from an already parsed base URL. Backends start alive.
    pub fn new(url: Url, identity: String) -> Self {
        Self {
            url,
            identity,
            alive: RwLock::new(true),
        }
    }

    /// Parse `raw` and build a backend from it.
    pub fn parse(raw: &str) -> Result<Self, BackendUrlError> {
        let (url, identity) = parse_backend_url(raw)?;
        Ok(Self::new(url, identity))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The `host:port` identity used for status lookups and probing.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Set the liveness flag, returning the previous value.
    pub fn set_alive(&self, alive: bool) -> bool {
        let mut guard = self.alive.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, alive)
    }

    /// Shared read of the liveness flag.
    pub fn is_alive(&self) -> bool {
        *self.alive.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
