//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject an empty, malformed or duplicated backend list
//! - Validate value ranges (intervals and timeouts > 0)
//! - Require the request deadline to outlast a full retry and failover run
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before any socket is bound

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::BalancerConfig;
use crate::load_balancer::backend::{parse_backend_url, BackendUrlError};
use crate::resilience::RetryPolicy;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no backends configured")]
    NoBackends,

    #[error(transparent)]
    InvalidBackend(#[from] BackendUrlError),

    #[error("backend URL {0:?} is repeated")]
    DuplicateUrl(String),

    #[error("backends {first:?} and {second:?} share the address {identity}")]
    DuplicateIdentity {
        first: String,
        second: String,
        identity: String,
    },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid {field} {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error(
        "timeouts.request_secs = {request_secs} is shorter than the {worst_case:?} \
         a request may spend retrying and failing over"
    )]
    RequestDeadlineTooShort {
        request_secs: u64,
        worst_case: Duration,
    },
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    let mut seen_urls: HashSet<&str> = HashSet::new();
    let mut seen_identities: HashMap<String, &str> = HashMap::new();
    for raw in &config.backends {
        if !seen_urls.insert(raw.as_str()) {
            errors.push(ValidationError::DuplicateUrl(raw.clone()));
            continue;
        }

        match parse_backend_url(raw) {
            Ok((_, identity)) => {
                if let Some(first) = seen_identities.get(&identity) {
                    errors.push(ValidationError::DuplicateIdentity {
                        first: first.to_string(),
                        second: raw.clone(),
                        identity,
                    });
                } else {
                    seen_identities.insert(identity, raw.as_str());
                }
            }
            Err(e) => errors.push(e.into()),
        }
    }

    if config.health_check.enabled {
        if config.health_check.interval_secs == 0 {
            errors.push(ValidationError::Zero {
                field: "health_check.interval_secs",
            });
        }
        if config.health_check.timeout_secs == 0 {
            errors.push(ValidationError::Zero {
                field: "health_check.timeout_secs",
            });
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "timeouts.request_secs",
        });
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "timeouts.connect_secs",
        });
    }

    if config.timeouts.request_secs > 0 && config.timeouts.connect_secs > 0 {
        let worst_case = RetryPolicy::from(&config.retries)
            .worst_case_duration(Duration::from_secs(config.timeouts.connect_secs));
        if Duration::from_secs(config.timeouts.request_secs) < worst_case {
            errors.push(ValidationError::RequestDeadlineTooShort {
                request_secs: config.timeouts.request_secs,
                worst_case,
            });
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
