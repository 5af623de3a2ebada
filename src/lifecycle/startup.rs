//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the backend pool from validated configuration
//! - Start the metrics exporter and admin API when enabled
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last, after the pool exists

use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin::{self, AdminState};
use crate::config::BalancerConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::load_balancer::pool::PoolError;
use crate::observability::metrics;

/// Errors that stop the process before or while serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("backend pool: {0}")]
    Pool(#[from] PoolError),

    #[error("invalid {field} {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Start every subsystem and serve until `shutdown` fires.
pub async fn launch(config: BalancerConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    let server = HttpServer::new(config.clone())?;

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse().map_err(|_| {
            StartupError::InvalidAddress {
                field: "observability.metrics_address",
                value: config.observability.metrics_address.clone(),
            }
        })?;
        metrics::init_metrics(addr)?;
        for backend in server.pool().backends() {
            metrics::record_backend_alive(backend.identity(), backend.is_alive());
        }
    }

    let listener = bind(&config.listener.bind_address()).await?;

    if config.admin.enabled {
        let admin_listener = bind(&config.admin.bind_address).await?;
        let state = AdminState::new(server.pool().clone(), &config.admin.api_key);
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(admin_listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    server
        .run(listener, shutdown.subscribe())
        .await
        .map_err(StartupError::Serve)
}
