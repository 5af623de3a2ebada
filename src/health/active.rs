//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every backend with a bounded TCP connect
//! - Update backend liveness based on results
//! - Log each liveness transition

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::{Backend, ServerPool};
use crate::observability::metrics;

/// Why a probe failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}

/// Attempt a raw TCP connection to `addr` (`host:port`) within `timeout`.
pub async fn probe(addr: &str, timeout: Duration) -> Result<(), ProbeError> {
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(ProbeError::Connect(e)),
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

/// Background task that keeps backend liveness current.
pub struct HealthChecker {
    pool: Arc<ServerPool>,
    interval: Duration,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(pool: Arc<ServerPool>, interval: Duration, timeout: Duration) -> Self {
        Self {
            pool,
            interval,
            timeout,
        }
    }

    pub fn from_config(pool: Arc<ServerPool>, config: &HealthCheckConfig) -> Self {
        Self::new(pool, config.interval(), config.timeout())
    }

    /// Probe on every interval until shutdown. The first tick fires one
    /// interval after start; ticks never overlap.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        tracing::info!(
            interval = ?self.interval,
            timeout = ?self.timeout,
            backends = self.pool.len(),
            "Health checker starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("Starting health check");
                    self.check_all().await;
                    tracing::debug!(alive = self.pool.alive_count(), "Health check completed");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health checker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one tick: probe every backend concurrently and record outcomes.
    pub async fn check_all(&self) {
        let probes = self
            .pool
            .backends()
            .iter()
            .map(|backend| self.check_one(backend));
        join_all(probes).await;
    }

    async fn check_one(&self, backend: &Backend) {
        let result = probe(backend.identity(), self.timeout).await;
        let alive = result.is_ok();
        let was_alive = backend.set_alive(alive);

        match (&result, was_alive != alive) {
            (Ok(()), true) => {
                tracing::info!(backend = %backend, alive, "Backend is back up");
            }
            (Err(e), true) => {
                tracing::warn!(backend = %backend, alive, error = %e, "Backend is down");
            }
            (Ok(()), false) => {
                tracing::debug!(backend = %backend, status = "up", "Backend probed");
            }
            (Err(e), false) => {
                tracing::debug!(backend = %backend, status = "down", error = %e, "Backend probed");
            }
        }

        metrics::record_backend_alive(backend.identity(), alive);
    }
}
