//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with a catch-all proxy route
//! - Wire up middleware (request ID, tracing, timeout)
//! - Buffer each request and hand it to the dispatcher
//! - Spawn the health checker alongside the listener
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::BalancerConfig;
use crate::health::HealthChecker;
use crate::http::dispatch::RequestDispatcher;
use crate::http::forward::{Forward, HttpForwarder, ProxyRequest};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response::payload_too_large;
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::pool::{PoolError, ServerPool};
use crate::resilience::RetryPolicy;

/// Application state injected into the proxy handler.
pub struct AppState<F> {
    pub dispatcher: Arc<RequestDispatcher<F>>,
    pub max_body_size: usize,
}

impl<F> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            max_body_size: self.max_body_size,
        }
    }
}

/// HTTP front end of the load balancer.
pub struct HttpServer {
    router: Router,
    config: BalancerConfig,
    pool: Arc<ServerPool>,
}

impl HttpServer {
    /// Build the server and its backend pool from a validated configuration.
    pub fn new(config: BalancerConfig) -> Result<Self, PoolError> {
        let pool = Arc::new(ServerPool::from_urls(&config.backends)?);
        let forwarder = HttpForwarder::new(Duration::from_secs(config.timeouts.connect_secs));
        Ok(Self::with_forwarder(config, pool, forwarder))
    }

    /// Build the server around an existing pool and forwarding adapter.
    pub fn with_forwarder<F: Forward>(config: BalancerConfig, pool: Arc<ServerPool>, forwarder: F) -> Self {
        let dispatcher = RequestDispatcher::new(
            Arc::clone(&pool),
            forwarder,
            RetryPolicy::from(&config.retries),
        );
        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            max_body_size: config.limits.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            pool,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router<F: Forward>(config: &BalancerConfig, state: AppState<F>) -> Router {
        Router::new()
            .route("/", any(proxy_handler::<F>))
            .route("/{*path}", any(proxy_handler::<F>))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                    .layer(propagate_request_id_layer()),
            )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.pool.len(),
            "HTTP server starting"
        );

        if self.config.health_check.enabled {
            let checker = HealthChecker::from_config(Arc::clone(&self.pool), &self.config.health_check);
            tokio::spawn(checker.run(shutdown.clone()));
        } else {
            tracing::info!("Active health checks disabled");
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_shutdown(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The shared backend pool.
    pub fn pool(&self) -> &Arc<ServerPool> {
        &self.pool
    }
}

/// Catch-all proxy handler: buffer the request and dispatch it.
async fn proxy_handler<F: Forward>(
    State(state): State<AppState<F>>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let path = request.uri().path().to_string();
    let request = match ProxyRequest::buffer(request, client_addr, state.max_body_size).await {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(
                remote_addr = %client_addr,
                path = %path,
                error = %e,
                "Failed to read request body"
            );
            return payload_too_large();
        }
    };

    state.dispatcher.serve(&request).await
}

async fn wait_for_shutdown(mut shutdown: ShutdownSignal) {
    shutdown.recv().await;
    tracing::info!("Shutdown signal received");
}
