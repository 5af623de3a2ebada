//! Round-robin HTTP load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌───────────────────────────────────────────────────┐
//!                      │                    BALANCER                        │
//!                      │                                                    │
//!   Client Request     │  ┌──────────┐    ┌────────────┐    ┌───────────┐  │
//!   ───────────────────┼─▶│   http   │───▶│  dispatch  │───▶│  server   │  │
//!                      │  │  server  │    │ retry/fail │    │   pool    │  │
//!                      │  └──────────┘    │   over     │    │ round-    │  │
//!                      │                  └─────┬──────┘    │ robin     │  │
//!                      │                        │           └─────▲─────┘  │
//!                      │                        ▼                 │        │
//!   Client Response    │                  ┌────────────┐          │        │
//!   ◀──────────────────┼──────────────────│  forward   │──────────┼────────┼──▶ Backend
//!                      │                  │  adapter   │          │        │
//!                      │                  └────────────┘   ┌──────┴─────┐  │
//!                      │                                   │   health   │──┼──▶ TCP probe
//!                      │                                   │  checker   │  │
//!                      │                                   └────────────┘  │
//!                      └───────────────────────────────────────────────────┘
//! ```

use clap::Parser;

use balancer::config::{Cli, ObservabilityConfig};
use balancer::lifecycle::{launch, signals, Shutdown};
use balancer::observability::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Nothing is bound until the configuration is valid.
    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            logging::init(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address(),
        backends = ?config.backends,
        health_check_interval_secs = config.health_check.interval_secs,
        "balancer starting"
    );

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        trigger.trigger();
    });

    if let Err(e) = launch(config, &shutdown).await {
        tracing::error!(error = %e, "balancer failed");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
