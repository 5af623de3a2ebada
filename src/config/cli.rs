//! Command-line arguments.
//!
//! Flags override values read from the config file; validation runs on the
//! merged result.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{read_config, ConfigError};
use crate::config::schema::BalancerConfig;
use crate::config::validation::validate_config;

#[derive(Debug, Parser)]
#[command(name = "balancer")]
#[command(about = "Round-robin HTTP load balancer with health checks and failover", long_about = None)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Comma-separated backend base URLs, in rotation order.
    #[arg(short, long, value_delimiter = ',')]
    pub backends: Vec<String>,

    /// Port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Load the config file (if any), apply flag overrides and validate.
    pub fn resolve(&self) -> Result<BalancerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => BalancerConfig::default(),
        };

        if !self.backends.is_empty() {
            config.backends = self
                .backends
                .iter()
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect();
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}
