//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! CLI flags + config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → cli.rs (apply flag overrides)
//!     → validation.rs (semantic checks)
//!     → BalancerConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the backend list is fixed for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::ConfigError;
pub use schema::{
    AdminConfig, BalancerConfig, HealthCheckConfig, LimitsConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, RetryConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
