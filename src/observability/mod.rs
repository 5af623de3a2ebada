//! Observability subsystem.
//!
//! ```text
//! dispatch.rs ─┬─ retries, failovers, 503s ──▶ logging + metrics
//! active.rs  ──┴─ liveness transitions     ──▶ logging + balancer_backend_alive
//! ```
//!
//! Logs go to stdout (pretty or JSON). Metrics are only exported when
//! `observability.metrics_enabled` is set; otherwise the `metrics` macros
//! hit no recorder and do nothing.

pub mod logging;
pub mod metrics;
