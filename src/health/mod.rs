//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → TCP connect to each backend's host:port (bounded timeout)
//!     → success: alive = true, failure: alive = false
//! ```
//!
//! # Design Decisions
//! - Liveness means TCP reachability; an erroring HTTP backend is still alive
//! - Probes within a tick run concurrently, ticks never overlap
//! - Probes only touch liveness flags, never in-flight requests

pub mod active;

pub use active::{probe, HealthChecker, ProbeError};
