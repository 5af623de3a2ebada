//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream failure:
//!     → retries.rs (retry budget left? wait, resubmit to same backend)
//!     → otherwise fail over (mark backend dead, attempts + 1, reselect)
//! ```
//!
//! # Design Decisions
//! - Attempts and retries are both capped, bounding upstream contacts per request
//! - Counters travel with the request, never through shared state

pub mod retries;

pub use retries::{RetryPolicy, RetryState};
