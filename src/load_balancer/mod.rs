//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives
//!     → pool.rs (advance the rotation cursor)
//!     → scan forward for a live backend, skipping dead ones
//!     → backend.rs (read liveness under a shared lock)
//!     → return the backend, or none when all are dead
//! ```
//!
//! # Design Decisions
//! - The pool is built once at startup and never resized
//! - The cursor is a lock-free atomic; only liveness flags take a lock
//! - Backends are identified by `host:port`

pub mod backend;
pub mod pool;

pub use backend::Backend;
pub use pool::ServerPool;
