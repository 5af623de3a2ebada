//! Server pool and round-robin selection.
//!
//! # Responsibilities
//! - Own the fixed, ordered list of backends
//! - Rotate a shared cursor to pick the next live backend
//! - Evict a backend by identity after the dispatcher gives up on it

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::load_balancer::backend::{Backend, BackendUrlError};

/// Errors building a pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("backend pool is empty")]
    Empty,

    #[error("backend {0} appears more than once")]
    Duplicate(String),

    #[error(transparent)]
    InvalidUrl(#[from] BackendUrlError),
}

/// Ordered, fixed-size collection of backends with a shared rotation cursor.
#[derive(Debug)]
pub struct ServerPool {
    backends: Vec<Arc<Backend>>,
    current: AtomicUsize,
}

impl ServerPool {
    /// Build a pool. The list must be non-empty and identities unique.
    pub fn new(backends: Vec<Backend>) -> Result<Self, PoolError> {
        if backends.is_empty() {
            return Err(PoolError::Empty);
        }

        let mut seen = HashSet::new();
        for backend in &backends {
            if !seen.insert(backend.identity().to_string()) {
                return Err(PoolError::Duplicate(backend.identity().to_string()));
            }
        }

        Ok(Self {
            backends: backends.into_iter().map(Arc::new).collect(),
            current: AtomicUsize::new(0),
        })
    }

    /// Build a pool from configured base URLs, preserving order.
    pub fn from_urls<S: AsRef<str>>(urls: &[S]) -> Result<Self, PoolError> {
        let backends = urls
            .iter()
            .map(|u| Backend::parse(u.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(backends)
    }

    /// Advance the cursor by one and return its new position modulo the pool size.
    pub fn next_index(&self) -> usize {
        let next = self.current.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        next % self.backends.len()
    }

    /// Pick the next live backend, scanning at most one full lap from the
    /// cursor. Returns `None` only when every backend is dead.
    pub fn get_next_peer(&self) -> Option<Arc<Backend>> {
        let len = self.backends.len();
        let start = self.next_index();

        for offset in 0..len {
            let idx = (start + offset) % len;
            let backend = &self.backends[idx];
            if backend.is_alive() {
                if offset != 0 {
                    // Park the cursor on the chosen backend.
                    self.current.store(idx, Ordering::SeqCst);
                }
                return Some(Arc::clone(backend));
            }
        }

        tracing::debug!(pool_size = len, "No live backend in pool");
        None
    }

    /// Set the liveness of the backend whose identity is `identity`.
    /// Returns false if no backend matches.
    pub fn mark_backend_status(&self, identity: &str, alive: bool) -> bool {
        match self.backends.iter().find(|b| b.identity() == identity) {
            Some(backend) => {
                backend.set_alive(alive);
                true
            }
            None => {
                tracing::warn!(backend = %identity, "Status update for unknown backend");
                false
            }
        }
    }

    /// All backends in configured order.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Number of backends currently believed alive.
    pub fn alive_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_alive()).count()
    }
}
