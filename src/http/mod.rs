//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → forward.rs (buffer body into a replayable ProxyRequest)
//!     → dispatch.rs (select backend, retry, fail over)
//!     → forward.rs (rewrite and send to the backend)
//!     → response.rs (503 / 413 when the balancer answers itself)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use dispatch::RequestDispatcher;
pub use forward::{Forward, HttpForwarder, ProxyRequest, UpstreamError};
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
