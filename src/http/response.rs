//! Responses the balancer generates itself.
//!
//! Upstream responses pass through untouched apart from hop-by-hop header
//! removal (see `forward.rs`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "Service not available";

/// No backend could serve the request.
pub fn service_unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, SERVICE_UNAVAILABLE_MESSAGE).into_response()
}

/// The request body exceeded the buffering limit or could not be read.
pub fn payload_too_large() -> Response {
    (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
}
