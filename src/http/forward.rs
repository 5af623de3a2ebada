//! Forwarding a buffered request to one backend.
//!
//! # Responsibilities
//! - Buffer the inbound request so it can be resubmitted
//! - Rewrite the target URI to the backend's base URL
//! - Apply reverse-proxy header adjustments (Host, X-Forwarded-*)
//! - Strip hop-by-hop headers in both directions
//! - Report transport failures as `UpstreamError`
//!
//! Any HTTP response, including 5xx, counts as a completed round trip.

use std::error::Error as StdError;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, Uri, Version};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use url::Url;

use crate::http::request::X_REQUEST_ID;
use crate::load_balancer::Backend;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// A failed round trip to a backend.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("connection to {backend} failed: {reason}")]
    Connect { backend: String, reason: String },

    #[error("request to {backend} failed: {reason}")]
    Transport { backend: String, reason: String },

    #[error("could not build request for {backend}: {reason}")]
    Build { backend: String, reason: String },
}

/// The per-backend forwarding capability used by the dispatcher.
pub trait Forward: Send + Sync + 'static {
    /// Send `request` to `backend` and return its response.
    fn forward(
        &self,
        backend: &Backend,
        request: &ProxyRequest,
    ) -> impl Future<Output = Result<Response<Body>, UpstreamError>> + Send;
}

/// An inbound request with its body buffered, replayable against any backend.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: SocketAddr,
    pub request_id: String,
}

impl ProxyRequest {
    /// Buffer `request` (up to `limit` bytes of body).
    pub async fn buffer(
        request: Request<Body>,
        client_addr: SocketAddr,
        limit: usize,
    ) -> Result<Self, axum::Error> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, limit).await?;
        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            client_addr,
            request_id,
        })
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Build the request sent to `backend`.
    pub fn to_upstream(&self, backend: &Backend) -> Result<Request<Body>, axum::http::Error> {
        let uri = Uri::builder()
            .scheme(backend.url().scheme())
            .authority(backend.identity())
            .path_and_query(join_path(backend.url(), &self.uri))
            .build()?;

        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .version(Version::HTTP_11);
        if let Some(headers) = builder.headers_mut() {
            *headers = forwarded_headers(&self.headers, backend, self.client_addr);
        }
        builder.body(Body::from(self.body.clone()))
    }
}

/// Append the request path to the backend's base path and merge queries.
fn join_path(base: &Url, uri: &Uri) -> String {
    let mut joined = format!("{}{}", base.path().trim_end_matches('/'), uri.path());

    let query = [base.query(), uri.query()]
        .into_iter()
        .flatten()
        .filter(|q| !q.is_empty())
        .collect::<Vec<_>>()
        .join("&");
    if !query.is_empty() {
        joined.push('?');
        joined.push_str(&query);
    }
    joined
}

fn forwarded_headers(incoming: &HeaderMap, backend: &Backend, client_addr: SocketAddr) -> HeaderMap {
    let mut headers = incoming.clone();
    strip_hop_by_hop(&mut headers);

    let original_host = headers.remove(header::HOST);
    if let Ok(host) = HeaderValue::from_str(backend.identity()) {
        headers.insert(header::HOST, host);
    }
    if let Some(host) = original_host {
        if !headers.contains_key(X_FORWARDED_HOST) {
            headers.insert(X_FORWARDED_HOST, host);
        }
    }

    let mut forwarded_for: Vec<String> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();
    forwarded_for.push(client_addr.ip().to_string());
    if let Ok(value) = HeaderValue::from_str(&forwarded_for.join(", ")) {
        headers.insert(X_FORWARDED_FOR, value);
    }

    if !headers.contains_key(X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }
    headers
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Forwards over a shared hyper client.
#[derive(Clone)]
pub struct HttpForwarder {
    client: Client<HttpConnector, Body>,
}

impl HttpForwarder {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }
}

impl Forward for HttpForwarder {
    async fn forward(
        &self,
        backend: &Backend,
        request: &ProxyRequest,
    ) -> Result<Response<Body>, UpstreamError> {
        let upstream = request.to_upstream(backend).map_err(|e| UpstreamError::Build {
            backend: backend.identity().to_string(),
            reason: e.to_string(),
        })?;

        let response: Response<Incoming> = self.client.request(upstream).await.map_err(|e| {
            let reason = error_chain(&e);
            if e.is_connect() {
                UpstreamError::Connect {
                    backend: backend.identity().to_string(),
                    reason,
                }
            } else {
                UpstreamError::Transport {
                    backend: backend.identity().to_string(),
                    reason,
                }
            }
        })?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}
