//! Request dispatch with bounded retry and failover.
//!
//! # State Machine
//! ```text
//! Dispatch ──attempts > max──────────────────────────▶ 503
//!    │  └──no live backend────────────────────────────▶ 503
//!    ▼
//! Forward ──response─────────────────────────────────▶ Forwarded
//!    │ upstream error
//!    ▼
//! RetryUpstream ──retries < max: wait, retries + 1──▶ Forward (same backend)
//!    │ retries exhausted
//!    ▼
//! Failover ──mark backend dead, attempts + 1────────▶ Dispatch
//! ```
//!
//! Retries are counted per request and survive failover, so only the first
//! backend gets resubmissions; each later one is abandoned on its first
//! error. A request makes at most `max_retries + max_attempts + 1` upstream
//! contacts.

use std::sync::Arc;
use std::time::Instant;

use axum::response::Response;
use tokio::time;

use crate::http::forward::{Forward, ProxyRequest};
use crate::http::response::service_unavailable;
use crate::load_balancer::{Backend, ServerPool};
use crate::observability::metrics;
use crate::resilience::{RetryPolicy, RetryState};

enum Step {
    Dispatch(RetryState),
    Forward(Arc<Backend>, RetryState),
    RetryUpstream(Arc<Backend>, RetryState),
    Failover(Arc<Backend>, RetryState),
}

/// Selects backends from the shared pool and drives each request to a
/// forwarded response or a 503.
pub struct RequestDispatcher<F> {
    pool: Arc<ServerPool>,
    forwarder: F,
    policy: RetryPolicy,
}

impl<F: Forward> RequestDispatcher<F> {
    pub fn new(pool: Arc<ServerPool>, forwarder: F, policy: RetryPolicy) -> Self {
        Self {
            pool,
            forwarder,
            policy,
        }
    }

    /// Handle a fresh request.
    pub async fn serve(&self, request: &ProxyRequest) -> Response {
        self.dispatch(request, RetryState::default()).await
    }

    /// Drive `request` from the `Dispatch` state with the given counters.
    pub async fn dispatch(&self, request: &ProxyRequest, state: RetryState) -> Response {
        let start = Instant::now();
        let mut step = Step::Dispatch(state);

        loop {
            step = match step {
                Step::Dispatch(state) => {
                    if !self.policy.can_attempt(state) {
                        tracing::warn!(
                            request_id = %request.request_id,
                            remote_addr = %request.client_addr,
                            path = %request.path(),
                            attempts = state.attempts,
                            "Max attempts reached, terminating"
                        );
                        metrics::record_request(503, "none", start);
                        return service_unavailable();
                    }

                    match self.pool.get_next_peer() {
                        Some(backend) => Step::Forward(backend, state),
                        None => {
                            tracing::warn!(
                                request_id = %request.request_id,
                                remote_addr = %request.client_addr,
                                path = %request.path(),
                                attempts = state.attempts,
                                "No backend available"
                            );
                            metrics::record_request(503, "none", start);
                            return service_unavailable();
                        }
                    }
                }

                Step::Forward(backend, state) => {
                    tracing::debug!(
                        request_id = %request.request_id,
                        backend = %backend,
                        attempts = state.attempts,
                        retries = state.retries,
                        "Forwarding request"
                    );
                    match self.forwarder.forward(&backend, request).await {
                        Ok(response) => {
                            metrics::record_request(
                                response.status().as_u16(),
                                backend.identity(),
                                start,
                            );
                            return response;
                        }
                        Err(e) => {
                            tracing::warn!(
                                request_id = %request.request_id,
                                backend = %backend,
                                attempts = state.attempts,
                                retries = state.retries,
                                error = %e,
                                "Upstream error"
                            );
                            Step::RetryUpstream(backend, state)
                        }
                    }
                }

                Step::RetryUpstream(backend, state) => {
                    if self.policy.can_retry(state) {
                        time::sleep(self.policy.backoff).await;
                        metrics::record_retry(backend.identity());
                        Step::Forward(backend, state.next_retry())
                    } else {
                        Step::Failover(backend, state)
                    }
                }

                Step::Failover(backend, state) => {
                    self.pool.mark_backend_status(backend.identity(), false);
                    metrics::record_failover(backend.identity());
                    metrics::record_backend_alive(backend.identity(), false);

                    let next = state.next_attempt();
                    tracing::info!(
                        request_id = %request.request_id,
                        remote_addr = %request.client_addr,
                        path = %request.path(),
                        backend = %backend,
                        attempts = next.attempts,
                        "Backend marked dead, attempting failover"
                    );
                    Step::Dispatch(next)
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::forward::UpstreamError;
    use crate::http::response::SERVICE_UNAVAILABLE_MESSAGE;
    use axum::body::{Body, Bytes};
    use axum::http::{HeaderMap, Method, StatusCode};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    const ALWAYS: u32 = u32::MAX;

    /// Fails each backend a scripted number of times, then answers with
    /// the backend's identity as the body.
    #[derive(Default)]
    struct ScriptedForwarder {
        failures: Mutex<HashMap<String, u32>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedForwarder {
        fn failing(script: &[(&str, u32)]) -> Self {
            let failures = script
                .iter()
                .map(|(id, n)| (id.to_string(), *n))
                .collect();
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Forward for Arc<ScriptedForwarder> {
        async fn forward(
            &self,
            backend: &Backend,
            _request: &ProxyRequest,
        ) -> Result<Response<Body>, UpstreamError> {
            let id = backend.identity().to_string();
            self.calls.lock().unwrap().push(id.clone());

            let fail = {
                let mut failures = self.failures.lock().unwrap();
                match failures.get_mut(&id) {
                    Some(left) if *left == ALWAYS => true,
                    Some(left) if *left > 0 => {
                        *left -= 1;
                        true
                    }
                    _ => false,
                }
            };

            if fail {
                Err(UpstreamError::Connect {
                    backend: id,
                    reason: "connection refused".into(),
                })
            } else {
                Ok(Response::new(Body::from(id)))
            }
        }
    }

    fn request() -> ProxyRequest {
        ProxyRequest {
            method: Method::GET,
            uri: "/orders".parse().unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            client_addr: "192.168.1.100:54321".parse().unwrap(),
            request_id: "test".into(),
        }
    }

    fn pool(ids: &[&str]) -> Arc<ServerPool> {
        let urls: Vec<String> = ids.iter().map(|id| format!("http://{}", id)).collect();
        Arc::new(ServerPool::from_urls(&urls).unwrap())
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            backoff: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    async fn body_of(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_to_selected_backend() {
        let forwarder = Arc::new(ScriptedForwarder::default());
        let dispatcher = RequestDispatcher::new(pool(&["10.0.0.1:80"]), forwarder.clone(), fast_policy());

        let response = dispatcher.serve(&request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "10.0.0.1:80");
        assert_eq!(forwarder.calls(), vec!["10.0.0.1:80"]);
    }

    #[tokio::test]
    async fn test_attempts_over_limit_is_503_without_contact() {
        let forwarder = Arc::new(ScriptedForwarder::default());
        let pool = pool(&["10.0.0.1:80", "10.0.0.2:80"]);
        let dispatcher = RequestDispatcher::new(pool.clone(), forwarder.clone(), fast_policy());

        let over = RetryState::new(RetryPolicy::default().max_attempts + 1, 0);
        let response = dispatcher.dispatch(&request(), over).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_of(response).await, SERVICE_UNAVAILABLE_MESSAGE);
        assert!(forwarder.calls().is_empty());
        // No selection happened either: the cursor has not moved.
        assert_eq!(pool.next_index(), 1);
    }

    #[tokio::test]
    async fn test_all_dead_is_503() {
        let forwarder = Arc::new(ScriptedForwarder::default());
        let pool = pool(&["10.0.0.1:80", "10.0.0.2:80"]);
        for b in pool.backends() {
            b.set_alive(false);
        }
        let dispatcher = RequestDispatcher::new(pool, forwarder.clone(), fast_policy());

        let response = dispatcher.serve(&request()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(forwarder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_retries_same_backend() {
        let forwarder = Arc::new(ScriptedForwarder::failing(&[("10.0.0.1:80", 2)]));
        let pool = pool(&["10.0.0.1:80", "10.0.0.2:80"]);
        // Make the first pick land on 10.0.0.1.
        pool.backends()[1].set_alive(false);
        let dispatcher = RequestDispatcher::new(pool.clone(), forwarder.clone(), fast_policy());

        let response = dispatcher.serve(&request()).await;
        assert_eq!(body_of(response).await, "10.0.0.1:80");
        assert_eq!(forwarder.calls(), vec!["10.0.0.1:80"; 3]);
        assert!(pool.backends()[0].is_alive());
    }

    #[tokio::test]
    async fn test_refused_backend_fails_over_after_retries() {
        // Fresh cursor picks index 1 first.
        let forwarder = Arc::new(ScriptedForwarder::failing(&[("10.0.0.2:80", ALWAYS)]));
        let pool = pool(&["10.0.0.1:80", "10.0.0.2:80"]);
        let policy = RetryPolicy::default();
        let dispatcher = RequestDispatcher::new(pool.clone(), forwarder.clone(), policy);

        let started = Instant::now();
        let response = dispatcher.serve(&request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "10.0.0.1:80");

        let calls = forwarder.calls();
        let tries_on_dead = policy.max_retries as usize + 1;
        assert_eq!(calls.len(), tries_on_dead + 1);
        assert!(calls[..tries_on_dead].iter().all(|c| c == "10.0.0.2:80"));
        assert_eq!(calls[tries_on_dead], "10.0.0.1:80");

        assert!(started.elapsed() >= policy.backoff * policy.max_retries);
        assert!(!pool.backends()[1].is_alive());
        assert!(pool.backends()[0].is_alive());
    }

    #[tokio::test]
    async fn test_every_backend_failing_exhausts_pool() {
        let forwarder = Arc::new(ScriptedForwarder::failing(&[
            ("10.0.0.1:80", ALWAYS),
            ("10.0.0.2:80", ALWAYS),
        ]));
        let pool = pool(&["10.0.0.1:80", "10.0.0.2:80"]);
        let dispatcher = RequestDispatcher::new(pool.clone(), forwarder.clone(), fast_policy());

        let response = dispatcher.serve(&request()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        // Four tries on the first pick, then the second is dropped on its
        // first error because the retries are already spent.
        assert_eq!(
            forwarder.calls(),
            vec!["10.0.0.2:80", "10.0.0.2:80", "10.0.0.2:80", "10.0.0.2:80", "10.0.0.1:80"]
        );
        assert_eq!(pool.alive_count(), 0);
    }

    #[tokio::test]
    async fn test_upstream_contacts_are_bounded() {
        let ids = ["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80", "10.0.0.4:80", "10.0.0.5:80", "10.0.0.6:80"];
        let script: Vec<(&str, u32)> = ids.iter().map(|id| (*id, ALWAYS)).collect();
        let forwarder = Arc::new(ScriptedForwarder::failing(&script));
        let policy = fast_policy();
        let dispatcher = RequestDispatcher::new(pool(&ids), forwarder.clone(), policy);

        let response = dispatcher.serve(&request()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let calls = forwarder.calls();
        let max_contacts = policy.max_upstream_contacts() as usize;
        assert_eq!(calls.len(), max_contacts);
        assert!(calls.len() <= (policy.max_attempts * policy.max_retries) as usize);

        // Only the first backend is resubmitted to.
        assert_eq!(calls[..4], ["10.0.0.2:80"; 4]);
        assert_eq!(calls[4..], ["10.0.0.3:80", "10.0.0.4:80", "10.0.0.5:80"]);
    }

    #[tokio::test]
    async fn test_concurrent_requests_keep_own_counters() {
        let forwarder = Arc::new(ScriptedForwarder::failing(&[("10.0.0.2:80", 1)]));
        let pool = pool(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]);
        let dispatcher = Arc::new(RequestDispatcher::new(pool.clone(), forwarder.clone(), fast_policy()));

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move { dispatcher.serve(&request()).await.status() })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), StatusCode::OK);
        }
        // A single transient failure never exhausts a backend's retries.
        assert_eq!(pool.alive_count(), 3);
        assert_eq!(forwarder.calls().len(), 13);
    }
}
