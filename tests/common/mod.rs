//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use balancer::config::BalancerConfig;
use balancer::{HttpServer, ServerPool, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// An address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Read a request head (up to the blank line) from `socket`.
async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Start a mock backend on `addr` that answers every request with `body`.
/// Aborting the returned handle closes the listening socket.
pub async fn start_mock_backend_on(addr: SocketAddr, body: &'static str) -> JoinHandle<()> {
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        read_head(&mut socket).await;
                        respond(&mut socket, "200 OK", body).await;
                    });
                }
                Err(_) => break,
            }
        }
    })
}

/// Start a mock backend on an ephemeral port.
pub async fn start_mock_backend(body: &'static str) -> (SocketAddr, JoinHandle<()>) {
    let addr = unused_addr().await;
    let handle = start_mock_backend_on(addr, body).await;
    (addr, handle)
}

/// Start a backend that answers with a fixed status code.
pub async fn start_status_backend(status: &'static str, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_head(&mut socket).await;
                respond(&mut socket, status, body).await;
            });
        }
    });
    addr
}

/// Start a backend that echoes the request head it received as the body.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                respond(&mut socket, "200 OK", &head).await;
            });
        }
    });
    addr
}

/// Configuration with the given backends and active health checks off.
pub fn config(backends: &[SocketAddr]) -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;
    config.backends = backends.iter().map(|a| format!("http://{}", a)).collect();
    config.health_check.enabled = false;
    config
}

/// A running balancer under test.
pub struct TestBalancer {
    pub addr: SocketAddr,
    pub pool: Arc<ServerPool>,
    pub shutdown: Shutdown,
}

impl TestBalancer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestBalancer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the balancer on an ephemeral port.
pub async fn start_balancer(config: BalancerConfig) -> TestBalancer {
    let server = HttpServer::new(config).expect("valid backend pool");
    let pool = server.pool().clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestBalancer {
        addr,
        pool,
        shutdown,
    }
}

/// A client that opens a fresh connection per request.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
