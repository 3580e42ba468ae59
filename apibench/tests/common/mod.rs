//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

use apibench::proxy::{ProxyAppState, UpstreamClient, proxy_routes};
use axum::{Router, http::StatusCode, routing::get};
use std::net::SocketAddr;
use std::time::Duration;

/// Serve `router` on an ephemeral local port
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    addr
}

/// Upstream mock answering `/io` with 200 and `body` after `delay`
pub async fn spawn_upstream(body: &'static str, delay: Duration) -> SocketAddr {
    let handler = move || async move {
        tokio::time::sleep(delay).await;
        body
    };
    spawn_server(Router::new().route("/io", get(handler))).await
}

/// Upstream mock answering `/io` with `status`
pub async fn spawn_failing_upstream(status: StatusCode) -> SocketAddr {
    let handler = move || async move { (status, "upstream exploded") };
    spawn_server(Router::new().route("/io", get(handler))).await
}

/// Upstream mock that accepts requests and never answers
pub async fn spawn_hanging_upstream() -> SocketAddr {
    let handler = || async {
        std::future::pending::<()>().await;
        "unreachable"
    };
    spawn_server(Router::new().route("/io", get(handler))).await
}

/// A local address with nothing listening on it
pub async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    drop(listener);
    addr
}

/// Proxy router pointed at `upstream` with the given timeout
pub fn create_proxy_app(upstream: SocketAddr, timeout: Duration) -> Router {
    let upstream = UpstreamClient::new(format!("http://{}/io", upstream), timeout)
        .expect("Failed to build upstream client");
    proxy_routes(ProxyAppState {
        upstream,
        io_delay: Duration::from_millis(10),
    })
}

/// Initialize test logging for detailed output
#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apibench=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
