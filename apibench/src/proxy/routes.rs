//! HTTP route handlers for the proxy service

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::upstream::{UpstreamClient, UpstreamError};

/// Application state shared by the proxy routes
#[derive(Clone)]
pub struct ProxyAppState {
    pub upstream: UpstreamClient,
    /// Latency of the simulated `/io` upstream
    pub io_delay: Duration,
}

/// Error response for the proxy routes
#[derive(Debug, Serialize)]
pub struct ProxyErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<UpstreamError> for ProxyErrorResponse {
    fn from(e: UpstreamError) -> Self {
        Self {
            code: e.code().to_string(),
            error: e.to_string(),
        }
    }
}

impl IntoResponse for ProxyErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "upstream_timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };
        (status, Json(self)).into_response()
    }
}

/// Response for GET /api/call
#[derive(Debug, Serialize, Deserialize)]
pub struct CallResponse {
    /// Raw upstream body
    pub result: String,
}

fn upstream_failure(state: &ProxyAppState, e: UpstreamError) -> ProxyErrorResponse {
    match &e {
        UpstreamError::Timeout(_) => {
            tracing::warn!("Upstream {} timed out: {}", state.upstream.url(), e);
        }
        _ => {
            tracing::error!("Upstream {} failed: {}", state.upstream.url(), e);
        }
    }
    ProxyErrorResponse::from(e)
}

/// GET /api/call - Call the upstream and wrap its body as `{"result": ...}`
pub async fn call_json(
    State(state): State<ProxyAppState>,
) -> Result<Json<CallResponse>, ProxyErrorResponse> {
    let body = state
        .upstream
        .fetch_body()
        .await
        .map_err(|e| upstream_failure(&state, e))?;

    Ok(Json(CallResponse { result: body }))
}

/// GET /call - Call the upstream and pass its body through unchanged
pub async fn call_raw(State(state): State<ProxyAppState>) -> Result<Response, ProxyErrorResponse> {
    let body = state
        .upstream
        .fetch_body()
        .await
        .map_err(|e| upstream_failure(&state, e))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}

/// GET /io - Simulated slow upstream
pub async fn simulated_io(State(state): State<ProxyAppState>) -> &'static str {
    tokio::time::sleep(state.io_delay).await;
    "ok"
}

/// Build proxy routes
pub fn proxy_routes(state: ProxyAppState) -> Router {
    Router::new()
        .route("/api/call", get(call_json))
        .route("/call", get(call_raw))
        .route("/io", get(simulated_io))
        .with_state(state)
}
