//! Client for the fixed upstream called by the controller action

use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Ways the upstream call can fail
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    #[error("Upstream returned status {0}")]
    BadStatus(u16),

    #[error("Upstream request failed: {0}")]
    Request(String),
}

impl UpstreamError {
    /// Label used for the `outcome` metric tag and error codes
    pub fn code(&self) -> &'static str {
        match self {
            UpstreamError::Timeout(_) => "upstream_timeout",
            UpstreamError::Unreachable(_) => "upstream_unreachable",
            UpstreamError::BadStatus(_) => "upstream_bad_status",
            UpstreamError::Request(_) => "upstream_error",
        }
    }
}

/// Shared HTTP client bound to one upstream URL
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET the upstream URL and return its raw body
    pub async fn fetch_body(&self) -> Result<String, UpstreamError> {
        let start = Instant::now();
        let result = self.fetch().await;
        let elapsed = start.elapsed();

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        metrics::counter!("apibench_upstream_requests_total", "outcome" => outcome).increment(1);
        metrics::histogram!("apibench_upstream_duration_seconds").record(elapsed.as_secs_f64());
        debug!(url = %self.url, outcome, "Upstream call took {:?}", elapsed);

        result
    }

    async fn fetch(&self) -> Result<String, UpstreamError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::BadStatus(status.as_u16()));
        }

        response.text().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else if err.is_connect() {
            UpstreamError::Unreachable(err.to_string())
        } else {
            UpstreamError::Request(err.to_string())
        }
    }
}
