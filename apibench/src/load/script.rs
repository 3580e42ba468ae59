//! Iteration scripts executed by every virtual user

use super::metrics::{MetricSink, ValueKind, builtin};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

/// Per-virtual-user state handed to each iteration
pub struct IterationContext {
    /// Zero-based virtual user id
    pub vu: usize,
    /// Iterations completed so far by this virtual user
    pub iteration: u64,
    pub client: reqwest::Client,
    pub metrics: MetricSink,
}

/// Body of one virtual-user iteration.
///
/// Think time between iterations is applied by the runner, not the script.
#[async_trait]
pub trait Script: Send + Sync {
    async fn iteration(&self, ctx: &mut IterationContext);
}

/// An endpoint hit once per iteration
#[derive(Debug, Clone)]
pub struct Target {
    /// Display label, e.g. "Go API"; prefixes check names when set
    pub label: Option<String>,
    pub url: String,
    /// Prefix for the per-target `<prefix>_duration` and
    /// `<prefix>_success_rate` metrics
    pub metric_prefix: Option<String>,
}

impl Target {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            label: None,
            url: url.into(),
            metric_prefix: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_prefix = Some(prefix.into());
        self
    }
}

/// Target with its check and metric names resolved up front
#[derive(Debug, Clone)]
struct PreparedTarget {
    url: String,
    status_check: String,
    duration_check: String,
    duration_metric: Option<String>,
    success_metric: Option<String>,
}

impl PreparedTarget {
    fn new(target: Target, max_duration: Duration) -> Self {
        let prefix = target
            .label
            .as_deref()
            .map(|label| format!("{} ", label))
            .unwrap_or_default();

        Self {
            status_check: format!("{}status is 200", prefix),
            duration_check: format!(
                "{}response time < {}ms",
                prefix,
                max_duration.as_millis()
            ),
            duration_metric: target
                .metric_prefix
                .as_ref()
                .map(|p| format!("{}_duration", p)),
            success_metric: target
                .metric_prefix
                .as_ref()
                .map(|p| format!("{}_success_rate", p)),
            url: target.url,
        }
    }
}

/// Issues one GET per target, sequentially, and checks each response
pub struct TargetScript {
    targets: Vec<PreparedTarget>,
    max_duration: Duration,
}

impl TargetScript {
    /// `max_duration` is the bound used by the response-time check
    pub fn new(targets: Vec<Target>, max_duration: Duration) -> Self {
        Self {
            targets: targets
                .into_iter()
                .map(|t| PreparedTarget::new(t, max_duration))
                .collect(),
            max_duration,
        }
    }

    /// Names of every check this script records, in order
    pub fn check_names(&self) -> Vec<&str> {
        self.targets
            .iter()
            .flat_map(|t| [t.status_check.as_str(), t.duration_check.as_str()])
            .collect()
    }

    async fn hit(&self, target: &PreparedTarget, ctx: &IterationContext) {
        let start = Instant::now();
        let status = match ctx.client.get(&target.url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // Duration covers the full body, not just the headers
                match response.bytes().await {
                    Ok(_) => status,
                    Err(e) => {
                        debug!(vu = ctx.vu, url = %target.url, "Body read failed: {}", e);
                        0
                    }
                }
            }
            Err(e) => {
                debug!(vu = ctx.vu, url = %target.url, "Request failed: {}", e);
                0
            }
        };
        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        let sink = &ctx.metrics;
        sink.add_counter(builtin::HTTP_REQS, 1.0).await;
        sink.add_trend(builtin::HTTP_REQ_DURATION, elapsed_ms, ValueKind::Time)
            .await;
        sink.add_rate(builtin::HTTP_REQ_FAILED, status == 0 || status >= 400)
            .await;

        let status_ok = sink.check(&target.status_check, status == 200).await;
        let fast = sink
            .check(&target.duration_check, elapsed < self.max_duration)
            .await;

        if let Some(metric) = &target.success_metric {
            sink.add_rate(metric, status_ok && fast).await;
        }
        if let Some(metric) = &target.duration_metric {
            sink.add_trend(metric, elapsed_ms, ValueKind::Time).await;
        }
    }
}

#[async_trait]
impl Script for TargetScript {
    async fn iteration(&self, ctx: &mut IterationContext) {
        for target in &self.targets {
            self.hit(target, ctx).await;
        }
    }
}
