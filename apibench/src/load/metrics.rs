//! Metric samples, the sink handed to each iteration, and the collector
//! that aggregates samples into end-of-test values.

use crate::config::ConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Built-in metric names recorded by the load driver
pub mod builtin {
    pub const HTTP_REQS: &str = "http_reqs";
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    pub const ITERATIONS: &str = "iterations";
    pub const ITERATION_DURATION: &str = "iteration_duration";
    pub const CHECKS: &str = "checks";
    pub const VUS: &str = "vus";
    pub const VUS_MAX: &str = "vus_max";
}

/// Metric type, serialized as `"counter"`, `"gauge"`, `"rate"` or `"trend"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

/// What a metric's values represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    Default,
    /// Milliseconds
    Time,
}

/// An aggregate that can be reported for a metric or used in a threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stat {
    Avg,
    Min,
    Med,
    Max,
    Count,
    Rate,
    Value,
    Passes,
    Fails,
    /// Percentile in `(0, 100]`
    Percentile(f64),
}

impl Stat {
    /// Statistics reported for trend metrics unless configured otherwise
    pub fn default_trend_stats() -> Vec<Stat> {
        vec![
            Stat::Avg,
            Stat::Min,
            Stat::Med,
            Stat::Max,
            Stat::Percentile(90.0),
            Stat::Percentile(95.0),
            Stat::Percentile(99.0),
        ]
    }

    /// Key under which the statistic appears in summary values
    pub fn key(&self) -> String {
        match self {
            Stat::Avg => "avg".to_string(),
            Stat::Min => "min".to_string(),
            Stat::Med => "med".to_string(),
            Stat::Max => "max".to_string(),
            Stat::Count => "count".to_string(),
            Stat::Rate => "rate".to_string(),
            Stat::Value => "value".to_string(),
            Stat::Passes => "passes".to_string(),
            Stat::Fails => "fails".to_string(),
            Stat::Percentile(p) => format!("p({})", p),
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Stat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let stat = match s {
            "avg" => Stat::Avg,
            "min" => Stat::Min,
            "med" => Stat::Med,
            "max" => Stat::Max,
            "count" => Stat::Count,
            "rate" => Stat::Rate,
            "value" => Stat::Value,
            "passes" => Stat::Passes,
            "fails" => Stat::Fails,
            _ => {
                let inner = s
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| ConfigError::InvalidStat(s.to_string()))?;
                let p: f64 = inner
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidStat(s.to_string()))?;
                if !(p > 0.0 && p <= 100.0) {
                    return Err(ConfigError::InvalidStat(s.to_string()));
                }
                Stat::Percentile(p)
            }
        };
        Ok(stat)
    }
}

/// Parse a comma-separated list of trend statistics, e.g. `avg,med,p(95)`
pub fn parse_trend_stats(s: &str) -> Result<Vec<Stat>, ConfigError> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// Event sent from virtual users to the collector
#[derive(Debug, Clone)]
pub enum MetricEvent {
    Sample {
        metric: String,
        kind: MetricKind,
        contains: ValueKind,
        value: f64,
    },
    Check {
        name: String,
        passed: bool,
    },
}

/// Handle used by iterations to record samples.
///
/// Cloned into every virtual user; all samples end up in one collector task.
#[derive(Debug, Clone)]
pub struct MetricSink {
    tx: mpsc::Sender<MetricEvent>,
}

impl MetricSink {
    async fn send(&self, event: MetricEvent) {
        // The collector only goes away once every sink is dropped
        let _ = self.tx.send(event).await;
    }

    pub async fn add_trend(&self, metric: &str, value: f64, contains: ValueKind) {
        self.send(MetricEvent::Sample {
            metric: metric.to_string(),
            kind: MetricKind::Trend,
            contains,
            value,
        })
        .await;
    }

    pub async fn add_rate(&self, metric: &str, passed: bool) {
        self.send(MetricEvent::Sample {
            metric: metric.to_string(),
            kind: MetricKind::Rate,
            contains: ValueKind::Default,
            value: if passed { 1.0 } else { 0.0 },
        })
        .await;
    }

    pub async fn add_counter(&self, metric: &str, value: f64) {
        self.send(MetricEvent::Sample {
            metric: metric.to_string(),
            kind: MetricKind::Counter,
            contains: ValueKind::Default,
            value,
        })
        .await;
    }

    pub async fn add_gauge(&self, metric: &str, value: f64) {
        self.send(MetricEvent::Sample {
            metric: metric.to_string(),
            kind: MetricKind::Gauge,
            contains: ValueKind::Default,
            value,
        })
        .await;
    }

    /// Record a named check and return whether it passed
    pub async fn check(&self, name: &str, passed: bool) -> bool {
        self.send(MetricEvent::Check {
            name: name.to_string(),
            passed,
        })
        .await;
        passed
    }
}

/// Spawn the collector task.
///
/// The returned handle resolves to the filled registry once every
/// [`MetricSink`] clone has been dropped.
pub fn spawn_collector(capacity: usize) -> (MetricSink, JoinHandle<MetricsRegistry>) {
    let (tx, mut rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(async move {
        let mut registry = MetricsRegistry::new();
        while let Some(event) = rx.recv().await {
            registry.record(event);
        }
        registry
    });
    (MetricSink { tx }, handle)
}

/// Raw accumulated data for a single metric
#[derive(Debug, Clone)]
enum Accumulator {
    Counter { sum: f64 },
    Gauge { last: f64, min: f64, max: f64 },
    Rate { passes: u64, fails: u64 },
    Trend { samples: Vec<f64> },
}

/// Metric with its accumulated samples
#[derive(Debug, Clone)]
pub struct Metric {
    kind: MetricKind,
    contains: ValueKind,
    data: Accumulator,
}

impl Metric {
    fn new(kind: MetricKind, contains: ValueKind) -> Self {
        let data = match kind {
            MetricKind::Counter => Accumulator::Counter { sum: 0.0 },
            MetricKind::Gauge => Accumulator::Gauge {
                last: 0.0,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            },
            MetricKind::Rate => Accumulator::Rate {
                passes: 0,
                fails: 0,
            },
            MetricKind::Trend => Accumulator::Trend {
                samples: Vec::new(),
            },
        };
        Self {
            kind,
            contains,
            data,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn contains(&self) -> ValueKind {
        self.contains
    }

    fn add(&mut self, value: f64) {
        match &mut self.data {
            Accumulator::Counter { sum } => *sum += value,
            Accumulator::Gauge { last, min, max } => {
                *last = value;
                *min = min.min(value);
                *max = max.max(value);
            }
            Accumulator::Rate { passes, fails } => {
                if value != 0.0 {
                    *passes += 1;
                } else {
                    *fails += 1;
                }
            }
            Accumulator::Trend { samples } => samples.push(value),
        }
    }

    /// Sort trend samples so percentile lookups are cheap
    fn finalize(&mut self) {
        if let Accumulator::Trend { samples } = &mut self.data {
            samples.sort_by(f64::total_cmp);
        }
    }

    /// Compute one statistic, or `None` if it does not apply to this metric.
    ///
    /// Trend statistics assume [`Metric::finalize`] has run.
    pub fn stat(&self, stat: Stat, elapsed: Duration) -> Option<f64> {
        match (&self.data, stat) {
            (Accumulator::Counter { sum }, Stat::Count) => Some(*sum),
            (Accumulator::Counter { sum }, Stat::Rate) => {
                let secs = elapsed.as_secs_f64();
                Some(if secs > 0.0 { sum / secs } else { 0.0 })
            }
            (Accumulator::Gauge { last, .. }, Stat::Value) => Some(*last),
            (Accumulator::Gauge { min, .. }, Stat::Min) => Some(*min),
            (Accumulator::Gauge { max, .. }, Stat::Max) => Some(*max),
            (Accumulator::Rate { passes, fails }, Stat::Rate) => {
                let total = passes + fails;
                Some(if total > 0 {
                    *passes as f64 / total as f64
                } else {
                    0.0
                })
            }
            (Accumulator::Rate { passes, .. }, Stat::Passes) => Some(*passes as f64),
            (Accumulator::Rate { fails, .. }, Stat::Fails) => Some(*fails as f64),
            (Accumulator::Trend { samples }, stat) => trend_stat(samples, stat),
            _ => None,
        }
    }

    /// Statistics reported in the summary for this metric's kind
    pub fn summary_stats(&self, trend_stats: &[Stat]) -> Vec<Stat> {
        match self.kind {
            MetricKind::Counter => vec![Stat::Count, Stat::Rate],
            MetricKind::Gauge => vec![Stat::Value, Stat::Min, Stat::Max],
            MetricKind::Rate => vec![Stat::Rate, Stat::Passes, Stat::Fails],
            MetricKind::Trend => trend_stats.to_vec(),
        }
    }

    /// Summary values keyed by statistic name
    pub fn values(&self, trend_stats: &[Stat], elapsed: Duration) -> IndexMap<String, f64> {
        self.summary_stats(trend_stats)
            .into_iter()
            .filter_map(|stat| self.stat(stat, elapsed).map(|v| (stat.key(), v)))
            .collect()
    }
}

fn trend_stat(sorted: &[f64], stat: Stat) -> Option<f64> {
    match stat {
        Stat::Count => Some(sorted.len() as f64),
        Stat::Avg => Some(if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        }),
        Stat::Min => Some(sorted.first().copied().unwrap_or(0.0)),
        Stat::Max => Some(sorted.last().copied().unwrap_or(0.0)),
        Stat::Med => Some(percentile(sorted, 50.0)),
        Stat::Percentile(p) => Some(percentile(sorted, p)),
        _ => None,
    }
}

/// Linearly interpolated percentile (0-100) over sorted samples
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            if lower == upper {
                sorted[lower]
            } else {
                sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
            }
        }
    }
}

/// Pass/fail counts for one named check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckCounts {
    pub passes: u64,
    pub fails: u64,
}

/// All metrics and checks recorded during a run, in first-seen order
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    metrics: IndexMap<String, Metric>,
    checks: IndexMap<String, CheckCounts>,
    finalized: bool,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: MetricEvent) {
        match event {
            MetricEvent::Sample {
                metric,
                kind,
                contains,
                value,
            } => self.add_sample(metric, kind, contains, value),
            MetricEvent::Check { name, passed } => {
                let counts = self.checks.entry(name).or_default();
                if passed {
                    counts.passes += 1;
                } else {
                    counts.fails += 1;
                }
                self.add_sample(
                    builtin::CHECKS.to_string(),
                    MetricKind::Rate,
                    ValueKind::Default,
                    if passed { 1.0 } else { 0.0 },
                );
            }
        }
        self.finalized = false;
    }

    fn add_sample(&mut self, name: String, kind: MetricKind, contains: ValueKind, value: f64) {
        let metric = self
            .metrics
            .entry(name)
            .or_insert_with(|| Metric::new(kind, contains));
        if metric.kind != kind {
            warn!(
                "Dropping {:?} sample for metric registered as {:?}",
                kind, metric.kind
            );
            return;
        }
        metric.add(value);
    }

    /// Sort trend samples; call once before reading statistics
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        for metric in self.metrics.values_mut() {
            metric.finalize();
        }
        self.finalized = true;
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name)
    }

    pub fn metrics(&self) -> impl Iterator<Item = (&String, &Metric)> {
        self.metrics.iter()
    }

    pub fn checks(&self) -> impl Iterator<Item = (&String, &CheckCounts)> {
        self.checks.iter()
    }
}
