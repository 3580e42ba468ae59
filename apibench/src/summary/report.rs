//! Two-service comparison report
//!
//! Renders the per-service latency/success statistics of a [`RunSummary`]
//! side by side, followed by the relative difference of their averages and
//! P95s and a statement of which service was faster on average.

use super::{MetricSummary, RunSummary};
use crate::load::metrics::builtin;

const WIDTH: usize = 64;

/// Metric names and display label of one compared service
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub label: String,
    pub icon: String,
    /// Trend metric holding request durations
    pub duration_metric: String,
    /// Rate metric holding per-request success
    pub success_metric: String,
}

impl ServiceMetrics {
    pub fn new(label: &str, icon: &str, metric_prefix: &str) -> Self {
        Self {
            label: label.to_string(),
            icon: icon.to_string(),
            duration_metric: format!("{}_duration", metric_prefix),
            success_metric: format!("{}_success_rate", metric_prefix),
        }
    }
}

/// Statistics of one service, with missing aggregates resolved to zero
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ServiceStats {
    /// Success rate as a fraction
    pub success_rate: f64,
    pub avg: f64,
    pub med: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
}

impl ServiceStats {
    pub fn resolve(duration: &MetricSummary, success: &MetricSummary) -> Self {
        let stat = |metric: &MetricSummary, key: &str| metric.value(key).unwrap_or(0.0);
        Self {
            success_rate: stat(success, "rate"),
            avg: stat(duration, "avg"),
            med: stat(duration, "med"),
            p95: stat(duration, "p(95)"),
            p99: stat(duration, "p(99)"),
            min: stat(duration, "min"),
            max: stat(duration, "max"),
        }
    }

    pub fn success_percent(&self) -> f64 {
        self.success_rate * 100.0
    }
}

/// `(other - base) / base` as a percentage; `None` unless `base > 0`
pub fn relative_difference(base: f64, other: f64) -> Option<f64> {
    (base > 0.0).then(|| (other - base) / base * 100.0)
}

fn format_difference(diff: Option<f64>) -> String {
    match diff {
        Some(d) => format!("{:.2}%", d),
        None => "N/A".to_string(),
    }
}

/// A pair of services compared in the report
#[derive(Debug, Clone)]
pub struct Comparison {
    pub title: String,
    pub first: ServiceMetrics,
    pub second: ServiceMetrics,
}

impl Comparison {
    /// Go API (`go_api_*`) against Laravel API (`laravel_api_*`)
    pub fn go_vs_laravel() -> Self {
        Self {
            title: "Laravel vs Go API Performance Comparison".to_string(),
            first: ServiceMetrics::new("Go API", "🚀", "go_api"),
            second: ServiceMetrics::new("Laravel API", "🐘", "laravel_api"),
        }
    }

    /// The service with the lower average.
    ///
    /// The first service wins only if both averages are positive and it is
    /// strictly lower; ties and missing data go to the second service.
    pub fn faster(&self, first: &ServiceStats, second: &ServiceStats) -> &ServiceMetrics {
        if first.avg > 0.0 && second.avg > 0.0 && first.avg < second.avg {
            &self.first
        } else {
            &self.second
        }
    }

    fn header(&self) -> String {
        let bar = "═".repeat(WIDTH);
        format!(
            "╔{bar}╗\n║{title:^width$}║\n╚{bar}╝\n",
            bar = bar,
            title = self.title,
            width = WIDTH
        )
    }

    /// Report emitted when any of the four required metrics is missing
    pub fn insufficient_data_report(&self) -> String {
        format!(
            "\n{}\n\
             ❌ Incomplete test data, unable to generate the report\n\
             Please check:\n\
             - the services are running\n\
             - at least one request completed successfully\n\
             - the network connection is working\n",
            self.header()
        )
    }

    /// Render the comparison for `summary`
    pub fn render(&self, summary: &RunSummary) -> String {
        let (
            Some(first_duration),
            Some(second_duration),
            Some(first_success),
            Some(second_success),
        ) = (
            summary.metric(&self.first.duration_metric),
            summary.metric(&self.second.duration_metric),
            summary.metric(&self.first.success_metric),
            summary.metric(&self.second.success_metric),
        )
        else {
            return self.insufficient_data_report();
        };

        let first = ServiceStats::resolve(first_duration, first_success);
        let second = ServiceStats::resolve(second_duration, second_success);

        let total_requests = summary
            .metric(builtin::HTTP_REQS)
            .and_then(|m| m.value("count"))
            .unwrap_or(0.0);
        let rule = "─".repeat(WIDTH);

        let mut out = format!("\n{}\n", self.header());
        out.push_str(&format!(
            "📊 Test Statistics\n{rule}\nTotal requests: {}\nTest duration:  {:.2}s\n",
            total_requests as u64,
            summary.state.test_run_duration_ms / 1000.0,
        ));

        for (service, stats) in [(&self.first, &first), (&self.second, &second)] {
            out.push_str(&service_section(service, stats, &rule));
        }

        out.push_str(&format!(
            "\n⚡ Comparison\n{rule}\n\
             Average response time difference: {}\n\
             P95 response time difference:     {}\n\
             \n✅ {} has the faster average response time\n",
            format_difference(relative_difference(first.avg, second.avg)),
            format_difference(relative_difference(first.p95, second.p95)),
            self.faster(&first, &second).label,
        ));

        out
    }
}

fn service_section(service: &ServiceMetrics, stats: &ServiceStats, rule: &str) -> String {
    format!(
        "\n{} {} Performance\n{rule}\n\
         Success rate:  {:.2}%\n\
         Average:       {:.2}ms\n\
         Median:        {:.2}ms\n\
         P95:           {:.2}ms\n\
         P99:           {:.2}ms\n\
         Min:           {:.2}ms\n\
         Max:           {:.2}ms\n",
        service.icon,
        service.label,
        stats.success_percent(),
        stats.avg,
        stats.med,
        stats.p95,
        stats.p99,
        stats.min,
        stats.max,
    )
}
