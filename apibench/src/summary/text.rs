//! Generic end-of-test report used when no comparison is configured

use super::{MetricSummary, RunSummary};
use crate::load::metrics::{MetricKind, ValueKind};

const NAME_WIDTH: usize = 32;

fn format_time(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        format!("{:.2}ms", ms)
    }
}

fn format_values(metric: &MetricSummary) -> String {
    let value = |key: &str| metric.value(key).unwrap_or(0.0);
    match metric.kind {
        MetricKind::Trend => metric
            .values
            .iter()
            .map(|(key, v)| match metric.contains {
                ValueKind::Time => format!("{}={}", key, format_time(*v)),
                ValueKind::Default => format!("{}={:.2}", key, v),
            })
            .collect::<Vec<_>>()
            .join(" "),
        MetricKind::Rate => format!(
            "{:.2}% ✓ {} ✗ {}",
            value("rate") * 100.0,
            value("passes") as u64,
            value("fails") as u64
        ),
        MetricKind::Counter => format!("{} {:.2}/s", value("count") as u64, value("rate")),
        MetricKind::Gauge => format!(
            "{} min={} max={}",
            value("value") as u64,
            value("min") as u64,
            value("max") as u64
        ),
    }
}

/// Render checks, every metric and threshold outcomes as plain text
pub fn render_run_report(summary: &RunSummary) -> String {
    let mut lines: Vec<String> = Vec::new();

    if !summary.root_group.checks.is_empty() {
        lines.push(String::new());
        for check in &summary.root_group.checks {
            if check.fails == 0 {
                lines.push(format!("     ✓ {}", check.name));
            } else {
                let total = check.passes + check.fails;
                let pct = check.passes * 100 / total;
                lines.push(format!("     ✗ {}", check.name));
                lines.push(format!(
                    "      ↳  {}% ✓ {} / ✗ {}",
                    pct, check.passes, check.fails
                ));
            }
        }
    }

    lines.push(String::new());
    let mut names: Vec<&String> = summary.metrics.keys().collect();
    names.sort();
    for name in names {
        let metric = &summary.metrics[name];
        let marker = if metric.thresholds.is_empty() {
            " "
        } else if metric.thresholds.values().all(|t| t.ok) {
            "✓"
        } else {
            "✗"
        };
        lines.push(format!(
            "   {} {:.<width$}: {}",
            marker,
            name,
            format_values(metric),
            width = NAME_WIDTH
        ));
    }

    let thresholds: Vec<_> = summary
        .metrics
        .iter()
        .flat_map(|(name, m)| m.thresholds.iter().map(move |(expr, t)| (name, expr, t.ok)))
        .collect();
    if !thresholds.is_empty() {
        lines.push(String::new());
        lines.push("     THRESHOLDS".to_string());
        for (name, expr, ok) in thresholds {
            lines.push(format!("     {} {} {}", if ok { "✓" } else { "✗" }, name, expr));
        }
    }

    let result = if summary.thresholds_passed() {
        "passed"
    } else {
        "thresholds failed"
    };
    lines.push(String::new());
    lines.push(format!("     result: {}", result));
    lines.push(format!(
        "     duration: {:.2}s",
        summary.state.test_run_duration_ms / 1000.0
    ));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
