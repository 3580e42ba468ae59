//! End-of-test summary: the aggregated data model, its JSON dump and the
//! text reports rendered from it.

pub mod report;
pub mod text;

use crate::load::metrics::{MetricKind, ValueKind};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub use report::{Comparison, ServiceMetrics, ServiceStats};
pub use text::render_run_report;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid summary JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Aggregated results of one run, keyed by metric name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub metrics: IndexMap<String, MetricSummary>,
    #[serde(default)]
    pub root_group: GroupSummary,
    #[serde(default)]
    pub state: RunState,
}

/// One aggregated metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSummary {
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default)]
    pub contains: ValueKind,
    /// Aggregates such as `avg`, `p(95)` or `rate`
    #[serde(default)]
    pub values: IndexMap<String, f64>,
    /// Threshold expression → outcome
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub thresholds: IndexMap<String, ThresholdOutcome>,
}

impl MetricSummary {
    /// Look up one aggregate; `None` when it was not reported
    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdOutcome {
    pub ok: bool,
}

/// Checks recorded at the top level of the script
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupSummary {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub checks: Vec<CheckSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    #[serde(default)]
    pub test_run_duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_run_started_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    /// True unless some recorded threshold failed
    pub fn thresholds_passed(&self) -> bool {
        self.metrics
            .values()
            .flat_map(|m| m.thresholds.values())
            .all(|t| t.ok)
    }

    /// Write the complete summary as JSON
    pub fn write_json(&self, path: &Path) -> Result<(), SummaryError> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        info!("Summary written to {:?}", path);
        Ok(())
    }

    /// Load a summary previously written by [`RunSummary::write_json`]
    pub fn load_json(path: &Path) -> Result<Self, SummaryError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
