//! Load driver: ramp schedule, iteration scripts, metrics and thresholds
//!
//! This module provides:
//! - `RampSchedule` for turning stages into a target virtual-user count
//! - `Script` trait and `TargetScript` for the per-iteration requests
//! - `MetricSink`/`MetricsRegistry` for collecting samples
//! - `LoadRunner` for executing a `Profile` and summarizing the run

pub mod metrics;
pub mod profile;
pub mod runner;
pub mod script;
pub mod stages;
pub mod thresholds;

pub use metrics::{MetricKind, MetricSink, MetricsRegistry, Stat, ValueKind};
pub use profile::{Profile, ProfileKind};
pub use runner::{LoadError, LoadRunner, RunOptions, RunOutcome, THRESHOLDS_FAILED_EXIT_CODE};
pub use script::{IterationContext, Script, Target, TargetScript};
pub use stages::{RampSchedule, Stage};
pub use thresholds::{Threshold, ThresholdError, ThresholdExpr};
