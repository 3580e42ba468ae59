//! Ramping virtual-user executor
//!
//! A controller loop follows the ramp schedule, spawning one task per virtual
//! user and publishing the current target through a watch channel. Virtual
//! users above the target finish their iteration and exit. Samples flow to
//! a single collector task and are aggregated once at the end.

use super::metrics::{MetricSink, MetricsRegistry, Stat, ValueKind, builtin, spawn_collector};
use super::profile::Profile;
use super::script::{IterationContext, Script};
use crate::config::{Config, LoadConfig};
use crate::summary::{
    CheckSummary, GroupSummary, MetricSummary, RunState, RunSummary, ThresholdOutcome,
};
use chrono::Utc;
use futures_util::future::join_all;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often the controller re-evaluates the schedule
const TICK: Duration = Duration::from_millis(100);
/// How often progress is logged
const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);
/// Capacity of the sample channel
const SINK_CAPACITY: usize = 10_000;
/// Process exit code of a run that completed with failed thresholds
pub const THRESHOLDS_FAILED_EXIT_CODE: u8 = 99;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Metric collector failed: {0}")]
    Collector(#[from] tokio::task::JoinError),
}

/// Execution options shared by every profile
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub think_time: Duration,
    pub request_timeout: Duration,
    pub graceful_stop: Duration,
    pub trend_stats: Vec<Stat>,
}

impl Default for RunOptions {
    fn default() -> Self {
        let load = LoadConfig::default();
        Self {
            think_time: load.think_time,
            request_timeout: load.request_timeout,
            graceful_stop: load.graceful_stop,
            trend_stats: Stat::default_trend_stats(),
        }
    }
}

impl From<&Config> for RunOptions {
    fn from(config: &Config) -> Self {
        Self {
            think_time: config.load.think_time,
            request_timeout: config.load.request_timeout,
            graceful_stop: config.load.graceful_stop,
            trend_stats: config.summary.trend_stats.clone(),
        }
    }
}

/// Result of a finished run
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    /// False if any threshold failed, including thresholds on metrics that
    /// never received a sample
    pub thresholds_passed: bool,
}

impl RunOutcome {
    /// Exit code the CLI reports for this run
    pub fn exit_code(&self) -> u8 {
        if self.thresholds_passed {
            0
        } else {
            THRESHOLDS_FAILED_EXIT_CODE
        }
    }
}

/// Runs a [`Profile`] to completion and summarizes the result
pub struct LoadRunner {
    options: RunOptions,
}

impl LoadRunner {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    pub async fn run(&self, profile: &Profile) -> Result<RunOutcome, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(self.options.request_timeout)
            .pool_max_idle_per_host(profile.schedule.max_vus().max(1))
            .build()?;

        info!(
            profile = %profile.kind,
            stages = profile.schedule.stages().len(),
            max_vus = profile.schedule.max_vus(),
            "Starting load run ({:?} total)",
            profile.schedule.total_duration()
        );

        let started_at = Utc::now();
        let start = Instant::now();
        let (sink, collector) = spawn_collector(SINK_CAPACITY);
        let (target_tx, target_rx) = watch::channel(0usize);

        let mut vus: Vec<Option<JoinHandle<()>>> = Vec::new();
        let mut ticker = tokio::time::interval(TICK);
        let mut last_progress = Instant::now();
        let max_vus = profile.schedule.max_vus() as f64;

        loop {
            ticker.tick().await;
            let Some(target) = profile.schedule.target_at(start.elapsed()) else {
                break;
            };
            target_tx.send_replace(target);

            if vus.len() < target {
                vus.resize_with(target, || None);
            }
            for (id, slot) in vus.iter_mut().enumerate().take(target) {
                let alive = slot.as_ref().is_some_and(|h| !h.is_finished());
                if !alive {
                    let ctx = IterationContext {
                        vu: id,
                        iteration: 0,
                        client: client.clone(),
                        metrics: sink.clone(),
                    };
                    *slot = Some(tokio::spawn(run_vu(
                        profile.script.clone(),
                        ctx,
                        target_rx.clone(),
                        self.options.think_time,
                    )));
                }
            }

            let active = vus
                .iter()
                .flatten()
                .filter(|h| !h.is_finished())
                .count();
            sink.add_gauge(builtin::VUS, active as f64).await;
            sink.add_gauge(builtin::VUS_MAX, max_vus).await;

            if last_progress.elapsed() >= PROGRESS_INTERVAL {
                info!(
                    "running ({:.0}s), {} / {} VUs",
                    start.elapsed().as_secs_f64(),
                    active,
                    target
                );
                last_progress = Instant::now();
            }
        }

        // Ask every virtual user to stop after its current iteration
        target_tx.send_replace(0);
        let handles: Vec<JoinHandle<()>> = vus.into_iter().flatten().collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        debug!("Waiting for {} virtual users to finish", handles.len());

        if tokio::time::timeout(self.options.graceful_stop, join_all(handles))
            .await
            .is_err()
        {
            warn!(
                "Graceful stop of {:?} expired, aborting remaining iterations",
                self.options.graceful_stop
            );
            for abort in aborts {
                abort.abort();
            }
        }

        let elapsed = start.elapsed();
        drop(sink);
        let mut registry = collector.await?;
        registry.finalize();

        info!("Load run finished in {:.2}s", elapsed.as_secs_f64());
        Ok(summarize(
            &registry,
            profile,
            &self.options.trend_stats,
            elapsed,
            started_at,
        ))
    }
}

async fn run_vu(
    script: Arc<dyn Script>,
    mut ctx: IterationContext,
    target: watch::Receiver<usize>,
    think_time: Duration,
) {
    while keep_running(&target, ctx.vu) {
        let start = Instant::now();
        script.iteration(&mut ctx).await;
        tokio::time::sleep(think_time).await;

        let metrics: &MetricSink = &ctx.metrics;
        metrics.add_counter(builtin::ITERATIONS, 1.0).await;
        metrics
            .add_trend(
                builtin::ITERATION_DURATION,
                start.elapsed().as_secs_f64() * 1000.0,
                ValueKind::Time,
            )
            .await;
        ctx.iteration += 1;
    }
    debug!(vu = ctx.vu, iterations = ctx.iteration, "Virtual user stopped");
}

fn keep_running(target: &watch::Receiver<usize>, vu: usize) -> bool {
    *target.borrow() > vu
}

/// Aggregate the registry and evaluate thresholds
pub fn summarize(
    registry: &MetricsRegistry,
    profile: &Profile,
    trend_stats: &[Stat],
    elapsed: Duration,
    started_at: chrono::DateTime<Utc>,
) -> RunOutcome {
    let mut metrics: IndexMap<String, MetricSummary> = registry
        .metrics()
        .map(|(name, metric)| {
            (
                name.clone(),
                MetricSummary {
                    kind: metric.kind(),
                    contains: metric.contains(),
                    values: metric.values(trend_stats, elapsed),
                    thresholds: IndexMap::new(),
                },
            )
        })
        .collect();

    let mut thresholds_passed = true;
    for threshold in &profile.thresholds {
        let metric = registry.metric(&threshold.metric);
        for expr in &threshold.expressions {
            let ok = expr.evaluate(metric, elapsed);
            if !ok {
                warn!("Threshold {} on {} failed", expr, threshold.metric);
                thresholds_passed = false;
            }
            // A metric without samples is absent from the summary
            if let Some(summary) = metrics.get_mut(&threshold.metric) {
                summary
                    .thresholds
                    .insert(expr.source().to_string(), ThresholdOutcome { ok });
            }
        }
    }

    let summary = RunSummary {
        metrics,
        root_group: GroupSummary {
            name: String::new(),
            checks: registry
                .checks()
                .map(|(name, counts)| CheckSummary {
                    name: name.clone(),
                    passes: counts.passes,
                    fails: counts.fails,
                })
                .collect(),
        },
        state: RunState {
            test_run_duration_ms: elapsed.as_secs_f64() * 1000.0,
            test_run_started_at: Some(started_at),
        },
    };

    RunOutcome {
        summary,
        thresholds_passed,
    }
}
