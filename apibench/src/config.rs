//! Runtime configuration
//!
//! Configuration is loaded from environment variables. Invalid values are
//! logged and the default is kept.

use crate::load::metrics::{Stat, parse_trend_stats};
use crate::load::profile::ProfileKind;
use crate::load::stages::{Stage, parse_stages};
use crate::load::thresholds::ThresholdError;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors raised while interpreting configuration values
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid stage {0:?}: expected <duration>:<vus>, e.g. 30s:100")]
    InvalidStage(String),

    #[error("Invalid duration {value:?}: {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("Stage list is empty")]
    EmptyStages,

    #[error("Invalid summary statistic: {0:?}")]
    InvalidStat(String),

    #[error("Unknown load profile: {0:?}")]
    UnknownProfile(String),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),
}

/// Main configuration shared by both binaries
#[derive(Debug, Clone)]
pub struct Config {
    /// Proxy bind address
    pub host: String,
    /// Proxy port
    pub port: u16,

    /// Proxy controller configuration
    pub proxy: ProxyConfig,

    /// Load driver configuration
    pub load: LoadConfig,

    /// End-of-test summary configuration
    pub summary: SummaryConfig,
}

/// Upstream proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upstream URL called by the controller action
    pub upstream_url: String,
    /// Timeout applied to the upstream call
    pub upstream_timeout: Duration,
    /// Latency of the simulated `/io` upstream
    pub io_delay: Duration,
}

/// Load driver configuration
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub profile: ProfileKind,
    pub go_api_url: String,
    pub laravel_api_url: String,
    /// Overrides the profile's ramp stages when set
    pub stages: Option<Vec<Stage>>,
    pub start_vus: usize,
    /// Sleep between iterations of one virtual user
    pub think_time: Duration,
    /// Upper bound used by the response-time check
    pub check_max_duration: Duration,
    pub request_timeout: Duration,
    /// How long in-flight iterations may run after the last stage ends
    pub graceful_stop: Duration,
}

/// Summary output configuration
#[derive(Debug, Clone)]
pub struct SummaryConfig {
    /// Where the raw JSON summary is written
    pub path: PathBuf,
    /// Statistics reported for trend metrics
    pub trend_stats: Vec<Stat>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            proxy: ProxyConfig::default(),
            load: LoadConfig::default(),
            summary: SummaryConfig::default(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream_url: "http://io-service:8080/io".to_string(),
            upstream_timeout: Duration::from_secs(2),
            io_delay: Duration::from_secs(1),
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            profile: ProfileKind::Comparison,
            go_api_url: "http://localhost:8081/call".to_string(),
            laravel_api_url: "http://localhost:9000/api/call".to_string(),
            stages: None,
            start_vus: 1,
            think_time: Duration::from_secs(1),
            check_max_duration: Duration::from_millis(2000),
            request_timeout: Duration::from_secs(60),
            graceful_stop: Duration::from_secs(30),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("summary.json"),
            trend_stats: Stat::default_trend_stats(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Proxy config
        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "PORT") {
            config.port = port;
        }
        if let Some(url) = lookup("UPSTREAM_URL")
            && !url.is_empty()
        {
            config.proxy.upstream_url = url;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "UPSTREAM_TIMEOUT_SECS") {
            if secs == 0 {
                warn!("Ignoring UPSTREAM_TIMEOUT_SECS: timeout must be at least 1 second");
            } else {
                config.proxy.upstream_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(ms) = parse_var(&lookup, "IO_DELAY_MS") {
            config.proxy.io_delay = Duration::from_millis(ms);
        }

        // Load config
        if let Some(val) = lookup("LOAD_PROFILE") {
            match val.parse() {
                Ok(profile) => config.load.profile = profile,
                Err(e) => warn!("Ignoring LOAD_PROFILE: {}", e),
            }
        }
        if let Some(url) = lookup("GO_API_URL")
            && !url.is_empty()
        {
            config.load.go_api_url = url;
        }
        if let Some(url) = lookup("LARAVEL_API_URL")
            && !url.is_empty()
        {
            config.load.laravel_api_url = url;
        }
        if let Some(val) = lookup("LOAD_STAGES")
            && !val.is_empty()
        {
            match parse_stages(&val) {
                Ok(stages) => config.load.stages = Some(stages),
                Err(e) => warn!("Ignoring LOAD_STAGES: {}", e),
            }
        }
        if let Some(vus) = parse_var(&lookup, "LOAD_START_VUS") {
            config.load.start_vus = vus;
        }
        if let Some(ms) = parse_var(&lookup, "LOAD_THINK_TIME_MS") {
            config.load.think_time = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "LOAD_CHECK_MAX_DURATION_MS") {
            config.load.check_max_duration = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "LOAD_REQUEST_TIMEOUT_SECS") {
            if secs == 0 {
                warn!("Ignoring LOAD_REQUEST_TIMEOUT_SECS: timeout must be at least 1 second");
            } else {
                config.load.request_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(secs) = parse_var(&lookup, "LOAD_GRACEFUL_STOP_SECS") {
            config.load.graceful_stop = Duration::from_secs(secs);
        }

        // Summary config
        if let Some(path) = lookup("SUMMARY_PATH")
            && !path.is_empty()
        {
            config.summary.path = PathBuf::from(path);
        }
        if let Some(val) = lookup("SUMMARY_TREND_STATS")
            && !val.is_empty()
        {
            match parse_trend_stats(&val) {
                Ok(stats) => config.summary.trend_stats = stats,
                Err(e) => warn!("Ignoring SUMMARY_TREND_STATS: {}", e),
            }
        }

        config
    }
}

/// Parse a numeric variable, warning when it is set but malformed
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", key, raw, e);
            None
        }
    }
}
