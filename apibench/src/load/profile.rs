//! Built-in load profiles

use super::script::{Script, Target, TargetScript};
use super::stages::{RampSchedule, Stage};
use super::thresholds::Threshold;
use crate::config::{ConfigError, LoadConfig};
use crate::summary::report::Comparison;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Which load profile to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ProfileKind {
    /// Go and Laravel endpoints hit back to back, compared at the end
    #[default]
    Comparison,
    /// Laravel endpoint only
    LaravelOnly,
}

impl ProfileKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProfileKind::Comparison => "comparison",
            ProfileKind::LaravelOnly => "laravel-only",
        }
    }

    pub fn default_stages(&self) -> Vec<Stage> {
        let s = Duration::from_secs;
        match self {
            ProfileKind::Comparison => vec![
                Stage::new(s(30), 100),
                Stage::new(s(60), 200),
                Stage::new(s(120), 300),
                Stage::new(s(60), 150),
                Stage::new(s(30), 0),
            ],
            ProfileKind::LaravelOnly => vec![
                Stage::new(s(30), 50),
                Stage::new(s(60), 100),
                Stage::new(s(60), 200),
                Stage::new(s(30), 0),
            ],
        }
    }

    fn thresholds(&self) -> Result<Vec<Threshold>, ConfigError> {
        let thresholds = match self {
            ProfileKind::Comparison => vec![
                Threshold::new("http_req_duration", &["p(95)<3000"])?,
                Threshold::new("go_api_success_rate", &["rate>0.95"])?,
                Threshold::new("laravel_api_success_rate", &["rate>0.95"])?,
            ],
            ProfileKind::LaravelOnly => vec![
                Threshold::new("http_req_duration", &["p(95)<2000"])?,
                Threshold::new("http_req_failed", &["rate<0.05"])?,
            ],
        };
        Ok(thresholds)
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProfileKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "comparison" => Ok(ProfileKind::Comparison),
            "laravel-only" | "laravel_only" => Ok(ProfileKind::LaravelOnly),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}

/// Everything the runner needs for one test run
pub struct Profile {
    pub kind: ProfileKind,
    pub schedule: RampSchedule,
    pub thresholds: Vec<Threshold>,
    pub script: Arc<dyn Script>,
    /// Services compared in the end-of-test report, if any
    pub comparison: Option<Comparison>,
}

impl Profile {
    pub fn from_config(config: &LoadConfig) -> Result<Self, ConfigError> {
        let kind = config.profile;
        let stages = config
            .stages
            .clone()
            .unwrap_or_else(|| kind.default_stages());

        let (targets, comparison) = match kind {
            ProfileKind::Comparison => {
                let comparison = Comparison::go_vs_laravel();
                let targets = vec![
                    Target::new(&config.go_api_url)
                        .with_label(&comparison.first.label)
                        .with_metric_prefix("go_api"),
                    Target::new(&config.laravel_api_url)
                        .with_label(&comparison.second.label)
                        .with_metric_prefix("laravel_api"),
                ];
                (targets, Some(comparison))
            }
            ProfileKind::LaravelOnly => (vec![Target::new(&config.laravel_api_url)], None),
        };

        Ok(Self {
            kind,
            schedule: RampSchedule::new(config.start_vus, stages),
            thresholds: kind.thresholds()?,
            script: Arc::new(TargetScript::new(targets, config.check_max_duration)),
            comparison,
        })
    }
}
