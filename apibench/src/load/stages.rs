//! Ramp stages and the virtual-user schedule derived from them

use crate::config::ConfigError;
use std::str::FromStr;
use std::time::Duration;

/// One ramp stage: move linearly to `target` virtual users over `duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub const fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

impl FromStr for Stage {
    type Err = ConfigError;

    /// Parse `<duration>:<vus>`, e.g. `30s:100` or `2m30s:300`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (duration, target) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidStage(s.to_string()))?;

        let duration = parse_duration(duration.trim())?;
        let target = target
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidStage(s.to_string()))?;

        Ok(Self { duration, target })
    }
}

/// Parse a human duration such as `30s`, `1m` or `2m30s`
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(s).map_err(|e| ConfigError::InvalidDuration {
        value: s.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a comma-separated stage list: `30s:100,1m:200,30s:0`
pub fn parse_stages(s: &str) -> Result<Vec<Stage>, ConfigError> {
    let stages = s
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<Stage>, _>>()?;

    if stages.is_empty() {
        return Err(ConfigError::EmptyStages);
    }
    Ok(stages)
}

/// Target virtual-user count as a function of elapsed run time
#[derive(Debug, Clone)]
pub struct RampSchedule {
    start_vus: usize,
    stages: Vec<Stage>,
}

impl RampSchedule {
    pub fn new(start_vus: usize, stages: Vec<Stage>) -> Self {
        Self { start_vus, stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Total length of all stages
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest number of virtual users the schedule ever asks for
    pub fn max_vus(&self) -> usize {
        self.stages
            .iter()
            .map(|s| s.target)
            .chain(std::iter::once(self.start_vus))
            .max()
            .unwrap_or(0)
    }

    /// Target VU count at `elapsed`, or `None` once the last stage has ended.
    ///
    /// Within a stage the count is interpolated linearly from the previous
    /// stage's target (or `start_vus` for the first stage) and rounded.
    pub fn target_at(&self, elapsed: Duration) -> Option<usize> {
        let mut from = self.start_vus;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let vus = from as f64 + (stage.target as f64 - from as f64) * progress;
                return Some(vus.round().max(0.0) as usize);
            }
            from = stage.target;
            stage_start = stage_end;
        }

        None
    }
}
