//! Pass/fail thresholds evaluated against aggregated metrics at test end

use super::metrics::{Metric, Stat};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("Invalid threshold expression {0:?}: expected <stat> <op> <number>, e.g. p(95)<3000")]
    InvalidExpression(String),

    #[error("Invalid threshold statistic in {0:?}")]
    InvalidStat(String),

    #[error("Invalid threshold value in {0:?}")]
    InvalidValue(String),
}

/// Comparison operator of a threshold expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Op {
    // Two-character operators first so `<=` is not read as `<`
    const ALL: [(&'static str, Op); 6] = [
        ("<=", Op::Le),
        (">=", Op::Ge),
        ("==", Op::Eq),
        ("!=", Op::Ne),
        ("<", Op::Lt),
        (">", Op::Gt),
    ];

    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Op::Lt => lhs < rhs,
            Op::Le => lhs <= rhs,
            Op::Gt => lhs > rhs,
            Op::Ge => lhs >= rhs,
            Op::Eq => lhs == rhs,
            Op::Ne => lhs != rhs,
        }
    }
}

/// A single expression such as `p(95)<3000` or `rate>0.95`
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    source: String,
    stat: Stat,
    op: Op,
    value: f64,
}

impl ThresholdExpr {
    /// Expression as written in the configuration
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn stat(&self) -> Stat {
        self.stat
    }

    /// Evaluate against a metric; a missing metric or statistic fails
    pub fn evaluate(&self, metric: Option<&Metric>, elapsed: Duration) -> bool {
        metric
            .and_then(|m| m.stat(self.stat, elapsed))
            .is_some_and(|actual| self.op.apply(actual, self.value))
    }
}

impl FromStr for ThresholdExpr {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let source: String = s.chars().filter(|c| !c.is_whitespace()).collect();

        let (idx, token, op) = Op::ALL
            .iter()
            .filter_map(|(token, op)| source.find(token).map(|idx| (idx, *token, *op)))
            .min_by_key(|(idx, token, _)| (*idx, std::cmp::Reverse(token.len())))
            .ok_or_else(|| ThresholdError::InvalidExpression(s.to_string()))?;

        let stat = source[..idx]
            .parse::<Stat>()
            .map_err(|_| ThresholdError::InvalidStat(s.to_string()))?;
        let value = source[idx + token.len()..]
            .parse::<f64>()
            .map_err(|_| ThresholdError::InvalidValue(s.to_string()))?;

        Ok(Self {
            source,
            stat,
            op,
            value,
        })
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// All expressions configured for one metric
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub expressions: Vec<ThresholdExpr>,
}

impl Threshold {
    pub fn new(metric: &str, expressions: &[&str]) -> Result<Self, ThresholdError> {
        Ok(Self {
            metric: metric.to_string(),
            expressions: expressions
                .iter()
                .map(|e| e.parse())
                .collect::<Result<_, _>>()?,
        })
    }
}
