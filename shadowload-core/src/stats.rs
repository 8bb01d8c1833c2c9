use crate::{EvaluationError, RunConfig, ThresholdMetric, ThresholdSpec};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Latency distribution summary in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min: f64,
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

/// Aggregated statistics for one route, or for every request when `name` is `all`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteSummary {
    pub name: String,
    pub requests: u64,
    /// Requests classified as failed by the route's success policy, network errors included.
    pub errors: u64,
    pub network_errors: u64,
    /// Raw response status counts.
    pub statuses: BTreeMap<u16, u64>,
    pub requests_per_second: f64,
    /// `None` when nothing was recorded.
    pub latency: Option<LatencySummary>,
}

impl RouteSummary {
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.
        } else {
            self.errors as f64 / self.requests as f64
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ThresholdOutcome {
    /// `observed` is in milliseconds for latency thresholds and a ratio for error rates.
    Passed { observed: f64 },
    Failed { observed: f64 },
    Error { reason: EvaluationError },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub spec: ThresholdSpec,
    pub outcome: ThresholdOutcome,
}

impl ThresholdResult {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, ThresholdOutcome::Passed { .. })
    }

    pub fn observed(&self) -> Option<f64> {
        match self.outcome {
            ThresholdOutcome::Passed { observed } | ThresholdOutcome::Failed { observed } => {
                Some(observed)
            }
            ThresholdOutcome::Error { .. } => None,
        }
    }

    fn format_observed(&self, observed: f64) -> String {
        match self.spec.metric {
            ThresholdMetric::Latency { .. } => format!("{observed:.1}ms"),
            ThresholdMetric::ErrorRate => format!("{:.2}%", observed * 100.),
        }
    }
}

/// Overall result of a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    /// At least one threshold was evaluated and missed.
    Failed,
    /// No threshold was missed, but at least one could not be evaluated.
    EvaluationError,
}

impl Verdict {
    /// A run passes only when every threshold passes. A miss outranks an evaluation error.
    pub fn from_results(results: &[ThresholdResult]) -> Self {
        if results
            .iter()
            .any(|r| matches!(r.outcome, ThresholdOutcome::Failed { .. }))
        {
            Verdict::Failed
        } else if results
            .iter()
            .any(|r| matches!(r.outcome, ThresholdOutcome::Error { .. }))
        {
            Verdict::EvaluationError
        } else {
            Verdict::Passed
        }
    }

    /// Process exit status for CI integration.
    pub const fn exit_code(self) -> i32 {
        match self {
            Verdict::Passed => 0,
            Verdict::Failed => 1,
            Verdict::EvaluationError => 3,
        }
    }
}

/// Exit status used for configuration errors.
pub const CONFIG_ERROR_EXIT_CODE: i32 = 2;

/// Final summary of a run.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub config: RunConfig,
    pub weights: String,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub routes: Vec<RouteSummary>,
    pub total: RouteSummary,
    pub thresholds: Vec<ThresholdResult>,
    pub verdict: Verdict,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "shadow load against {} ({} virtual users, {:.1}s, weights {})",
            self.config.base_url,
            self.config.virtual_users,
            self.elapsed.as_secs_f64(),
            self.weights,
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "{:<10} {:>9} {:>8} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9}",
            "route", "requests", "errors", "req/s", "p50", "p90", "p95", "p99", "max"
        )?;
        for summary in self.routes.iter().chain(std::iter::once(&self.total)) {
            write!(
                f,
                "{:<10} {:>9} {:>8} {:>8.1}",
                summary.name, summary.requests, summary.errors, summary.requests_per_second
            )?;
            match &summary.latency {
                Some(l) => writeln!(
                    f,
                    " {:>7.1}ms {:>7.1}ms {:>7.1}ms {:>7.1}ms {:>7.1}ms",
                    l.p50, l.p90, l.p95, l.p99, l.max
                )?,
                None => writeln!(f, " {:>9} {:>9} {:>9} {:>9} {:>9}", "-", "-", "-", "-", "-")?,
            }
        }

        writeln!(f)?;
        writeln!(f, "statuses:")?;
        for summary in &self.routes {
            write!(f, "  {:<10}", summary.name)?;
            for (status, count) in &summary.statuses {
                write!(f, " {status}={count}")?;
            }
            if summary.network_errors > 0 {
                write!(f, " network_error={}", summary.network_errors)?;
            }
            writeln!(f)?;
        }

        writeln!(f)?;
        writeln!(f, "thresholds:")?;
        for result in &self.thresholds {
            match &result.outcome {
                ThresholdOutcome::Passed { observed } => writeln!(
                    f,
                    "  PASS  {} (observed {})",
                    result.spec,
                    result.format_observed(*observed)
                )?,
                ThresholdOutcome::Failed { observed } => writeln!(
                    f,
                    "  FAIL  {} (observed {})",
                    result.spec,
                    result.format_observed(*observed)
                )?,
                ThresholdOutcome::Error { reason } => {
                    writeln!(f, "  ERROR {} ({reason})", result.spec)?
                }
            }
        }

        writeln!(f)?;
        let verdict = match self.verdict {
            Verdict::Passed => "PASSED",
            Verdict::Failed => "FAILED",
            Verdict::EvaluationError => "EVALUATION ERROR",
        };
        write!(f, "result: {verdict}")
    }
}
