use crate::{ConfigError, Route};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Which requests a threshold is evaluated against.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MetricSelector {
    /// Every request, regardless of route.
    All,
    Route(Route),
}

impl fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSelector::All => f.write_str("all"),
            MetricSelector::Route(route) => write!(f, "{route}"),
        }
    }
}

impl FromStr for MetricSelector {
    type Err = ConfigError;

    /// Accepts `all`, the k6 names `http_req_duration`/`http_req_failed`, a route name, or
    /// `<route>_duration`/`<route>_failed`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "all" | "http_req_duration" | "http_req_failed" => Ok(MetricSelector::All),
            _ => {
                let route = s
                    .strip_suffix("_duration")
                    .or_else(|| s.strip_suffix("_failed"))
                    .unwrap_or(s);
                Ok(MetricSelector::Route(route.parse()?))
            }
        }
    }
}

/// The aggregate a threshold compares against its limit.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ThresholdMetric {
    /// Nearest-rank latency percentile in milliseconds, `percentile` in `(0, 100]`.
    Latency { percentile: f64 },
    /// Share of requests the route's success policy classified as failed, network errors
    /// included. In `[0, 1]`.
    ErrorRate,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    /// Whether `observed <op> limit` holds.
    pub fn holds(self, observed: f64, limit: f64) -> bool {
        match self {
            Comparator::Lt => observed < limit,
            Comparator::Le => observed <= limit,
            Comparator::Gt => observed > limit,
            Comparator::Ge => observed >= limit,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

/// An SLA assertion, e.g. `search: p(99) < 500` or `http_req_failed: rate < 0.01`.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdSpec {
    pub selector: MetricSelector,
    pub metric: ThresholdMetric,
    pub comparator: Comparator,
    /// Milliseconds for latency thresholds, a ratio for error rates.
    pub limit: f64,
}

impl ThresholdSpec {
    pub fn new(
        selector: MetricSelector,
        metric: ThresholdMetric,
        comparator: Comparator,
        limit: f64,
    ) -> Result<Self, ConfigError> {
        let spec = Self {
            selector,
            metric,
            comparator,
            limit,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// `selector: p(percentile) comparator limit_ms`.
    pub fn latency(
        selector: MetricSelector,
        percentile: f64,
        comparator: Comparator,
        limit_ms: f64,
    ) -> Result<Self, ConfigError> {
        Self::new(
            selector,
            ThresholdMetric::Latency { percentile },
            comparator,
            limit_ms,
        )
    }

    /// `selector: rate comparator limit`.
    pub fn error_rate(
        selector: MetricSelector,
        comparator: Comparator,
        limit: f64,
    ) -> Result<Self, ConfigError> {
        Self::new(selector, ThresholdMetric::ErrorRate, comparator, limit)
    }

    /// Unit appended to observed values and limits when displayed.
    pub fn unit(&self) -> &'static str {
        match self.metric {
            ThresholdMetric::Latency { .. } => "ms",
            ThresholdMetric::ErrorRate => "",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidThreshold {
            input: self.to_string(),
            reason: reason.to_string(),
        };

        match self.metric {
            ThresholdMetric::Latency { percentile } => {
                if !(percentile > 0. && percentile <= 100.) {
                    return Err(invalid("percentile must be in (0, 100]"));
                }
                if !self.limit.is_finite() || self.limit < 0. {
                    return Err(invalid("limit must be a non-negative number of milliseconds"));
                }
            }
            ThresholdMetric::ErrorRate => {
                if !(0.0..=1.0).contains(&self.limit) {
                    return Err(invalid("error rate limit must be in [0, 1]"));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ThresholdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.selector, self.metric) {
            (MetricSelector::All, ThresholdMetric::Latency { .. }) => {
                f.write_str("http_req_duration")?
            }
            (MetricSelector::All, ThresholdMetric::ErrorRate) => f.write_str("http_req_failed")?,
            (MetricSelector::Route(route), _) => write!(f, "{route}")?,
        }
        match self.metric {
            ThresholdMetric::Latency { percentile } => write!(f, ": p({percentile})")?,
            ThresholdMetric::ErrorRate => f.write_str(": rate")?,
        }
        write!(f, " {} {}", self.comparator.symbol(), self.limit)
    }
}

impl Serialize for ThresholdSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for ThresholdSpec {
    type Err = ConfigError;

    /// Parses `[selector:] p(<percentile>) <op> <limit>[ms]` or `[selector:] rate <op> <ratio>`.
    /// The selector defaults to every request; `p99` is accepted as shorthand for `p(99)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidThreshold {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (selector, expr) = match s.split_once(':') {
            Some((selector, expr)) => (selector.parse()?, expr),
            None => (MetricSelector::All, s),
        };
        let expr = expr.trim();

        let (metric, rest) = if let Some(rest) = expr.strip_prefix("rate") {
            (ThresholdMetric::ErrorRate, rest)
        } else {
            let expr = expr
                .strip_prefix('p')
                .ok_or_else(|| invalid("expected `rate` or a percentile such as `p(99)`"))?;

            let (percentile, rest) = match expr.strip_prefix('(') {
                Some(inner) => inner
                    .split_once(')')
                    .ok_or_else(|| invalid("unclosed `p(`"))?,
                None => {
                    let end = expr
                        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                        .unwrap_or(expr.len());
                    expr.split_at(end)
                }
            };
            let percentile = percentile
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid("percentile is not a number"))?;
            (ThresholdMetric::Latency { percentile }, rest)
        };

        let rest = rest.trim_start();
        let (comparator, limit) = [
            ("<=", Comparator::Le),
            (">=", Comparator::Ge),
            ("<", Comparator::Lt),
            (">", Comparator::Gt),
        ]
        .into_iter()
        .find_map(|(symbol, comparator)| rest.strip_prefix(symbol).map(|l| (comparator, l)))
        .ok_or_else(|| invalid("expected one of <, <=, >, >="))?;

        let limit = limit.trim();
        let limit = match metric {
            ThresholdMetric::Latency { .. } => limit.strip_suffix("ms").unwrap_or(limit),
            ThresholdMetric::ErrorRate => limit,
        };
        let limit = limit
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid("limit is not a number"))?;

        Self::new(selector, metric, comparator, limit)
    }
}

/// Global p99 under 500ms and fewer than 1% failed requests, applied when no thresholds are
/// configured.
pub fn default_thresholds() -> Vec<ThresholdSpec> {
    vec![
        ThresholdSpec {
            selector: MetricSelector::All,
            metric: ThresholdMetric::Latency { percentile: 99. },
            comparator: Comparator::Lt,
            limit: 500.,
        },
        ThresholdSpec {
            selector: MetricSelector::All,
            metric: ThresholdMetric::ErrorRate,
            comparator: Comparator::Lt,
            limit: 0.01,
        },
    ]
}

/// Parses a `;` separated list of thresholds.
pub fn parse_thresholds(s: &str) -> Result<Vec<ThresholdSpec>, ConfigError> {
    s.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<ThresholdSpec>())
        .collect()
}
