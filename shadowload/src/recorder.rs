//! Thread-safe accumulation of per-route latency samples and counters.
//!
//! Latencies are pushed into a lock-free [`AtomicBucket`] and every sample is retained for the
//! lifetime of the run. Percentiles are therefore exact and use the *nearest-rank* definition:
//! for `n` sorted samples the `p`th percentile is the sample at rank `ceil(p / 100 * n)`. For the
//! samples `1..=100` this gives `p(99) = 99` and `p(100) = 100`.
use metrics_util::AtomicBucket;
use shadowload_core::{LatencySummary, Route, RouteSummary};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Result of a single request. Consumed immediately by [`MetricRecorder::record_outcome`].
#[derive(Clone, Debug, PartialEq)]
pub struct RequestOutcome {
    pub route: Route,
    pub latency_ms: f64,
    /// `None` when no response was received (timeout, refused connection, DNS failure).
    pub status: Option<u16>,
    pub success: bool,
}

struct RouteMetrics {
    count: AtomicU64,
    errors: AtomicU64,
    network_errors: AtomicU64,
    latencies: AtomicBucket<f64>,
    // Held only for a single map update.
    statuses: Mutex<BTreeMap<u16, u64>>,
}

impl Default for RouteMetrics {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            network_errors: AtomicU64::new(0),
            latencies: AtomicBucket::new(),
            statuses: Mutex::new(BTreeMap::new()),
        }
    }
}

/// Accumulates request outcomes from every virtual user.
///
/// Owned by the scheduler and shared with each worker; it is never reset during a run.
#[derive(Default)]
pub struct MetricRecorder {
    routes: [RouteMetrics; 3],
}

impl std::fmt::Debug for MetricRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("MetricRecorder");
        for route in Route::ALL {
            dbg.field(route.name(), &self.metrics(route).count.load(Ordering::Relaxed));
        }
        dbg.finish()
    }
}

impl MetricRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn metrics(&self, route: Route) -> &RouteMetrics {
        &self.routes[route.index()]
    }

    /// Records one latency sample and bumps the route's counters.
    ///
    /// # Panics
    ///
    /// Panics if `latency_ms` is negative or not finite.
    pub fn record(&self, route: Route, latency_ms: f64, success: bool) {
        assert!(
            latency_ms.is_finite() && latency_ms >= 0.,
            "invalid latency {latency_ms}ms recorded for {route}"
        );

        let slot = self.metrics(route);
        // The sample lands before the counters so a snapshot never sees more requests than
        // latencies.
        slot.latencies.push(latency_ms);
        slot.count.fetch_add(1, Ordering::Relaxed);
        if !success {
            slot.errors.fetch_add(1, Ordering::Relaxed);
        }

        #[cfg(feature = "metrics")]
        {
            metrics::histogram!("shadowload_request_duration_ms", "route" => route.name())
                .record(latency_ms);
            if success {
                metrics::counter!("shadowload_requests_success", "route" => route.name())
                    .increment(1);
            } else {
                metrics::counter!("shadowload_requests_error", "route" => route.name())
                    .increment(1);
            }
        }
    }

    /// Records an outcome including its raw status, or a network error if there was none.
    pub fn record_outcome(&self, outcome: &RequestOutcome) {
        let slot = self.metrics(outcome.route);
        match outcome.status {
            Some(status) => {
                let mut statuses = slot
                    .statuses
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                *statuses.entry(status).or_default() += 1;
            }
            None => {
                slot.network_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.record(outcome.route, outcome.latency_ms, outcome.success);
    }

    /// Point-in-time view of one route. Concurrent writers may land between reading the counters
    /// and the samples, but the distribution itself is never torn.
    pub fn snapshot(&self, route: Route) -> MetricSnapshot {
        let slot = self.metrics(route);
        let count = slot.count.load(Ordering::Relaxed);
        let error_count = slot.errors.load(Ordering::Relaxed);
        let network_errors = slot.network_errors.load(Ordering::Relaxed);
        let statuses = slot
            .statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut latencies = slot.latencies.data();
        latencies.sort_unstable_by(f64::total_cmp);

        MetricSnapshot {
            route: Some(route),
            count,
            error_count,
            network_errors,
            statuses,
            latencies,
        }
    }

    pub fn snapshots(&self) -> Vec<MetricSnapshot> {
        Route::ALL.iter().map(|route| self.snapshot(*route)).collect()
    }

    pub fn percentile(&self, route: Route, percentile: f64) -> Option<f64> {
        self.snapshot(route).percentile(percentile)
    }

    pub fn total_requests(&self) -> u64 {
        self.routes
            .iter()
            .map(|m| m.count.load(Ordering::Relaxed))
            .sum()
    }
}

/// Aggregated state of one route, or of several merged routes when `route` is `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricSnapshot {
    pub route: Option<Route>,
    pub count: u64,
    pub error_count: u64,
    pub network_errors: u64,
    pub statuses: BTreeMap<u16, u64>,
    latencies: Vec<f64>,
}

impl MetricSnapshot {
    /// Merges several snapshots into one covering all of their requests.
    pub fn merged<'a>(snapshots: impl IntoIterator<Item = &'a MetricSnapshot>) -> Self {
        let mut merged = MetricSnapshot::default();
        for snapshot in snapshots {
            merged.count += snapshot.count;
            merged.error_count += snapshot.error_count;
            merged.network_errors += snapshot.network_errors;
            for (status, count) in &snapshot.statuses {
                *merged.statuses.entry(*status).or_default() += count;
            }
            merged.latencies.extend_from_slice(&snapshot.latencies);
        }
        merged.latencies.sort_unstable_by(f64::total_cmp);
        merged
    }

    /// Builds a snapshot of successful requests from raw latencies.
    pub fn from_latencies(route: Option<Route>, mut latencies: Vec<f64>) -> Self {
        latencies.sort_unstable_by(f64::total_cmp);
        Self {
            route,
            count: latencies.len() as u64,
            latencies,
            ..Default::default()
        }
    }

    /// Sorted latency samples in milliseconds.
    pub fn latencies(&self) -> &[f64] {
        &self.latencies
    }

    pub fn sample_count(&self) -> usize {
        self.latencies.len()
    }

    /// Nearest-rank percentile, `None` without samples.
    pub fn percentile(&self, percentile: f64) -> Option<f64> {
        nearest_rank(&self.latencies, percentile)
    }

    /// Share of failed requests, `None` when nothing was recorded.
    pub fn error_rate(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.error_count as f64 / self.count as f64)
        }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.latencies.is_empty() {
            None
        } else {
            Some(self.latencies.iter().sum::<f64>() / self.latencies.len() as f64)
        }
    }

    pub fn latency_summary(&self) -> Option<LatencySummary> {
        let (min, max) = (*self.latencies.first()?, *self.latencies.last()?);
        Some(LatencySummary {
            min,
            mean: self.mean()?,
            p50: self.percentile(50.)?,
            p90: self.percentile(90.)?,
            p95: self.percentile(95.)?,
            p99: self.percentile(99.)?,
            max,
        })
    }

    pub fn summary(&self, elapsed: Duration) -> RouteSummary {
        let secs = elapsed.as_secs_f64();
        RouteSummary {
            name: self
                .route
                .map(|r| r.name().to_string())
                .unwrap_or_else(|| "all".to_string()),
            requests: self.count,
            errors: self.error_count,
            network_errors: self.network_errors,
            statuses: self.statuses.clone(),
            requests_per_second: if secs > 0. {
                self.count as f64 / secs
            } else {
                0.
            },
            latency: self.latency_summary(),
        }
    }
}

fn nearest_rank(sorted: &[f64], percentile: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = (percentile * n as f64 / 100.).ceil() as usize;
    Some(sorted[rank.clamp(1, n) - 1])
}
