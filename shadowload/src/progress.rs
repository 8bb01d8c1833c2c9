use crate::evaluator::evaluate_quietly;
use crate::recorder::MetricRecorder;
use shadowload_core::{Route, ThresholdSpec};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Logs request totals, throughput and live p99 latencies on a fixed interval.
pub(crate) struct ProgressReporter {
    interval: Interval,
    last_tick: Instant,
    interval_dur: Duration,
    recorder: Arc<MetricRecorder>,
    thresholds: Vec<ThresholdSpec>,
    last_total: u64,
}

impl ProgressReporter {
    pub async fn new(
        interval_dur: Duration,
        recorder: Arc<MetricRecorder>,
        thresholds: Vec<ThresholdSpec>,
    ) -> Self {
        let mut interval = interval(interval_dur);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // NOTE: First tick completes instantly
        let last_tick = interval.tick().await;
        Self {
            interval,
            last_tick,
            interval_dur,
            recorder,
            thresholds,
            last_total: 0,
        }
    }

    async fn tick(&mut self) -> Duration {
        let next = self.interval.tick().await;
        let elapsed = self.last_tick.elapsed();
        self.last_tick = next;
        elapsed
    }

    pub async fn run(mut self, stop: CancellationToken) {
        debug!(
            "Reporting progress every {}",
            humantime::format_duration(self.interval_dur)
        );
        loop {
            tokio::select! {
                elapsed = self.tick() => self.report(elapsed),
                _ = stop.cancelled() => break,
            }
        }
    }

    pub fn report(&mut self, elapsed: Duration) {
        let snapshots = self.recorder.snapshots();
        let total: u64 = snapshots.iter().map(|s| s.count).sum();
        let errors: u64 = snapshots.iter().map(|s| s.error_count).sum();
        let secs = elapsed.as_secs_f64();
        let rps = if secs > 0. {
            (total - self.last_total) as f64 / secs
        } else {
            0.
        };
        self.last_total = total;

        let mut p99 = String::new();
        for (route, snapshot) in Route::ALL.iter().zip(&snapshots) {
            match snapshot.percentile(99.) {
                Some(latency) => {
                    let _ = write!(p99, " {route}={latency:.1}ms");
                }
                None => {
                    let _ = write!(p99, " {route}=-");
                }
            }
        }

        let results = evaluate_quietly(&snapshots, &self.thresholds);
        let passing = results.iter().filter(|r| r.passed()).count();

        info!(
            "{total} requests ({errors} errors, {rps:.1} req/s), p99{p99}, thresholds passing {passing}/{}",
            results.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowload_core::parse_thresholds;
    use tracing::Instrument;

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn reports_totals_and_live_thresholds() {
        let recorder = Arc::new(MetricRecorder::new());
        for latency in [10., 20., 30.] {
            recorder.record(Route::Search, latency, true);
        }
        recorder.record(Route::Product, 700., false);

        let thresholds = parse_thresholds("p(99) < 500; search: p(99) < 500").unwrap();
        let mut reporter =
            ProgressReporter::new(Duration::from_secs(1), Arc::clone(&recorder), thresholds).await;
        reporter.report(Duration::from_secs(2));

        assert!(logs_contain("4 requests (1 errors, 2.0 req/s)"));
        assert!(logs_contain("search=30.0ms product=700.0ms checkout=-"));
        assert!(logs_contain("thresholds passing 1/2"));
        assert!(!logs_contain("Cannot evaluate"));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(2_000)]
    async fn ticks_until_stopped() {
        let recorder = Arc::new(MetricRecorder::new());
        let reporter = ProgressReporter::new(Duration::from_millis(20), recorder, vec![]).await;

        let stop = CancellationToken::new();
        let handle = tokio::spawn(reporter.run(stop.clone()).in_current_span());
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.cancel();
        handle.await.unwrap();

        assert!(logs_contain("0 requests"));
    }
}
