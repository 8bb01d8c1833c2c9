//! Assembling and running a complete load test.
use crate::catalog::RouteCatalog;
use crate::error::RunError;
use crate::evaluator::evaluate;
use crate::executor::RouteTable;
use crate::progress::ProgressReporter;
use crate::recorder::{MetricRecorder, MetricSnapshot};
use crate::scheduler::VirtualUserScheduler;
use shadowload_core::{
    default_thresholds, Route, RouteWeights, RunConfig, RunReport, SuccessPolicy, ThresholdSpec,
    Verdict,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// A fully configured run.
///
/// # Example
/// ```no_run
/// use shadowload::core::{parse_thresholds, RunConfig};
/// use shadowload::LoadTest;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = RunConfig::builder()
///         .base_url("http://candidate:8080")
///         .virtual_users(20)
///         .duration(Duration::from_secs(60))
///         .build()?;
///
///     let report = LoadTest::new(config)
///         .thresholds(parse_thresholds("p(99) < 500; checkout: p(95) < 800")?)
///         .run()
///         .await?;
///
///     println!("{report}");
///     std::process::exit(report.verdict.exit_code());
/// }
/// ```
#[derive(Debug)]
pub struct LoadTest {
    config: RunConfig,
    weights: RouteWeights,
    catalog: RouteCatalog,
    routes: RouteTable,
    thresholds: Vec<ThresholdSpec>,
    report_interval: Option<Duration>,
}

impl LoadTest {
    /// Default route mix and success policies, the global p99 < 500ms and 1% error budget
    /// thresholds and no progress logging.
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            weights: RouteWeights::default(),
            catalog: RouteCatalog::default(),
            routes: RouteTable::default(),
            thresholds: default_thresholds(),
            report_interval: None,
        }
    }

    pub fn weights(mut self, weights: RouteWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn catalog(mut self, catalog: RouteCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Overrides which statuses count as success for `route`.
    pub fn success_policy(mut self, route: Route, policy: SuccessPolicy) -> Self {
        self.routes = self.routes.with_policy(route, policy);
        self
    }

    /// Replaces the thresholds. An empty list always passes.
    pub fn thresholds(mut self, thresholds: Vec<ThresholdSpec>) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Logs progress on the given interval while running. `None` or zero disables it.
    pub fn report_interval(mut self, interval: Option<Duration>) -> Self {
        self.report_interval = interval.filter(|i| !i.is_zero());
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn threshold_specs(&self) -> &[ThresholdSpec] {
        &self.thresholds
    }

    pub async fn run(self) -> Result<RunReport, RunError> {
        self.run_until(CancellationToken::new()).await
    }

    /// Runs until the configured duration elapses or `cancel` fires. A cancelled run still
    /// produces a report over everything recorded so far.
    #[instrument(name = "load_test", skip_all, fields(target = %self.config.base_url))]
    pub async fn run_until(self, cancel: CancellationToken) -> Result<RunReport, RunError> {
        let LoadTest {
            config,
            weights,
            catalog,
            routes,
            thresholds,
            report_interval,
        } = self;

        info!(%weights, ?routes, "Preparing load test");
        let mix = weights.to_string();
        let recorder = Arc::new(MetricRecorder::new());
        let scheduler =
            VirtualUserScheduler::new(&config, weights, catalog, routes, Arc::clone(&recorder))?;

        let progress_stop = CancellationToken::new();
        let progress = match report_interval {
            Some(interval) => {
                let reporter =
                    ProgressReporter::new(interval, Arc::clone(&recorder), thresholds.clone())
                        .await;
                Some(tokio::spawn(
                    reporter.run(progress_stop.clone()).in_current_span(),
                ))
            }
            None => None,
        };

        let elapsed = scheduler.run(cancel).await;

        progress_stop.cancel();
        if let Some(handle) = progress {
            if let Err(err) = handle.await {
                warn!("Progress reporter failed: {err}");
            }
        }
        let elapsed = elapsed?;

        let report = summarize(config, mix, elapsed, &recorder.snapshots(), &thresholds);
        match report.verdict {
            Verdict::Passed => info!("All thresholds passed"),
            Verdict::Failed => warn!("Thresholds failed"),
            Verdict::EvaluationError => error!("Thresholds could not be evaluated"),
        }
        Ok(report)
    }
}

/// Builds the final report from per-route snapshots taken after every virtual user stopped.
pub fn summarize(
    config: RunConfig,
    weights: String,
    elapsed: Duration,
    snapshots: &[MetricSnapshot],
    thresholds: &[ThresholdSpec],
) -> RunReport {
    let results = evaluate(snapshots, thresholds);
    let verdict = Verdict::from_results(&results);

    RunReport {
        config,
        weights,
        elapsed,
        routes: snapshots.iter().map(|s| s.summary(elapsed)).collect(),
        total: MetricSnapshot::merged(snapshots).summary(elapsed),
        thresholds: results,
        verdict,
    }
}
