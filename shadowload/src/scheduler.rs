//! Fixed-concurrency virtual users.
//!
//! Every virtual user is its own tokio task running `select route -> dispatch -> think` until
//! the shared deadline passes or the run is cancelled. No new iteration starts after either; a
//! request already in flight completes or hits the request timeout.
use crate::catalog::RouteCatalog;
use crate::error::RunError;
use crate::executor::{HttpTarget, RouteTable};
use crate::recorder::MetricRecorder;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use shadowload_core::{Route, RouteWeights, RunConfig};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// Lifecycle of a single virtual user.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum VirtualUserState {
    Idle = 0,
    Running = 1,
    Stopped = 2,
}

impl VirtualUserState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => VirtualUserState::Idle,
            1 => VirtualUserState::Running,
            _ => VirtualUserState::Stopped,
        }
    }
}

/// Draws the next route from a single uniform sample.
pub fn next_route<R: Rng>(weights: &RouteWeights, rng: &mut R) -> Route {
    weights.select(rng.gen())
}

struct Shared {
    target: HttpTarget,
    routes: RouteTable,
    catalog: RouteCatalog,
    weights: RouteWeights,
    recorder: Arc<MetricRecorder>,
    think_time: Duration,
    states: Vec<AtomicU8>,
}

impl Shared {
    fn set_state(&self, user: usize, state: VirtualUserState) {
        self.states[user].store(state as u8, Ordering::Release);
    }

    /// Marks `user` running until the returned guard drops, unwinding included.
    fn enter(self: &Arc<Self>, user: usize) -> RunningGuard {
        self.set_state(user, VirtualUserState::Running);
        RunningGuard {
            shared: Arc::clone(self),
            user,
        }
    }
}

struct RunningGuard {
    shared: Arc<Shared>,
    user: usize,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.shared.set_state(self.user, VirtualUserState::Stopped);
    }
}

pub struct VirtualUserScheduler {
    shared: Arc<Shared>,
    virtual_users: usize,
    duration: Duration,
    seed: Option<u64>,
}

impl VirtualUserScheduler {
    pub fn new(
        config: &RunConfig,
        weights: RouteWeights,
        catalog: RouteCatalog,
        routes: RouteTable,
        recorder: Arc<MetricRecorder>,
    ) -> Result<Self, RunError> {
        let target = HttpTarget::new(config)?;
        let states = (0..config.virtual_users)
            .map(|_| AtomicU8::new(VirtualUserState::Idle as u8))
            .collect();

        Ok(Self {
            shared: Arc::new(Shared {
                target,
                routes,
                catalog,
                weights,
                recorder,
                think_time: config.think_time,
                states,
            }),
            virtual_users: config.virtual_users,
            duration: config.duration,
            seed: config.seed,
        })
    }

    pub fn recorder(&self) -> &Arc<MetricRecorder> {
        &self.shared.recorder
    }

    /// Current state of every virtual user, indexed by user id.
    pub fn states(&self) -> Vec<VirtualUserState> {
        self.shared
            .states
            .iter()
            .map(|s| VirtualUserState::from_u8(s.load(Ordering::Acquire)))
            .collect()
    }

    pub fn running(&self) -> usize {
        self.states()
            .into_iter()
            .filter(|s| *s == VirtualUserState::Running)
            .count()
    }

    /// Runs every virtual user until the configured duration elapses or `cancel` fires, then
    /// waits for all of them to stop. Returns the elapsed wall-clock time.
    ///
    /// Dropping the returned future stops the virtual users as well.
    #[instrument(name = "scheduler", skip_all, fields(vus = self.virtual_users))]
    pub async fn run(&self, cancel: CancellationToken) -> Result<Duration, RunError> {
        let start = Instant::now();
        let deadline = start + self.duration;
        let stop = cancel.child_token();
        let _guard = stop.clone().drop_guard();

        info!(
            "Starting {} virtual users for {}",
            self.virtual_users,
            humantime::format_duration(self.duration)
        );

        let tasks: Vec<JoinHandle<u64>> = (0..self.virtual_users)
            .map(|id| {
                let rng = match self.seed {
                    Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(id as u64)),
                    None => SmallRng::from_entropy(),
                };
                let user = VirtualUser {
                    id,
                    rng,
                    shared: Arc::clone(&self.shared),
                };
                tokio::spawn(user.run(deadline, stop.clone()).in_current_span())
            })
            .collect();

        let mut iterations = 0;
        let mut failure = None;
        for task in tasks {
            match task.await {
                Ok(count) => iterations += count,
                Err(err) => {
                    error!("Virtual user failed: {err}");
                    // Keep joining so no user outlives the run.
                    stop.cancel();
                    failure.get_or_insert(err);
                }
            }
        }

        let elapsed = start.elapsed();
        info!(
            iterations,
            cancelled = cancel.is_cancelled(),
            "All virtual users stopped after {:.2}s",
            elapsed.as_secs_f64()
        );

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(elapsed),
        }
    }
}

struct VirtualUser {
    id: usize,
    rng: SmallRng,
    shared: Arc<Shared>,
}

impl VirtualUser {
    #[instrument(name = "virtual_user", skip_all, fields(id = self.id))]
    async fn run(mut self, deadline: Instant, stop: CancellationToken) -> u64 {
        let shared = Arc::clone(&self.shared);
        let _running = shared.enter(self.id);

        let mut iterations = 0u64;
        while !stop.is_cancelled() && Instant::now() < deadline {
            let route = next_route(&shared.weights, &mut self.rng);
            let params = shared.catalog.generate_params(route, &mut self.rng);
            shared
                .target
                .execute(shared.routes.executor(route), &params, &shared.recorder)
                .await;
            iterations += 1;

            tokio::select! {
                _ = sleep(shared.think_time) => {}
                _ = stop.cancelled() => break,
                _ = sleep_until(deadline) => break,
            }
        }

        debug!(iterations, "Virtual user stopped");
        iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn scheduler(config: &RunConfig) -> VirtualUserScheduler {
        VirtualUserScheduler::new(
            config,
            RouteWeights::default(),
            RouteCatalog::default(),
            RouteTable::default(),
            Arc::new(MetricRecorder::new()),
        )
        .unwrap()
    }

    async fn closed_port() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    }

    #[test]
    fn selection_converges_to_weights() {
        const DRAWS: usize = 100_000;

        let weights = RouteWeights::default();
        let mut rng = SmallRng::seed_from_u64(1234);
        let mut counts: HashMap<Route, usize> = HashMap::new();
        for _ in 0..DRAWS {
            *counts.entry(next_route(&weights, &mut rng)).or_default() += 1;
        }

        for (route, expected) in [
            (Route::Search, 0.5),
            (Route::Product, 0.3),
            (Route::Checkout, 0.2),
        ] {
            let observed = counts[&route] as f64 / DRAWS as f64;
            assert!(
                (observed - expected).abs() < 0.02,
                "{route}: observed {observed}, expected {expected}"
            );
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn stops_promptly_on_cancel() {
        let config = RunConfig::builder()
            .base_url(closed_port().await)
            .virtual_users(4)
            .duration(Duration::from_secs(60))
            .think_time(Duration::from_millis(50))
            .build()
            .unwrap();
        let scheduler = scheduler(&config);
        assert!(scheduler
            .states()
            .iter()
            .all(|s| *s == VirtualUserState::Idle));

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        let recorder = Arc::clone(scheduler.recorder());
        let at_stop = tokio::spawn(async move {
            sleep(Duration::from_millis(300)).await;
            let before = recorder.total_requests();
            stopper.cancel();
            before
        });

        let elapsed = scheduler.run(cancel).await.unwrap();
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");

        // Only requests already in flight when the stop fired may land afterwards.
        let at_stop = at_stop.await.unwrap();
        let after = scheduler.recorder().total_requests();
        assert!(
            after <= at_stop + config.virtual_users as u64,
            "{at_stop} requests at stop, {after} after"
        );
        assert!(scheduler
            .states()
            .iter()
            .all(|s| *s == VirtualUserState::Stopped));
        assert_eq!(scheduler.running(), 0);

        // Every iteration failed to connect and was still recorded.
        let total = scheduler.recorder().total_requests();
        assert!(total >= 4);
        let errors: u64 = scheduler
            .recorder()
            .snapshots()
            .iter()
            .map(|s| s.network_errors)
            .sum();
        assert_eq!(errors, total);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn stops_at_deadline() {
        let config = RunConfig::builder()
            .base_url(closed_port().await)
            .virtual_users(2)
            .duration(Duration::from_millis(400))
            .think_time(Duration::from_secs(30))
            .build()
            .unwrap();
        let scheduler = scheduler(&config);

        let elapsed = scheduler.run(CancellationToken::new()).await.unwrap();
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
        // One iteration each, the think time is cut short by the deadline.
        assert_eq!(scheduler.recorder().total_requests(), 2);
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn panicking_user_is_marked_stopped() {
        let config = RunConfig::builder()
            .base_url(closed_port().await)
            .virtual_users(2)
            .build()
            .unwrap();
        let scheduler = scheduler(&config);

        let shared = Arc::clone(&scheduler.shared);
        let task = tokio::spawn(async move {
            let _running = shared.enter(1);
            panic!("virtual user blew up");
        });
        assert!(task.await.unwrap_err().is_panic());

        assert_eq!(
            scheduler.states(),
            vec![VirtualUserState::Idle, VirtualUserState::Stopped]
        );
        assert_eq!(scheduler.running(), 0);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn already_cancelled_run_sends_nothing() {
        let config = RunConfig::builder()
            .base_url(closed_port().await)
            .virtual_users(3)
            .build()
            .unwrap();
        let scheduler = scheduler(&config);
        let cancel = CancellationToken::new();
        cancel.cancel();

        scheduler.run(cancel).await.unwrap();
        assert_eq!(scheduler.recorder().total_requests(), 0);
    }
}
