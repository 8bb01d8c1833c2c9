use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use shadowload::core::{
    parse_duration, parse_policy_override, parse_thresholds, ConfigError, RouteWeights, RunConfig,
    CONFIG_ERROR_EXIT_CODE, DEFAULT_BASE_URL, DEFAULT_THRESHOLD, DEFAULT_VIRTUAL_USERS,
};
use shadowload::LoadTest;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "shadowload=info";

/// Replay synthetic shopping traffic against a service and gate on latency and error-rate
/// thresholds.
///
/// Exits with 0 when every threshold passes, 1 when one is missed, 2 on a configuration error
/// and 3 when a threshold had no samples to evaluate.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Root URL of the service under test.
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Number of concurrent virtual users.
    #[arg(long, env = "VUS", default_value_t = DEFAULT_VIRTUAL_USERS)]
    vus: usize,

    /// How long to generate load, e.g. `5m` or `90s`.
    #[arg(long, env = "DURATION", default_value = "5m")]
    duration: String,

    /// Pause between two requests of the same virtual user.
    #[arg(long, env = "THINK_TIME", default_value = "100ms")]
    think_time: String,

    /// Upper bound on a single request.
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "5s")]
    request_timeout: String,

    /// `;` separated thresholds such as `p(99) < 500; checkout: p(95) < 800; rate < 0.01`.
    #[arg(long, env = "THRESHOLDS", default_value = DEFAULT_THRESHOLD)]
    thresholds: String,

    /// Share of each route, e.g. `search=0.5,product=0.3,checkout=0.2`.
    #[arg(long, env = "ROUTE_WEIGHTS", default_value = "search=0.5,product=0.3,checkout=0.2")]
    route_weights: String,

    /// Statuses counted as success for a route, e.g. `checkout=2xx`. Repeatable.
    #[arg(long, env = "SUCCESS_POLICY", value_delimiter = ';')]
    success_policy: Vec<String>,

    /// Seed for reproducible request sequences.
    #[arg(long, env = "SEED")]
    seed: Option<u64>,

    /// Interval between progress log lines, `0s` disables them.
    #[arg(long, env = "REPORT_INTERVAL", default_value = "10s")]
    report_interval: String,

    /// Expose Prometheus metrics on this address while running.
    #[arg(long, env = "PROMETHEUS_ADDR")]
    prometheus: Option<SocketAddr>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn load_test(&self) -> Result<LoadTest, ConfigError> {
        let config = RunConfig::builder()
            .base_url(self.base_url.as_str())
            .virtual_users(self.vus)
            .duration(parse_duration(&self.duration)?)
            .think_time(parse_duration(&self.think_time)?)
            .request_timeout(parse_duration(&self.request_timeout)?)
            .seed(self.seed)
            .build()?;

        let mut test = LoadTest::new(config)
            .weights(self.route_weights.parse::<RouteWeights>()?)
            .thresholds(parse_thresholds(&self.thresholds)?)
            .report_interval(Some(parse_duration(&self.report_interval)?));

        for policy in self.success_policy.iter().filter(|p| !p.trim().is_empty()) {
            let (route, policy) = parse_policy_override(policy)?;
            test = test.success_policy(route, policy);
        }

        Ok(test)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let test = match cli.load_test() {
        Ok(test) => test,
        Err(err) => {
            error!("Configuration error: {err}");
            return CONFIG_ERROR_EXIT_CODE;
        }
    };

    if let Some(addr) = cli.prometheus {
        if let Err(err) = PrometheusBuilder::new().with_http_listener(addr).install() {
            error!("Failed to start Prometheus exporter on {addr}: {err}");
            return CONFIG_ERROR_EXIT_CODE;
        }
        info!("Serving Prometheus metrics on {addr}");
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping virtual users");
                cancel.cancel();
            }
        }
    });

    let report = match test.run_until(cancel).await {
        Ok(report) => report,
        Err(err) => {
            error!("Run failed: {err}");
            return err.exit_code();
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => error!("Failed to serialize report: {err}"),
        }
    } else {
        println!("{report}");
    }

    report.verdict.exit_code()
}
