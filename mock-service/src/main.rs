use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use mock_service::Chaos;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Demo shop API used as a load target.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    #[arg(long, env = "MOCK_ADDR", default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Base delay added to every request.
    #[arg(long, env = "CHAOS_LATENCY_MS", default_value_t = 0)]
    latency_ms: u64,

    /// Extra delay drawn uniformly from `0..=jitter_ms`.
    #[arg(long, env = "CHAOS_JITTER_MS", default_value_t = 0)]
    jitter_ms: u64,

    /// Share of requests answered with a 500, e.g. `0.02`.
    #[arg(long, env = "CHAOS_ERROR_RATE", default_value_t = 0.)]
    error_rate: f64,

    #[arg(long, env = "PROMETHEUS_ADDR")]
    prometheus: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mock_service=debug,tower_http=info")),
        )
        .init();

    anyhow::ensure!(
        (0.0..=1.0).contains(&args.error_rate),
        "error rate must be within [0, 1], got {}",
        args.error_rate
    );

    if let Some(addr) = args.prometheus {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
    }

    let chaos = Chaos {
        latency: Duration::from_millis(args.latency_ms),
        jitter: Duration::from_millis(args.jitter_ms),
        error_rate: args.error_rate,
    };
    info!("Listening on {} with {chaos:?}", args.addr);
    mock_service::run(args.addr, chaos).await?;
    Ok(())
}
