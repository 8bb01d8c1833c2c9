use mock_service::Chaos;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("shadowload=debug,mock_service=info")
            .with_test_writer()
            .try_init();
    });
}

/// Starts the demo shop on an ephemeral port and returns its base URL.
#[allow(unused)]
pub async fn spawn_target(chaos: Chaos) -> String {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Err(err) = mock_service::serve(listener, chaos).await {
            error!("Mock service stopped: {err}");
        }
    });
    format!("http://{addr}")
}
