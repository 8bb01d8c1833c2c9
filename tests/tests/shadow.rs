mod utils;
#[allow(unused)]
use utils::*;

use mock_service::Chaos;
use shadowload::prelude::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn config(base_url: &str, duration: Duration) -> RunConfig {
    RunConfig::builder()
        .base_url(base_url)
        .virtual_users(5)
        .duration(duration)
        .think_time(Duration::from_millis(10))
        .request_timeout(Duration::from_secs(2))
        .seed(Some(42))
        .build()
        .unwrap()
}

fn route<'a>(report: &'a RunReport, name: &str) -> &'a shadowload::core::RouteSummary {
    report.routes.iter().find(|r| r.name == name).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(20_000)]
async fn healthy_target_passes() {
    let base_url = spawn_target(Chaos::default()).await;

    let report = LoadTest::new(config(&base_url, Duration::from_secs(2)))
        .thresholds(parse_thresholds("p(99) < 500; product: p(95) < 500").unwrap())
        .run()
        .await
        .unwrap();

    assert_eq!(report.verdict, Verdict::Passed);
    assert_eq!(report.verdict.exit_code(), 0);
    assert!(report.total.requests > 100);
    assert_eq!(report.total.errors, 0);
    for name in ["search", "product", "checkout"] {
        assert!(route(&report, name).requests > 0, "no {name} requests");
    }

    // Unknown products answer 404 and still count as success.
    let product = route(&report, "product");
    assert!(product.statuses.get(&404).copied().unwrap_or(0) > 0);
    assert_eq!(product.errors, 0);
    assert_eq!(
        product.statuses.values().sum::<u64>(),
        product.requests,
        "every request has exactly one recorded status"
    );
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(20_000)]
async fn server_errors_are_classified_per_route() {
    let base_url = spawn_target(Chaos {
        error_rate: 1.,
        ..Default::default()
    })
    .await;

    let report = LoadTest::new(config(&base_url, Duration::from_secs(1)))
        .run()
        .await
        .unwrap();

    let search = route(&report, "search");
    assert!(search.requests > 0);
    assert_eq!(search.errors, search.requests);

    let product = route(&report, "product");
    assert_eq!(product.errors, product.requests);

    // A checkout answered with a 5xx completed.
    let checkout = route(&report, "checkout");
    assert!(checkout.requests > 0);
    assert_eq!(checkout.errors, 0);
    assert_eq!(checkout.statuses.get(&500), Some(&checkout.requests));

    // The default error budget catches the failing search and product requests.
    assert!(report.thresholds[0].passed());
    assert!(!report.thresholds[1].passed());
    assert!(report.thresholds[1].observed().unwrap() > 0.5);
    assert_eq!(report.verdict, Verdict::Failed);
    assert_eq!(report.verdict.exit_code(), 1);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(20_000)]
async fn checkout_policy_can_be_tightened() {
    let base_url = spawn_target(Chaos {
        error_rate: 1.,
        ..Default::default()
    })
    .await;

    let report = LoadTest::new(config(&base_url, Duration::from_secs(1)))
        .success_policy(Route::Checkout, "2xx".parse().unwrap())
        .run()
        .await
        .unwrap();

    let checkout = route(&report, "checkout");
    assert!(checkout.requests > 0);
    assert_eq!(checkout.errors, checkout.requests);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(20_000)]
async fn dead_target_fails_the_default_gate() {
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let report = LoadTest::new(config(&format!("http://{addr}"), Duration::from_millis(500)))
        .run()
        .await
        .unwrap();

    assert!(report.total.requests > 0);
    assert_eq!(report.total.network_errors, report.total.requests);
    // Refused connections are fast, so only the error budget catches them.
    assert!(report.thresholds[0].passed());
    assert_eq!(report.thresholds[1].observed(), Some(1.));
    assert_eq!(report.verdict, Verdict::Failed);
    assert_eq!(report.verdict.exit_code(), 1);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(20_000)]
async fn slow_target_fails_thresholds() {
    let base_url = spawn_target(Chaos {
        latency: Duration::from_millis(40),
        jitter: Duration::from_millis(10),
        error_rate: 0.,
    })
    .await;

    let report = LoadTest::new(config(&base_url, Duration::from_secs(1)))
        .thresholds(parse_thresholds("p(99) < 500; p(50) < 20").unwrap())
        .run()
        .await
        .unwrap();

    assert!(report.thresholds[0].passed());
    assert!(!report.thresholds[1].passed());
    assert!(report.thresholds[1].observed().unwrap() >= 40.);
    assert_eq!(report.verdict, Verdict::Failed);
    assert_eq!(report.verdict.exit_code(), 1);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(20_000)]
async fn unselected_route_cannot_be_evaluated() {
    let base_url = spawn_target(Chaos::default()).await;

    let report = LoadTest::new(config(&base_url, Duration::from_millis(500)))
        .weights("search=1.0".parse().unwrap())
        .thresholds(parse_thresholds("search: p(99) < 500; checkout: p(99) < 500").unwrap())
        .run()
        .await
        .unwrap();

    assert_eq!(route(&report, "checkout").requests, 0);
    assert!(report.thresholds[0].passed());
    assert_eq!(report.thresholds[1].observed(), None);
    assert_eq!(report.verdict, Verdict::EvaluationError);
    assert_eq!(report.verdict.exit_code(), 3);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(10_000)]
async fn cancellation_stops_the_run() {
    let base_url = spawn_target(Chaos::default()).await;
    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        stopper.cancel();
    });

    let report = LoadTest::new(config(&base_url, Duration::from_secs(300)))
        .run_until(cancel)
        .await
        .unwrap();

    assert!(report.elapsed < Duration::from_secs(3));
    assert!(report.total.requests > 0);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(20_000)]
async fn report_serializes_to_json() {
    let base_url = spawn_target(Chaos::default()).await;

    let report = LoadTest::new(config(&base_url, Duration::from_millis(500)))
        .run()
        .await
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["verdict"], "passed");
    assert_eq!(json["config"]["virtual_users"], 5);
    assert_eq!(json["config"]["duration"], "500ms");
    assert_eq!(json["routes"][0]["name"], "search");
    assert_eq!(json["thresholds"][0]["spec"], "http_req_duration: p(99) < 500");
    assert_eq!(json["thresholds"][0]["outcome"]["status"], "passed");
    assert_eq!(json["thresholds"][1]["spec"], "http_req_failed: rate < 0.01");
    assert_eq!(json["thresholds"][1]["outcome"]["observed"], 0.0);

    let text = report.to_string();
    assert!(text.contains("result: PASSED"));
}
