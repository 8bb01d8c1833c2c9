//! Request execution for each route.
use crate::catalog::RouteParams;
use crate::error::RunError;
use crate::recorder::{MetricRecorder, RequestOutcome};
use reqwest::{Client, RequestBuilder};
use shadowload_core::{Route, RunConfig, SuccessPolicy};
use std::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// One variant of request a virtual user can issue.
///
/// An executor knows how to turn [`RouteParams`] into exactly one HTTP request and which statuses
/// count as success for its route.
pub trait RouteExecutor: Send + Sync {
    fn route(&self) -> Route;

    fn policy(&self) -> &SuccessPolicy;

    /// Builds the request for `params`.
    ///
    /// # Panics
    ///
    /// Panics if `params` were generated for another route.
    fn request(&self, client: &Client, base_url: &str, params: &RouteParams) -> RequestBuilder;

    fn is_success(&self, status: u16) -> bool {
        self.policy().is_success(status)
    }
}

fn mismatched(route: Route, params: &RouteParams) -> ! {
    panic!("{route} executor received {} params", params.route())
}

/// `GET /api/search?q=<query>`
#[derive(Debug, Clone)]
pub struct SearchExecutor {
    policy: SuccessPolicy,
}

impl Default for SearchExecutor {
    fn default() -> Self {
        Self::with_policy(SuccessPolicy::for_route(Route::Search))
    }
}

impl SearchExecutor {
    pub fn with_policy(policy: SuccessPolicy) -> Self {
        Self { policy }
    }
}

impl RouteExecutor for SearchExecutor {
    fn route(&self) -> Route {
        Route::Search
    }

    fn policy(&self) -> &SuccessPolicy {
        &self.policy
    }

    fn request(&self, client: &Client, base_url: &str, params: &RouteParams) -> RequestBuilder {
        let RouteParams::Search { query } = params else {
            mismatched(self.route(), params)
        };
        client
            .get(format!("{base_url}/api/search"))
            .query(&[("q", query)])
    }
}

/// `GET /api/product/<id>`
#[derive(Debug, Clone)]
pub struct ProductExecutor {
    policy: SuccessPolicy,
}

impl Default for ProductExecutor {
    fn default() -> Self {
        Self::with_policy(SuccessPolicy::for_route(Route::Product))
    }
}

impl ProductExecutor {
    pub fn with_policy(policy: SuccessPolicy) -> Self {
        Self { policy }
    }
}

impl RouteExecutor for ProductExecutor {
    fn route(&self) -> Route {
        Route::Product
    }

    fn policy(&self) -> &SuccessPolicy {
        &self.policy
    }

    fn request(&self, client: &Client, base_url: &str, params: &RouteParams) -> RequestBuilder {
        let RouteParams::Product { id } = params else {
            mismatched(self.route(), params)
        };
        client.get(format!("{base_url}/api/product/{id}"))
    }
}

/// `POST /api/checkout` with a JSON cart.
#[derive(Debug, Clone)]
pub struct CheckoutExecutor {
    policy: SuccessPolicy,
}

impl Default for CheckoutExecutor {
    fn default() -> Self {
        Self::with_policy(SuccessPolicy::for_route(Route::Checkout))
    }
}

impl CheckoutExecutor {
    pub fn with_policy(policy: SuccessPolicy) -> Self {
        Self { policy }
    }
}

impl RouteExecutor for CheckoutExecutor {
    fn route(&self) -> Route {
        Route::Checkout
    }

    fn policy(&self) -> &SuccessPolicy {
        &self.policy
    }

    fn request(&self, client: &Client, base_url: &str, params: &RouteParams) -> RequestBuilder {
        let RouteParams::Checkout(body) = params else {
            mismatched(self.route(), params)
        };
        // `json` sets `Content-Type: application/json`.
        client.post(format!("{base_url}/api/checkout")).json(body)
    }
}

/// The executor for every route.
pub struct RouteTable {
    executors: [Box<dyn RouteExecutor>; 3],
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            executors: [
                Box::new(SearchExecutor::default()),
                Box::new(ProductExecutor::default()),
                Box::new(CheckoutExecutor::default()),
            ],
        }
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_map();
        for executor in &self.executors {
            dbg.entry(&executor.route(), &executor.policy().to_string());
        }
        dbg.finish()
    }
}

impl RouteTable {
    /// Replaces the success policy of one route.
    pub fn with_policy(mut self, route: Route, policy: SuccessPolicy) -> Self {
        self.executors[route.index()] = match route {
            Route::Search => Box::new(SearchExecutor::with_policy(policy)),
            Route::Product => Box::new(ProductExecutor::with_policy(policy)),
            Route::Checkout => Box::new(CheckoutExecutor::with_policy(policy)),
        };
        self
    }

    pub fn executor(&self, route: Route) -> &dyn RouteExecutor {
        self.executors[route.index()].as_ref()
    }
}

/// The service under load, reached through a shared connection pool.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: Client,
    base_url: String,
}

impl HttpTarget {
    /// Builds a client whose timeout covers the whole request, including the response body, and
    /// whose pool keeps one idle connection per virtual user.
    pub fn new(config: &RunConfig) -> Result<Self, RunError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.virtual_users)
            .build()
            .map_err(RunError::Client)?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends exactly one request and records its outcome exactly once.
    ///
    /// Failures are never returned as errors: a network failure becomes an outcome without a
    /// status that is always unsuccessful.
    pub async fn execute(
        &self,
        executor: &dyn RouteExecutor,
        params: &RouteParams,
        recorder: &MetricRecorder,
    ) -> RequestOutcome {
        let route = executor.route();
        let request = executor.request(&self.client, &self.base_url, params);

        let start = Instant::now();
        let result = async {
            let response = request.send().await?;
            let status = response.status();
            // Latency covers the full body so slow streaming responses are not hidden.
            response.bytes().await?;
            Ok::<_, reqwest::Error>(status)
        }
        .await;
        let latency_ms = start.elapsed().as_secs_f64() * 1_000.;

        let outcome = match result {
            Ok(status) => {
                let status = status.as_u16();
                trace!(%route, status, latency_ms, "request completed");
                RequestOutcome {
                    route,
                    latency_ms,
                    status: Some(status),
                    success: executor.is_success(status),
                }
            }
            Err(err) => {
                warn!(%route, latency_ms, timeout = err.is_timeout(), "request failed: {err}");
                RequestOutcome {
                    route,
                    latency_ms,
                    status: None,
                    success: false,
                }
            }
        };

        recorder.record_outcome(&outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CheckoutRequest;
    use reqwest::Method;
    use std::time::Duration;

    const BASE: &str = "http://target:8080";

    fn build(executor: &dyn RouteExecutor, params: &RouteParams) -> reqwest::Request {
        executor
            .request(&Client::new(), BASE, params)
            .build()
            .unwrap()
    }

    #[test]
    fn search_request_encodes_query() {
        let request = build(
            &SearchExecutor::default(),
            &RouteParams::Search {
                query: "usb hub".to_string(),
            },
        );
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url().as_str(), "http://target:8080/api/search?q=usb+hub");

        let request = build(
            &SearchExecutor::default(),
            &RouteParams::Search {
                query: String::new(),
            },
        );
        assert_eq!(request.url().as_str(), "http://target:8080/api/search?q=");
    }

    #[test]
    fn product_request_uses_path() {
        let request = build(
            &ProductExecutor::default(),
            &RouteParams::Product {
                id: "p-999".to_string(),
            },
        );
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url().path(), "/api/product/p-999");
    }

    #[test]
    fn checkout_request_posts_json() {
        let request = build(
            &CheckoutExecutor::default(),
            &RouteParams::Checkout(CheckoutRequest {
                product_ids: vec!["p-100".to_string(), "p-101".to_string()],
                email: "demo@example.com".to_string(),
            }),
        );
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().path(), "/api/checkout");
        assert_eq!(
            request.headers()[reqwest::header::CONTENT_TYPE],
            "application/json"
        );
        let body: serde_json::Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "productIds": ["p-100", "p-101"], "email": "demo@example.com" })
        );
    }

    #[test]
    #[should_panic(expected = "product executor received search params")]
    fn mismatched_params_panic() {
        build(
            &ProductExecutor::default(),
            &RouteParams::Search {
                query: String::new(),
            },
        );
    }

    #[test]
    fn classification_per_route() {
        let table = RouteTable::default();
        assert!(table.executor(Route::Product).is_success(404));
        assert!(!table.executor(Route::Product).is_success(500));
        assert!(table.executor(Route::Checkout).is_success(503));
        assert!(!table.executor(Route::Search).is_success(404));
    }

    #[test]
    fn policy_overrides() {
        let table = RouteTable::default()
            .with_policy(Route::Checkout, "2xx".parse().unwrap());
        assert_eq!(table.executor(Route::Checkout).route(), Route::Checkout);
        assert!(!table.executor(Route::Checkout).is_success(503));
        assert!(table.executor(Route::Product).is_success(404));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn network_errors_are_recorded_failures() {
        // Bind then drop a listener so the port is very likely closed.
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let config = RunConfig::builder()
            .base_url(format!("http://{addr}"))
            .request_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let target = HttpTarget::new(&config).unwrap();
        let recorder = MetricRecorder::new();

        let outcome = target
            .execute(
                &CheckoutExecutor::default(),
                &RouteParams::Checkout(CheckoutRequest {
                    product_ids: vec!["p-100".to_string()],
                    email: "demo@example.com".to_string(),
                }),
                &recorder,
            )
            .await;

        assert_eq!(outcome.status, None);
        assert!(!outcome.success);
        let snapshot = recorder.snapshot(Route::Checkout);
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.network_errors, 1);
    }
}
