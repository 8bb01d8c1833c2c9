use axum::{
    debug_handler,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Fault injection applied to every request.
#[derive(Clone, Debug, Default)]
pub struct Chaos {
    /// Added to every request.
    pub latency: Duration,
    /// Upper bound of a uniformly drawn extra delay.
    pub jitter: Duration,
    /// Share of requests answered with a 500, in `[0, 1]`.
    pub error_rate: f64,
}

impl Chaos {
    fn delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        self.latency + Duration::from_millis(extra)
    }

    fn inject_error(&self) -> bool {
        self.error_rate > 0. && rand::thread_rng().gen::<f64>() < self.error_rate
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: String,
    pub price_cents: u64,
}

/// The fixed in-memory product catalog.
#[derive(Clone, Debug)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Default for Catalog {
    fn default() -> Self {
        let product = |id: &str, name: &str, category: &str, price_cents| Product {
            id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            price_cents,
        };
        Self {
            products: vec![
                product("p-100", "NVMe SSD 1TB", "storage", 6900),
                product("p-101", "NVMe SSD 2TB", "storage", 11900),
                product("p-102", "DDR5 RAM 16GB", "memory", 5200),
                product("p-103", "DDR5 RAM 32GB", "memory", 9800),
                product("p-104", "USB-C Hub", "accessories", 2900),
                product("p-105", "Mechanical Keyboard", "peripherals", 7900),
                product("p-106", "1080p Webcam", "peripherals", 3400),
                product("p-107", "27\" 144Hz Monitor", "display", 22900),
                product("p-108", "Wireless Mouse", "peripherals", 1900),
                product("p-109", "External SSD 1TB", "storage", 8900),
            ],
        }
    }
}

impl Catalog {
    pub fn find(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Case-insensitive substring match on name, category or id. An empty query matches all.
    pub fn search(&self, query: &str) -> Vec<Product> {
        let query = query.trim().to_lowercase();
        self.products
            .iter()
            .filter(|p| {
                query.is_empty()
                    || p.name.to_lowercase().contains(&query)
                    || p.category.to_lowercase().contains(&query)
                    || p.id.to_lowercase().contains(&query)
            })
            .cloned()
            .collect()
    }

    /// Sum of known product prices, unknown ids are ignored.
    pub fn total(&self, ids: &[String]) -> u64 {
        ids.iter()
            .filter_map(|id| self.find(id))
            .map(|p| p.price_cents)
            .sum()
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: String,
    pub total_cents: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    count: usize,
    items: Vec<Product>,
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

/// First 16 hex characters of the SHA-256 of the lowercased request JSON and the total.
pub fn order_id(request: &CheckoutRequest, total_cents: u64) -> String {
    let canonical = serde_json::to_string_pretty(request).unwrap_or_default();
    let normalized = format!("{}|{total_cents}", canonical.to_lowercase());
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[derive(Clone)]
struct AppState {
    catalog: Arc<Catalog>,
    chaos: Arc<Chaos>,
}

pub fn router(chaos: Chaos) -> Router {
    let state = AppState {
        catalog: Arc::new(Catalog::default()),
        chaos: Arc::new(chaos),
    };

    Router::new()
        .route("/api/search", get(search))
        .route("/api/product/:id", get(product))
        .route("/api/checkout", post(checkout))
        .layer(middleware::from_fn_with_state(state.clone(), chaos_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listener: TcpListener, chaos: Chaos) -> std::io::Result<()> {
    axum::serve(listener, router(chaos)).await
}

pub async fn run(addr: SocketAddr, chaos: Chaos) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, chaos).await
}

async fn chaos_layer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    counter!("mock-service.requests").increment(1);

    let delay = state.chaos.delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if state.chaos.inject_error() {
        debug!("Injecting error for {} {}", request.method(), request.uri().path());
        counter!("mock-service.injected_errors").increment(1);
        return (StatusCode::INTERNAL_SERVER_ERROR, "chaos: injected error").into_response();
    }

    next.run(request).await
}

#[debug_handler]
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let items = state.catalog.search(&params.q);
    Json(SearchResponse {
        query: params.q,
        count: items.len(),
        items,
        timestamp: now_millis(),
    })
}

#[debug_handler]
async fn product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, (StatusCode, &'static str)> {
    state
        .catalog
        .find(&id)
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "no such product"))
}

#[debug_handler]
async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Json<CheckoutResponse> {
    let total_cents = state.catalog.total(&request.product_ids);
    Json(CheckoutResponse {
        order_id: order_id(&request, total_cents),
        total_cents,
        timestamp: now_millis(),
    })
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
