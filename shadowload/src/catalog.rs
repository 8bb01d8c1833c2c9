//! Randomized request parameters for each route.
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use shadowload_core::Route;

const SEARCH_QUERIES: &[&str] = &["ssd", "ram", "monitor", "keyboard", "mouse", "hub", ""];

// `p-999` is well formed but absent from the target's catalog.
const PRODUCT_IDS: &[&str] = &[
    "p-100", "p-101", "p-102", "p-103", "p-104", "p-105", "p-106", "p-107", "p-108", "p-109",
    "p-999",
];

const EMAILS: &[&str] = &["demo@example.com", "test@example.com", "user@example.com"];

const MAX_CART_SIZE: usize = 3;

/// JSON body of `POST /api/checkout`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub product_ids: Vec<String>,
    pub email: String,
}

/// Parameters for one request, one variant per [`Route`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteParams {
    /// May be empty.
    Search { query: String },
    Product { id: String },
    Checkout(CheckoutRequest),
}

impl RouteParams {
    pub fn route(&self) -> Route {
        match self {
            RouteParams::Search { .. } => Route::Search,
            RouteParams::Product { .. } => Route::Product,
            RouteParams::Checkout(_) => Route::Checkout,
        }
    }
}

/// Fixed pools of values that parameters are drawn from.
///
/// Every pool contains at least one boundary value: the empty search string and a product id the
/// target does not know.
#[derive(Clone, Debug)]
pub struct RouteCatalog {
    queries: Vec<String>,
    product_ids: Vec<String>,
    emails: Vec<String>,
}

impl Default for RouteCatalog {
    fn default() -> Self {
        let owned = |values: &[&str]| -> Vec<String> { values.iter().map(|v| v.to_string()).collect() };
        Self {
            queries: owned(SEARCH_QUERIES),
            product_ids: owned(PRODUCT_IDS),
            emails: owned(EMAILS),
        }
    }
}

impl RouteCatalog {
    /// Returns `None` if a pool is empty.
    pub fn new(queries: Vec<String>, product_ids: Vec<String>, emails: Vec<String>) -> Option<Self> {
        if queries.is_empty() || product_ids.is_empty() || emails.is_empty() {
            return None;
        }
        Some(Self {
            queries,
            product_ids,
            emails,
        })
    }

    pub fn generate_params<R: Rng>(&self, route: Route, rng: &mut R) -> RouteParams {
        match route {
            Route::Search => RouteParams::Search {
                query: pick(&self.queries, rng),
            },
            Route::Product => RouteParams::Product {
                id: pick(&self.product_ids, rng),
            },
            Route::Checkout => {
                let items = rng.gen_range(1..=MAX_CART_SIZE);
                RouteParams::Checkout(CheckoutRequest {
                    product_ids: (0..items).map(|_| pick(&self.product_ids, &mut *rng)).collect(),
                    email: pick(&self.emails, rng),
                })
            }
        }
    }
}

fn pick<R: Rng>(pool: &[String], rng: &mut R) -> String {
    pool.choose(rng)
        .cloned()
        .expect("RouteCatalog pools are never empty")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn params_match_route() {
        let catalog = RouteCatalog::default();
        let mut rng = SmallRng::seed_from_u64(7);
        for route in Route::ALL {
            for _ in 0..100 {
                assert_eq!(catalog.generate_params(route, &mut rng).route(), route);
            }
        }
    }

    #[test]
    fn edge_cases_are_generated() {
        let catalog = RouteCatalog::default();
        let mut rng = SmallRng::seed_from_u64(42);

        let mut queries = HashSet::new();
        let mut ids = HashSet::new();
        for _ in 0..2_000 {
            if let RouteParams::Search { query } = catalog.generate_params(Route::Search, &mut rng) {
                queries.insert(query);
            }
            if let RouteParams::Product { id } = catalog.generate_params(Route::Product, &mut rng) {
                ids.insert(id);
            }
        }
        assert!(queries.contains(""));
        assert!(ids.contains("p-999"));
        assert_eq!(ids.len(), PRODUCT_IDS.len());
    }

    #[test]
    fn checkout_carts_hold_one_to_three_items() {
        let catalog = RouteCatalog::default();
        let mut rng = SmallRng::seed_from_u64(3);
        let mut sizes = HashSet::new();
        for _ in 0..1_000 {
            let RouteParams::Checkout(body) = catalog.generate_params(Route::Checkout, &mut rng)
            else {
                panic!("expected checkout params");
            };
            assert!((1..=3).contains(&body.product_ids.len()));
            assert!(EMAILS.contains(&body.email.as_str()));
            sizes.insert(body.product_ids.len());
        }
        assert_eq!(sizes.len(), 3);
    }

    #[test]
    fn checkout_body_uses_camel_case() {
        let body = CheckoutRequest {
            product_ids: vec!["p-100".to_string()],
            email: "demo@example.com".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "productIds": ["p-100"], "email": "demo@example.com" })
        );
    }

    #[test]
    fn empty_pools_are_rejected() {
        assert!(RouteCatalog::new(vec![], vec!["p-1".into()], vec!["a@b.c".into()]).is_none());
    }
}
