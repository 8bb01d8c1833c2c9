use crate::ConfigError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// One logical operation type exercised against the target.
///
/// The set is closed; the declaration order is the catalog order used to break ties during
/// weighted selection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Search,
    Product,
    Checkout,
}

impl Route {
    pub const ALL: [Route; 3] = [Route::Search, Route::Product, Route::Checkout];

    pub const fn name(self) -> &'static str {
        match self {
            Route::Search => "search",
            Route::Product => "product",
            Route::Checkout => "checkout",
        }
    }

    /// Position of the route in [`Route::ALL`], used to index per-route tables.
    pub const fn index(self) -> usize {
        match self {
            Route::Search => 0,
            Route::Product => 1,
            Route::Checkout => 2,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Route {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" => Ok(Route::Search),
            "product" | "product-lookup" => Ok(Route::Product),
            "checkout" => Ok(Route::Checkout),
            other => Err(ConfigError::UnknownRoute(other.to_string())),
        }
    }
}
