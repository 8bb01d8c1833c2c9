use crate::{ConfigError, Route, WEIGHT_SUM_TOLERANCE};
use std::fmt;
use std::str::FromStr;

/// Cumulative selection table for routes.
///
/// Built from per-route weights that sum to 1.0. Entries keep catalog order and hold the running
/// total, so a single uniform draw in `[0, 1)` selects a route: the first entry whose cumulative
/// weight is `>=` the draw wins.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteWeights {
    cumulative: Vec<(Route, f64)>,
}

impl RouteWeights {
    /// Validates and accumulates the given weights.
    ///
    /// Routes with a weight of zero are dropped since they can never be drawn. Routes are ordered
    /// by catalog order regardless of input order.
    pub fn new(weights: &[(Route, f64)]) -> Result<Self, ConfigError> {
        let mut sorted = weights.to_vec();
        sorted.sort_by_key(|(route, _)| *route);

        if sorted.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(ConfigError::InvalidWeights(
                "a route is listed more than once".to_string(),
            ));
        }

        if let Some((route, weight)) = sorted
            .iter()
            .find(|(_, weight)| !weight.is_finite() || *weight < 0.)
        {
            return Err(ConfigError::InvalidWeights(format!(
                "weight for {route} must be a non-negative number, got {weight}"
            )));
        }

        let sum: f64 = sorted.iter().map(|(_, weight)| weight).sum();
        if (sum - 1.).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::InvalidWeights(format!(
                "weights must sum to 1.0, got {sum}"
            )));
        }

        let mut total = 0.;
        let mut cumulative: Vec<(Route, f64)> = sorted
            .into_iter()
            .filter(|(_, weight)| *weight > 0.)
            .map(|(route, weight)| {
                total += weight;
                (route, total)
            })
            .collect();

        // Absorb floating point drift so every draw below 1.0 maps to a route.
        if let Some(last) = cumulative.last_mut() {
            last.1 = 1.;
        }

        Ok(Self { cumulative })
    }

    /// Maps a uniform draw in `[0, 1)` to a route.
    pub fn select(&self, draw: f64) -> Route {
        debug_assert!((0.0..1.0).contains(&draw), "draw {draw} outside [0, 1)");
        self.cumulative
            .iter()
            .find(|(_, cumulative)| *cumulative >= draw)
            .or(self.cumulative.last())
            .map(|(route, _)| *route)
            .expect("RouteWeights is never empty")
    }

    /// Per-route weight, zero for routes that are never selected.
    pub fn weight(&self, route: Route) -> f64 {
        let mut previous = 0.;
        for (r, cumulative) in &self.cumulative {
            if *r == route {
                return cumulative - previous;
            }
            previous = *cumulative;
        }
        0.
    }

    pub fn routes(&self) -> impl Iterator<Item = Route> + '_ {
        self.cumulative.iter().map(|(route, _)| *route)
    }
}

impl Default for RouteWeights {
    /// 50% search, 30% product lookups, 20% checkouts.
    fn default() -> Self {
        Self {
            cumulative: vec![
                (Route::Search, 0.5),
                (Route::Product, 0.8),
                (Route::Checkout, 1.),
            ],
        }
    }
}

impl FromStr for RouteWeights {
    type Err = ConfigError;

    /// Parses `search=0.5,product=0.3,checkout=0.2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let weights = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|pair| {
                let (route, weight) = pair.split_once('=').ok_or_else(|| {
                    ConfigError::InvalidWeights(format!("expected `route=weight`, got `{pair}`"))
                })?;
                let weight = weight.trim().parse::<f64>().map_err(|_| {
                    ConfigError::InvalidWeights(format!("`{weight}` is not a number"))
                })?;
                Ok((route.parse::<Route>()?, weight))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Self::new(&weights)
    }
}

impl fmt::Display for RouteWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, route) in self.routes().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{route}={:.2}", self.weight(route))?;
        }
        Ok(())
    }
}
