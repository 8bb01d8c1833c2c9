use crate::{ConfigError, Route};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A single accepted status, either an exact code (`404`) or a whole class (`5xx`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StatusMatcher {
    Exact(u16),
    /// Status class by leading digit, `2` for `2xx`.
    Class(u8),
}

impl StatusMatcher {
    pub fn matches(self, status: u16) -> bool {
        match self {
            StatusMatcher::Exact(code) => code == status,
            StatusMatcher::Class(class) => status / 100 == u16::from(class),
        }
    }
}

impl fmt::Display for StatusMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMatcher::Exact(code) => write!(f, "{code}"),
            StatusMatcher::Class(class) => write!(f, "{class}xx"),
        }
    }
}

/// Decides which HTTP statuses count as a successful request for one route.
///
/// This signal feeds error counts and thresholds and is intentionally looser than raw HTTP
/// semantics for some routes:
///
/// - search: `2xx`
/// - product: `2xx` and `404`, since looking up a product that does not exist is valid behavior
///   under load
/// - checkout: `2xx` and `5xx`, counting any completed request toward throughput. The raw status
///   is still recorded so server error rates can be judged separately.
///
/// Network failures never reach a policy; they are always failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuccessPolicy {
    accepted: Vec<StatusMatcher>,
}

impl SuccessPolicy {
    pub fn new(accepted: Vec<StatusMatcher>) -> Self {
        Self { accepted }
    }

    pub fn for_route(route: Route) -> Self {
        use StatusMatcher::*;
        match route {
            Route::Search => Self::new(vec![Class(2)]),
            Route::Product => Self::new(vec![Class(2), Exact(404)]),
            Route::Checkout => Self::new(vec![Class(2), Class(5)]),
        }
    }

    pub fn is_success(&self, status: u16) -> bool {
        self.accepted.iter().any(|m| m.matches(status))
    }

    pub fn accepted(&self) -> &[StatusMatcher] {
        &self.accepted
    }
}

impl fmt::Display for SuccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, matcher) in self.accepted.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{matcher}")?;
        }
        Ok(())
    }
}

impl Serialize for SuccessPolicy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for SuccessPolicy {
    type Err = ConfigError;

    /// Parses a comma separated list such as `2xx,404`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::InvalidPolicy {
            input: s.to_string(),
            reason,
        };

        let mut accepted = vec![];
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let lower = part.to_ascii_lowercase();
            let matcher = if let Some(class) = lower.strip_suffix("xx") {
                match class.parse::<u8>() {
                    Ok(class @ 1..=5) => StatusMatcher::Class(class),
                    _ => return Err(invalid(format!("`{part}` is not a status class"))),
                }
            } else {
                match lower.parse::<u16>() {
                    Ok(code @ 100..=599) => StatusMatcher::Exact(code),
                    _ => return Err(invalid(format!("`{part}` is not a status code"))),
                }
            };
            accepted.push(matcher);
        }

        if accepted.is_empty() {
            return Err(invalid("no statuses given".to_string()));
        }

        Ok(Self::new(accepted))
    }
}

/// Parses a per-route override of the form `route=2xx,404`.
pub fn parse_policy_override(s: &str) -> Result<(Route, SuccessPolicy), ConfigError> {
    let (route, policy) = s.split_once('=').ok_or_else(|| ConfigError::InvalidPolicy {
        input: s.to_string(),
        reason: "expected `route=statuses`".to_string(),
    })?;
    Ok((route.parse()?, policy.parse()?))
}
