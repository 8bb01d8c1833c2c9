use thiserror::Error;

/// Problems detected while assembling a run. All of these are fatal and reported before any
/// virtual user starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Virtual user count must be positive, got {0}")]
    InvalidVirtualUsers(usize),

    #[error("Invalid duration `{value}`: {source}")]
    InvalidDuration {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("Run duration must be greater than zero")]
    ZeroDuration,

    #[error("Request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("Invalid base URL `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Base URL `{0}` must use http or https")]
    UnsupportedScheme(String),

    #[error("Unknown route `{0}` (expected search, product or checkout)")]
    UnknownRoute(String),

    #[error("Invalid route weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid threshold `{input}`: {reason}")]
    InvalidThreshold { input: String, reason: String },

    #[error("Invalid success policy `{input}`: {reason}")]
    InvalidPolicy { input: String, reason: String },
}

/// A threshold that could not be evaluated. Reported separately from a threshold miss.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("No samples recorded for `{0}`")]
    NoSamples(crate::MetricSelector),
}

impl serde::Serialize for EvaluationError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
