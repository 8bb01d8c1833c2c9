use crate::{
    ConfigError, DEFAULT_BASE_URL, DEFAULT_DURATION, DEFAULT_REQUEST_TIMEOUT, DEFAULT_THINK_TIME,
    DEFAULT_VIRTUAL_USERS,
};
use serde::Serialize;
use std::time::Duration;

/// Settings of a single run. Immutable once the run starts.
#[derive(Clone, Debug, Serialize)]
pub struct RunConfig {
    /// Target root without a trailing slash, e.g. `http://localhost:8080`.
    pub base_url: String,
    pub virtual_users: usize,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    #[serde(serialize_with = "serialize_duration")]
    pub think_time: Duration,
    #[serde(serialize_with = "serialize_duration")]
    pub request_timeout: Duration,
    /// Seed for the per-user random sources. Random when unset.
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }
}

#[derive(Debug, Clone)]
pub struct RunConfigBuilder {
    base_url: String,
    virtual_users: usize,
    duration: Duration,
    think_time: Duration,
    request_timeout: Duration,
    seed: Option<u64>,
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            virtual_users: DEFAULT_VIRTUAL_USERS,
            duration: DEFAULT_DURATION,
            think_time: DEFAULT_THINK_TIME,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            seed: None,
        }
    }
}

impl RunConfigBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn virtual_users(mut self, virtual_users: usize) -> Self {
        self.virtual_users = virtual_users;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// A zero think time runs every virtual user flat out.
    pub fn think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> Result<RunConfig, ConfigError> {
        if self.virtual_users == 0 {
            return Err(ConfigError::InvalidVirtualUsers(self.virtual_users));
        }
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(RunConfig {
            base_url: normalize_base_url(&self.base_url)?,
            virtual_users: self.virtual_users,
            duration: self.duration,
            think_time: self.think_time,
            request_timeout: self.request_timeout,
            seed: self.seed,
        })
    }
}

/// Parses a human readable duration such as `5m`, `90s` or `100ms`.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|source| ConfigError::InvalidDuration {
        value: value.to_string(),
        source,
    })
}

fn normalize_base_url(base_url: &str) -> Result<String, ConfigError> {
    let url = url::Url::parse(base_url.trim()).map_err(|source| ConfigError::InvalidBaseUrl {
        url: base_url.to_string(),
        source,
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme(base_url.to_string()));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn serialize_duration<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&humantime::format_duration(*d))
}
