use std::time::Duration;

/// Target used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

pub const DEFAULT_VIRTUAL_USERS: usize = 50;

pub const DEFAULT_DURATION: Duration = Duration::from_secs(5 * 60);

/// Pause between two iterations of the same virtual user.
pub const DEFAULT_THINK_TIME: Duration = Duration::from_millis(100);

/// Upper bound on a single request, including reading the response body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Global p99 latency budget and error budget applied when no thresholds are configured.
pub const DEFAULT_THRESHOLD: &str = "http_req_duration: p(99) < 500; http_req_failed: rate < 0.01";

/// Allowed deviation of the summed route weights from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
