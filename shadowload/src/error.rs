use shadowload_core::ConfigError;
use thiserror::Error;

/// Failures of the run plumbing itself. Request failures are never reported here; they are
/// recorded as metrics.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Virtual user task failed: {0}")]
    VirtualUser(#[from] tokio::task::JoinError),
}

impl RunError {
    /// Process exit status. Failures before any virtual user started count as configuration
    /// errors; a panicked virtual user uses the panic status.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Config(_) | RunError::Client(_) => shadowload_core::CONFIG_ERROR_EXIT_CODE,
            RunError::VirtualUser(_) => 101,
        }
    }
}
