use std::time::Duration;

use veditor_core::config::env_or;

/// Delay between two status requests for the same task.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// A task that has not reached a terminal state after this long is failed.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30 * 60;

/// Submissions upload whole videos; only this many run at once.
pub const DEFAULT_MAX_CONCURRENT_SUBMISSIONS: usize = 4;

/// Timing and concurrency settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// Always at least 1.
    pub max_concurrent_submissions: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            max_concurrent_submissions: DEFAULT_MAX_CONCURRENT_SUBMISSIONS,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                              | Default |
    /// |--------------------------------------|---------|
    /// | `VEDITOR_POLL_INTERVAL_MS`           | `1000`  |
    /// | `VEDITOR_POLL_TIMEOUT_SECS`          | `1800`  |
    /// | `VEDITOR_MAX_CONCURRENT_SUBMISSIONS` | `4`     |
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_millis(env_or(
                "VEDITOR_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
            poll_timeout: Duration::from_secs(env_or(
                "VEDITOR_POLL_TIMEOUT_SECS",
                DEFAULT_POLL_TIMEOUT_SECS,
            )),
            max_concurrent_submissions: env_or(
                "VEDITOR_MAX_CONCURRENT_SUBMISSIONS",
                DEFAULT_MAX_CONCURRENT_SUBMISSIONS,
            )
            .max(1),
        }
    }
}
