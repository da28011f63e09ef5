use std::time::Duration;

use veditor_core::config::{env_opt, env_or};

/// Default origin of the compositing service.
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8000";

/// Uploads carry whole videos, so the per-request timeout is generous.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Connection settings for the compositing service.
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Base origin, e.g. `http://localhost:8000`. No trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Optional `output_dir` form field sent with full submissions.
    pub output_dir: Option<String>,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVICE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            output_dir: None,
        }
    }
}

impl CompositorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `VEDITOR_SERVICE_URL`          | `http://localhost:8000` |
    /// | `VEDITOR_REQUEST_TIMEOUT_SECS` | `600`                   |
    /// | `VEDITOR_OUTPUT_DIR`           | unset                   |
    pub fn from_env() -> Self {
        let base_url = env_opt("VEDITOR_SERVICE_URL")
            .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string());

        Self {
            base_url: normalize_base_url(&base_url),
            request_timeout: Duration::from_secs(env_or(
                "VEDITOR_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            output_dir: env_opt("VEDITOR_OUTPUT_DIR"),
        }
    }

    /// Same defaults, pointed at another origin.
    pub fn with_base_url(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.as_ref()),
            ..Self::default()
        }
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CompositorConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.request_timeout, Duration::from_secs(600));
        assert!(config.output_dir.is_none());
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let config = CompositorConfig::with_base_url("http://gpu-box:9000/ ");
        assert_eq!(config.base_url, "http://gpu-box:9000");
    }
}
