//! Helpers for reading configuration from environment variables.
//!
//! Every setting has a default suitable for local development. A value
//! that is present but unparseable is reported and replaced by the
//! default rather than aborting start-up.

use std::str::FromStr;

/// Read `key` from the environment, falling back to `default` when the
/// variable is unset or does not parse.
pub fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

/// Read an optional, non-empty string setting.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.trim().parse() {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(key, value = raw, error = %e, "Ignoring invalid setting, using default");
            default
        }
    }
}
