//! Environment variable helpers used by every `from_env()` constructor.
//!
//! Missing variables fall back to the supplied default. Present but
//! unparsable values are reported as [`ConfigError::InvalidValue`] instead
//! of being silently replaced.

use std::str::FromStr;

use crate::error::ConfigError;

/// Read `var` as a string, or return `default` when unset.
pub fn string_or(var: &'static str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

/// Read and parse `var`, or return `default` when unset.
pub fn parse_or<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Read `var` as a boolean flag.
///
/// Accepts `true`/`false`, `1`/`0`, `yes`/`no` and `on`/`off`, case-insensitively.
pub fn bool_or(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
            var,
            value: raw.clone(),
            reason: "expected a boolean".to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
