//! Environment variable parsing shared by every `from_env` constructor.
//!
//! Unset variables fall back to the default; set but malformed values are
//! rejected with [`Error::Config`] instead of being silently ignored.

use std::str::FromStr;

use crate::error::{Error, Result};

/// Parse an optional environment variable, rejecting malformed values.
pub fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T> {
    Ok(env_parse_opt(name)?.unwrap_or(default))
}

/// Parse an environment variable that has no default.
pub fn env_parse_opt<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has invalid value {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Required environment variable.
pub fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("{} must be set", name)))
}
