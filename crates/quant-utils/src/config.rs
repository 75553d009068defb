//! Environment-variable configuration helpers
//!
//! Library crates describe their settings as plain structs with defaults; these
//! helpers let them layer `QUANT_*` overrides on top without repeating the
//! parse-and-report boilerplate.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Error raised when an environment override is present but malformed
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct EnvError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Parse an environment variable into `T`.
///
/// Returns `Ok(None)` when the variable is unset or blank.
pub fn env_parse<T>(key: &str) -> Result<Option<T>, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(key, raw.trim()).map(Some),
        _ => Ok(None),
    }
}

/// Parse an environment variable holding a number of seconds (fractions allowed)
pub fn env_duration_secs(key: &str) -> Result<Option<Duration>, EnvError> {
    let Some(secs) = env_parse::<f64>(key)? else {
        return Ok(None);
    };
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|e| EnvError {
            key: key.to_string(),
            value: secs.to_string(),
            reason: e.to_string(),
        })
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| EnvError {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_variable_is_none() {
        let value: Option<u32> = env_parse("QUANT_UTILS_TEST_DEFINITELY_UNSET").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_parse_value_reports_key() {
        let err = parse_value::<u32>("QUANT_X", "abc").unwrap_err();
        assert_eq!(err.key, "QUANT_X");
        assert_eq!(err.value, "abc");
        assert!(err.to_string().contains("QUANT_X"));
    }

    #[test]
    fn test_parse_value_ok() {
        assert_eq!(parse_value::<f64>("QUANT_Y", "0.25").unwrap(), 0.25);
    }
}
