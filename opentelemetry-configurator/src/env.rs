//! Parsing of raw environment values.
//!
//! The `parse_*` functions are pure and report failures as [`EnvValueError`].
//! The `get_env_*` functions read the process environment and apply one policy
//! to every failure: emit a warning and return the caller's default.

use std::env;

use opentelemetry::otel_warn;

/// Disables every pipeline when set to `true`.
pub const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";
/// Verbosity of the SDK's own diagnostics.
pub const OTEL_LOG_LEVEL: &str = "OTEL_LOG_LEVEL";

/// Why an environment value was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvValueError {
    /// The text could not be parsed as the expected type.
    #[error("invalid value {0:?}")]
    Invalid(String),
    /// The text parsed, but the value is outside the accepted bounds.
    #[error("value {0:?} is outside the valid range")]
    OutOfRange(String),
}

/// Strips leading and trailing whitespace, including form feed and vertical tab.
pub fn trim(value: &str) -> &str {
    value.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0c' | '\x0b'))
}

/// Splits on commas, trims every token and drops the empty ones.
pub fn split_and_trim(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Accepts `true` and `false` in any letter case. Empty text is `false`.
/// Surrounding whitespace makes the value invalid.
pub fn parse_bool(value: &str) -> Result<bool, EnvValueError> {
    if value.is_empty() || value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else {
        Err(EnvValueError::Invalid(value.to_owned()))
    }
}

/// Accepts non-negative integers.
pub fn parse_long(value: &str) -> Result<u64, EnvValueError> {
    let value = trim(value);
    match value.parse::<i64>() {
        Ok(parsed) if parsed < 0 => Err(EnvValueError::OutOfRange(value.to_owned())),
        Ok(parsed) => Ok(parsed as u64),
        // Larger than i64::MAX but still a well formed number.
        Err(_) if value.parse::<u64>().is_ok() => Err(EnvValueError::OutOfRange(value.to_owned())),
        Err(_) => Err(EnvValueError::Invalid(value.to_owned())),
    }
}

/// Accepts finite numbers within the inclusive range `[min, max]`.
pub fn parse_double(value: &str, min: f64, max: f64) -> Result<f64, EnvValueError> {
    let value = trim(value);
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_nan() => Err(EnvValueError::Invalid(value.to_owned())),
        Ok(parsed) if parsed < min || parsed > max => {
            Err(EnvValueError::OutOfRange(value.to_owned()))
        }
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(EnvValueError::Invalid(value.to_owned())),
    }
}

/// Returns the variable's value, or `None` when it is unset or not unicode.
pub fn get_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// Returns the variable's value when it is set and not blank.
pub(crate) fn get_env_non_empty(name: &str) -> Option<String> {
    get_env(name).filter(|value| !trim(value).is_empty())
}

/// Reads a boolean flag. Anything other than `true` reads as `false`.
pub fn get_env_bool(name: &str) -> bool {
    let Some(value) = get_env(name) else {
        return false;
    };
    match parse_bool(&value) {
        Ok(flag) => flag,
        Err(err) => {
            warn_invalid(name, &err);
            false
        }
    }
}

/// Reads a non-negative integer, falling back to `default` when unset, blank or rejected.
pub fn get_env_long(name: &str, default: u64) -> u64 {
    let Some(value) = get_env_non_empty(name) else {
        return default;
    };
    parse_long(&value).unwrap_or_else(|err| {
        warn_invalid(name, &err);
        default
    })
}

/// Like [`get_env_long`], with values below `min` rejected as out of range.
pub fn get_env_long_at_least(name: &str, default: u64, min: u64) -> u64 {
    let Some(value) = get_env_non_empty(name) else {
        return default;
    };
    let parsed = parse_long(&value).and_then(|parsed| {
        if parsed < min {
            Err(EnvValueError::OutOfRange(trim(&value).to_owned()))
        } else {
            Ok(parsed)
        }
    });
    parsed.unwrap_or_else(|err| {
        warn_invalid(name, &err);
        default
    })
}

/// Reads a number within `[min, max]`, falling back to `default` when unset, blank or rejected.
pub fn get_env_double(name: &str, default: f64, min: f64, max: f64) -> f64 {
    let Some(value) = get_env_non_empty(name) else {
        return default;
    };
    parse_double(&value, min, max).unwrap_or_else(|err| {
        warn_invalid(name, &err);
        default
    })
}

fn warn_invalid(name: &str, err: &EnvValueError) {
    match err {
        EnvValueError::Invalid(value) => {
            otel_warn!(
                name: "EnvironmentVariable.InvalidValue",
                env_var = name,
                value = value.as_str(),
                message = "Environment variable has an invalid value, ignoring"
            );
        }
        EnvValueError::OutOfRange(value) => {
            otel_warn!(
                name: "EnvironmentVariable.OutOfRange",
                env_var = name,
                value = value.as_str(),
                message = "Environment variable is outside the valid range, ignoring"
            );
        }
    }
}
