//! Verbosity of the SDK's own diagnostics, driven by `OTEL_LOG_LEVEL`.

use opentelemetry::otel_warn;
use tracing_subscriber::{filter::LevelFilter, filter::Targets, prelude::*};

use crate::env::{get_env_non_empty, trim, OTEL_LOG_LEVEL};

/// Level used when `OTEL_LOG_LEVEL` is unset or not recognized.
pub const OTEL_LOG_LEVEL_DEFAULT: LevelFilter = LevelFilter::INFO;

/// Maps an `OTEL_LOG_LEVEL` value to a level filter. Matching ignores case.
pub fn parse_log_level(value: &str) -> Option<LevelFilter> {
    match trim(value).to_ascii_lowercase().as_str() {
        "none" => Some(LevelFilter::OFF),
        "error" => Some(LevelFilter::ERROR),
        "warning" => Some(LevelFilter::WARN),
        "info" => Some(LevelFilter::INFO),
        "debug" => Some(LevelFilter::DEBUG),
        _ => None,
    }
}

/// Installs a `fmt` subscriber for the `opentelemetry*` targets at the level
/// named by `OTEL_LOG_LEVEL`, and returns that level.
///
/// If the application already installed a global subscriber, that subscriber
/// is kept and only the level is reported.
pub fn configure_internal_logging_from_environment() -> LevelFilter {
    let requested = get_env_non_empty(OTEL_LOG_LEVEL);
    let level = requested
        .as_deref()
        .and_then(parse_log_level)
        .unwrap_or(OTEL_LOG_LEVEL_DEFAULT);

    let targets = Targets::new().with_target("opentelemetry", level);
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(targets))
        .try_init();

    // Reported after installation so the warning has somewhere to go.
    if let Some(value) = requested.as_deref() {
        if parse_log_level(value).is_none() {
            otel_warn!(
                name: "InternalLogging.InvalidLevel",
                env_var = OTEL_LOG_LEVEL,
                value = value,
                message = "Unrecognized log level, using info"
            );
        }
    }
    level
}
