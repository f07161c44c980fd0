//! Exporter selection rules shared by traces, metrics and logs.
//!
//! Each signal reads a comma separated list of exporter names. `otlp` is built
//! in; every other name is handed to the caller's [`ExporterFactory`].

use std::fmt;

use opentelemetry::{otel_debug, otel_warn};

use crate::env::{get_env, get_env_non_empty, split_and_trim, trim};

/// Exporter names for the traces signal.
pub const OTEL_TRACES_EXPORTER: &str = "OTEL_TRACES_EXPORTER";
/// Exporter names for the metrics signal.
pub const OTEL_METRICS_EXPORTER: &str = "OTEL_METRICS_EXPORTER";
/// Exporter names for the logs signal.
pub const OTEL_LOGS_EXPORTER: &str = "OTEL_LOGS_EXPORTER";

/// OTLP protocol for all signals, unless overridden per signal.
pub const OTEL_EXPORTER_OTLP_PROTOCOL: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";
/// OTLP protocol for traces.
pub const OTEL_EXPORTER_OTLP_TRACES_PROTOCOL: &str = "OTEL_EXPORTER_OTLP_TRACES_PROTOCOL";
/// OTLP protocol for metrics.
pub const OTEL_EXPORTER_OTLP_METRICS_PROTOCOL: &str = "OTEL_EXPORTER_OTLP_METRICS_PROTOCOL";
/// OTLP protocol for logs.
pub const OTEL_EXPORTER_OTLP_LOGS_PROTOCOL: &str = "OTEL_EXPORTER_OTLP_LOGS_PROTOCOL";
/// Protocol used when neither protocol variable is set.
pub const OTEL_EXPORTER_OTLP_PROTOCOL_DEFAULT: &str = "http/protobuf";

/// The exporter name handled without a factory.
pub const OTLP_EXPORTER_NAME: &str = "otlp";
const NONE: &str = "none";

/// One of the three telemetry signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    /// Variable holding this signal's exporter names.
    pub fn exporter_env(self) -> &'static str {
        match self {
            Signal::Traces => OTEL_TRACES_EXPORTER,
            Signal::Metrics => OTEL_METRICS_EXPORTER,
            Signal::Logs => OTEL_LOGS_EXPORTER,
        }
    }

    /// Variable holding this signal's OTLP protocol.
    pub fn otlp_protocol_env(self) -> &'static str {
        match self {
            Signal::Traces => OTEL_EXPORTER_OTLP_TRACES_PROTOCOL,
            Signal::Metrics => OTEL_EXPORTER_OTLP_METRICS_PROTOCOL,
            Signal::Logs => OTEL_EXPORTER_OTLP_LOGS_PROTOCOL,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        })
    }
}

/// Builds an exporter for a name that is not built in. Returning `None`
/// means the name is not recognized.
pub type ExporterFactory<E> = Box<dyn Fn(&str) -> Option<E>>;

/// Where a signal's exporters come from.
pub enum ExporterConfig<E> {
    /// Read the exporter names from the environment. Names other than `otlp`
    /// are passed to the factory, if any.
    FromEnv(Option<ExporterFactory<E>>),
    /// Use these exporters and never read the environment.
    Exporters(Vec<E>),
}

impl<E> Default for ExporterConfig<E> {
    fn default() -> Self {
        ExporterConfig::FromEnv(None)
    }
}

impl<E> ExporterConfig<E> {
    pub fn from_env() -> Self {
        ExporterConfig::FromEnv(None)
    }

    pub fn from_env_with_factory<F>(factory: F) -> Self
    where
        F: Fn(&str) -> Option<E> + 'static,
    {
        ExporterConfig::FromEnv(Some(Box::new(factory)))
    }

    pub fn exporters(exporters: Vec<E>) -> Self {
        ExporterConfig::Exporters(exporters)
    }
}

impl<E: fmt::Debug> fmt::Debug for ExporterConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExporterConfig::FromEnv(factory) => f
                .debug_struct("FromEnv")
                .field("factory", &factory.is_some())
                .finish(),
            ExporterConfig::Exporters(exporters) => {
                f.debug_tuple("Exporters").field(exporters).finish()
            }
        }
    }
}

/// Reads the signal's exporter names and applies the `none` rules.
///
/// * exactly `none`: the signal is disabled and the list is empty;
/// * unset or blank: `otlp`;
/// * `none` next to other names: the whole list is replaced with `otlp`.
pub fn exporter_names_from_environment(signal: Signal) -> Vec<String> {
    let env_var = signal.exporter_env();
    let names = split_and_trim(&get_env(env_var).unwrap_or_default());

    if names.len() == 1 && names[0] == NONE {
        otel_warn!(
            name: "ExporterSelection.Disabled",
            env_var = env_var,
            message = "Exporter list is \"none\", the signal will not be exported"
        );
        return Vec::new();
    }
    if names.is_empty() {
        otel_warn!(
            name: "ExporterSelection.Empty",
            env_var = env_var,
            message = "Exporter list is empty, using the default otlp exporter"
        );
        return vec![OTLP_EXPORTER_NAME.to_owned()];
    }
    if names.iter().any(|name| name == NONE) {
        otel_warn!(
            name: "ExporterSelection.NoneWithOthers",
            env_var = env_var,
            message = "Exporter list contains \"none\" and other exporters, using the default otlp exporter"
        );
        return vec![OTLP_EXPORTER_NAME.to_owned()];
    }
    names
}

/// Transport and encoding used by the built-in OTLP exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtlpProtocol {
    Grpc,
    HttpBinary,
    HttpJson,
}

/// Maps a protocol value to a transport. `None` when the value is not recognized.
pub fn parse_otlp_protocol(value: &str) -> Option<OtlpProtocol> {
    match trim(value) {
        "grpc" => Some(OtlpProtocol::Grpc),
        "http/json" => Some(OtlpProtocol::HttpJson),
        value if value.starts_with("http/") => Some(OtlpProtocol::HttpBinary),
        _ => None,
    }
}

/// Picks the OTLP protocol for a signal. The per-signal variable wins over the
/// generic one, and unknown values fall back to HTTP.
pub fn otlp_protocol_from_environment(signal: Signal) -> OtlpProtocol {
    let (env_var, value) = match get_env_non_empty(signal.otlp_protocol_env()) {
        Some(value) => (signal.otlp_protocol_env(), value),
        None => match get_env_non_empty(OTEL_EXPORTER_OTLP_PROTOCOL) {
            Some(value) => (OTEL_EXPORTER_OTLP_PROTOCOL, value),
            None => return OtlpProtocol::HttpBinary,
        },
    };

    match parse_otlp_protocol(&value) {
        #[cfg(not(feature = "grpc-tonic"))]
        Some(OtlpProtocol::Grpc) => {
            otel_warn!(
                name: "OtlpProtocol.GrpcUnavailable",
                env_var = env_var,
                message = "gRPC support is not enabled, using http/protobuf"
            );
            OtlpProtocol::HttpBinary
        }
        Some(protocol) => protocol,
        None => {
            otel_warn!(
                name: "OtlpProtocol.Unrecognized",
                env_var = env_var,
                value = value.as_str(),
                message = "Unrecognized OTLP protocol, using http/protobuf"
            );
            OtlpProtocol::HttpBinary
        }
    }
}

/// The tonic channel is bound to the current Tokio runtime. Without one, gRPC
/// is replaced by HTTP protobuf.
#[cfg(feature = "grpc-tonic")]
fn usable_otlp_protocol(signal: Signal, protocol: OtlpProtocol) -> OtlpProtocol {
    if protocol == OtlpProtocol::Grpc && tokio::runtime::Handle::try_current().is_err() {
        otel_warn!(
            name: "OtlpProtocol.NoTokioRuntime",
            signal = format!("{signal}"),
            message = "gRPC export needs a Tokio runtime, using http/protobuf"
        );
        return OtlpProtocol::HttpBinary;
    }
    protocol
}

#[cfg(not(feature = "grpc-tonic"))]
fn usable_otlp_protocol(_signal: Signal, protocol: OtlpProtocol) -> OtlpProtocol {
    protocol
}

/// Resolves every name from the signal's exporter variable, dropping the
/// ones that cannot be built. Order follows the variable.
pub(crate) fn resolve_exporters<E>(
    signal: Signal,
    factory: Option<&ExporterFactory<E>>,
    build_otlp: impl Fn(OtlpProtocol) -> Option<E>,
) -> Vec<E> {
    let mut exporters = Vec::new();
    for name in exporter_names_from_environment(signal) {
        let exporter = if name == OTLP_EXPORTER_NAME {
            build_otlp(usable_otlp_protocol(
                signal,
                otlp_protocol_from_environment(signal),
            ))
        } else {
            factory.and_then(|factory| factory(&name))
        };
        match exporter {
            Some(exporter) => {
                otel_debug!(
                    name: "ExporterSelection.Resolved",
                    env_var = signal.exporter_env(),
                    exporter = name.as_str()
                );
                exporters.push(exporter);
            }
            None => {
                otel_warn!(
                    name: "ExporterSelection.Unrecognized",
                    env_var = signal.exporter_env(),
                    value = name.as_str(),
                    message = "Unrecognized exporter name, ignoring"
                );
            }
        }
    }
    exporters
}

/// Logs an OTLP exporter that failed to build. The caller treats it as absent.
pub(crate) fn warn_otlp_build_failure(signal: Signal, error: &dyn fmt::Display) {
    otel_warn!(
        name: "OtlpExporter.BuildFailed",
        signal = format!("{signal}"),
        error = format!("{error}")
    );
}
