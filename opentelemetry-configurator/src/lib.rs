//! # OpenTelemetry configurator
//!
//! Builds the tracer, meter and logger providers and the text map propagator
//! from the standard `OTEL_*` environment variables, with explicit overrides
//! for every pluggable stage, and installs them as process-wide defaults.
//!
//! ```no_run
//! use opentelemetry_configurator::{
//!     configure_opentelemetry, OpenTelemetryConfig, ResourceSpec, TelemetryRegistry,
//! };
//!
//! let resource = ResourceSpec::new()
//!     .with_standard_detectors()
//!     .with_service_name("checkout");
//! let config = OpenTelemetryConfig::new().with_resource(resource);
//! configure_opentelemetry(config, TelemetryRegistry::global());
//!
//! // ... run the application ...
//!
//! TelemetryRegistry::global().shutdown().ok();
//! ```
//!
//! Every stage (exporters, sampler, propagator, resource) is either resolved
//! from the environment, optionally consulting a caller supplied factory for
//! names that are not built in, or given as an already built instance, in which
//! case the environment is not read for that stage.
//!
//! Invalid environment values never fail configuration: they are reported
//! through the OpenTelemetry internal logs and replaced by their defaults.

pub mod env;
pub mod exporter;
pub mod internal_logging;
pub mod logs;
pub mod metrics;
pub mod processor;
pub mod propagation;
pub mod registry;
pub mod resource;
pub mod trace;

use std::fmt;

use opentelemetry::otel_debug;

pub use crate::exporter::{ExporterConfig, ExporterFactory, OtlpProtocol, Signal};
pub use crate::logs::{LogExporterConfig, LoggerProviderConfig, ResolvedLogExporter};
pub use crate::metrics::{MeterProviderConfig, MetricExporterConfig, ResolvedMetricExporter};
pub use crate::propagation::{PropagatorConfig, PropagatorFactory};
pub use crate::registry::{SharedPropagator, TelemetryRegistry};
pub use crate::resource::{ResourceConfig, ResourceSpec};
pub use crate::trace::{
    ResolvedSpanExporter, SamplerConfig, SamplerFactory, SpanExporterConfig, TracerProviderConfig,
};

use crate::env::{get_env_bool, OTEL_SDK_DISABLED};
use crate::internal_logging::configure_internal_logging_from_environment;
use crate::logs::configure_logger_provider;
use crate::metrics::configure_meter_provider;
use crate::trace::configure_tracer_provider;

/// Configuration of all three signals and the propagator.
///
/// The resource is resolved once and shared by the three providers, replacing
/// any resource set on the individual provider configs.
pub struct OpenTelemetryConfig {
    resource: ResourceConfig,
    traces: TracerProviderConfig,
    metrics: MeterProviderConfig,
    logs: LoggerProviderConfig,
    propagator: PropagatorConfig,
    internal_logging: bool,
}

impl Default for OpenTelemetryConfig {
    fn default() -> Self {
        OpenTelemetryConfig {
            resource: ResourceConfig::default(),
            traces: TracerProviderConfig::default(),
            metrics: MeterProviderConfig::default(),
            logs: LoggerProviderConfig::default(),
            propagator: PropagatorConfig::default(),
            internal_logging: true,
        }
    }
}

impl OpenTelemetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, resource: impl Into<ResourceConfig>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn with_traces(mut self, traces: TracerProviderConfig) -> Self {
        self.traces = traces;
        self
    }

    pub fn with_metrics(mut self, metrics: MeterProviderConfig) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_logs(mut self, logs: LoggerProviderConfig) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_propagator(mut self, propagator: PropagatorConfig) -> Self {
        self.propagator = propagator;
        self
    }

    /// Whether `OTEL_LOG_LEVEL` installs a subscriber for the SDK's own logs.
    /// Enabled by default.
    pub fn with_internal_logging(mut self, internal_logging: bool) -> Self {
        self.internal_logging = internal_logging;
        self
    }
}

impl fmt::Debug for OpenTelemetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenTelemetryConfig")
            .field("resource", &self.resource)
            .field("traces", &self.traces)
            .field("metrics", &self.metrics)
            .field("logs", &self.logs)
            .field("propagator", &self.propagator)
            .field("internal_logging", &self.internal_logging)
            .finish()
    }
}

/// Outcome of [`configure_opentelemetry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installation {
    /// `OTEL_SDK_DISABLED` was `true`; nothing was read or installed.
    Disabled,
    /// Providers and propagator were installed in the registry.
    Installed,
}

/// Builds the three providers and the propagator and installs each in
/// `registry` as soon as it is built.
///
/// Nothing happens when `OTEL_SDK_DISABLED` is `true`. Must complete before
/// other threads start using telemetry.
pub fn configure_opentelemetry(
    config: OpenTelemetryConfig,
    registry: &TelemetryRegistry,
) -> Installation {
    if get_env_bool(OTEL_SDK_DISABLED) {
        return Installation::Disabled;
    }
    if config.internal_logging {
        configure_internal_logging_from_environment();
    }

    let resource = config.resource.resolve();

    let mut traces = config.traces;
    traces.replace_resource(ResourceConfig::Resource(resource.clone()));
    registry.set_tracer_provider(configure_tracer_provider(traces));

    let mut metrics = config.metrics;
    metrics.replace_resource(ResourceConfig::Resource(resource.clone()));
    registry.set_meter_provider(configure_meter_provider(metrics));

    let mut logs = config.logs;
    logs.replace_resource(ResourceConfig::Resource(resource));
    registry.set_logger_provider(configure_logger_provider(logs));

    registry.set_propagator(config.propagator.resolve());

    otel_debug!(name: "Configurator.Installed");
    Installation::Installed
}

/// Configures everything from the environment alone, using the SDK's standard
/// resource detectors, and installs the result in [`TelemetryRegistry::global`].
pub fn configure_opentelemetry_from_environment() -> Installation {
    let config =
        OpenTelemetryConfig::new().with_resource(ResourceSpec::new().with_standard_detectors());
    configure_opentelemetry(config, TelemetryRegistry::global())
}
