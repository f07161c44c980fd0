//! # Meter provider assembly
//!
//! Every resolved exporter gets its own periodic reader.

mod exporter;

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use opentelemetry_sdk::metrics::reader::MetricReader;
use opentelemetry_sdk::metrics::{Instrument, MeterProviderBuilder, SdkMeterProvider, Stream};

pub use exporter::{
    configure_metric_exporters, configure_metric_exporters_from_environment,
    MetricExporterConfig, ResolvedMetricExporter,
};

use crate::env::get_env_long_at_least;
use crate::resource::ResourceConfig;

/// Interval between two metric collections, in milliseconds. Zero is rejected.
pub const OTEL_METRIC_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";
/// Default collection interval, in milliseconds.
pub const OTEL_METRIC_EXPORT_INTERVAL_DEFAULT: u64 = 60_000;
/// Maximum time one export may take, in milliseconds. Zero is rejected.
pub const OTEL_METRIC_EXPORT_TIMEOUT: &str = "OTEL_METRIC_EXPORT_TIMEOUT";
/// Default export timeout, in milliseconds.
pub const OTEL_METRIC_EXPORT_TIMEOUT_DEFAULT: u64 = 30_000;

/// Tuning shared by every periodic reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricReaderOptions {
    pub export_interval: Duration,
    pub export_timeout: Duration,
}

impl Default for MetricReaderOptions {
    fn default() -> Self {
        MetricReaderOptions {
            export_interval: Duration::from_millis(OTEL_METRIC_EXPORT_INTERVAL_DEFAULT),
            export_timeout: Duration::from_millis(OTEL_METRIC_EXPORT_TIMEOUT_DEFAULT),
        }
    }
}

impl MetricReaderOptions {
    pub fn from_env() -> Self {
        MetricReaderOptions {
            export_interval: Duration::from_millis(get_env_long_at_least(
                OTEL_METRIC_EXPORT_INTERVAL,
                OTEL_METRIC_EXPORT_INTERVAL_DEFAULT,
                1,
            )),
            export_timeout: Duration::from_millis(get_env_long_at_least(
                OTEL_METRIC_EXPORT_TIMEOUT,
                OTEL_METRIC_EXPORT_TIMEOUT_DEFAULT,
                1,
            )),
        }
    }
}

static METRIC_READER_OPTIONS: OnceLock<MetricReaderOptions> = OnceLock::new();

/// Reader options, read on first use and reused for the rest of the process.
pub fn metric_reader_options() -> MetricReaderOptions {
    *METRIC_READER_OPTIONS.get_or_init(MetricReaderOptions::from_env)
}

type BuilderFn = Box<dyn FnOnce(MeterProviderBuilder) -> MeterProviderBuilder>;

/// Everything needed to build one [`SdkMeterProvider`].
pub struct MeterProviderConfig {
    exporters: MetricExporterConfig,
    readers: Vec<BuilderFn>,
    views: Vec<BuilderFn>,
    resource: ResourceConfig,
    configure_exporters: bool,
}

impl Default for MeterProviderConfig {
    fn default() -> Self {
        MeterProviderConfig {
            exporters: MetricExporterConfig::default(),
            readers: Vec::new(),
            views: Vec::new(),
            resource: ResourceConfig::default(),
            configure_exporters: true,
        }
    }
}

impl MeterProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exporters(mut self, exporters: MetricExporterConfig) -> Self {
        self.exporters = exporters;
        self
    }

    /// Adds a reader after the periodic readers built for resolved exporters.
    pub fn with_reader<R: MetricReader + 'static>(mut self, reader: R) -> Self {
        self.readers
            .push(Box::new(move |builder| builder.with_reader(reader)));
        self
    }

    /// Adds a view. A view returning a [`Stream`] for an instrument renames,
    /// re-describes or re-aggregates it; returning `None` leaves it alone.
    pub fn with_view<V>(mut self, view: V) -> Self
    where
        V: Fn(&Instrument) -> Option<Stream> + Send + Sync + 'static,
    {
        self.views.push(Box::new(move |builder| builder.with_view(view)));
        self
    }

    pub fn with_resource(mut self, resource: impl Into<ResourceConfig>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn with_configure_exporters(mut self, configure_exporters: bool) -> Self {
        self.configure_exporters = configure_exporters;
        self
    }

    pub(crate) fn replace_resource(&mut self, resource: ResourceConfig) {
        self.resource = resource;
    }
}

impl fmt::Debug for MeterProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProviderConfig")
            .field("exporters", &self.exporters)
            .field("readers", &self.readers.len())
            .field("views", &self.views.len())
            .field("resource", &self.resource)
            .field("configure_exporters", &self.configure_exporters)
            .finish()
    }
}

pub fn configure_meter_provider(config: MeterProviderConfig) -> SdkMeterProvider {
    let mut builder = SdkMeterProvider::builder().with_resource(config.resource.resolve());

    if config.configure_exporters {
        let options = metric_reader_options();
        for exporter in configure_metric_exporters(config.exporters) {
            builder = exporter.attach(builder, options);
        }
    }
    for reader in config.readers {
        builder = reader(builder);
    }
    for view in config.views {
        builder = view(builder);
    }
    builder.build()
}
