//! # Logger provider assembly

mod exporter;

use std::fmt;
use std::sync::OnceLock;

use opentelemetry_sdk::logs::{
    BatchConfigBuilder, BatchLogProcessor, LogExporter, LogProcessor, LoggerProviderBuilder,
    SdkLoggerProvider,
};

pub use exporter::{
    configure_log_exporters, configure_log_exporters_from_environment, LogExporterConfig,
    ResolvedLogExporter,
};

use crate::processor::{BatchOptions, LOG_BATCH_ENV_VARS};
use crate::resource::ResourceConfig;

static LOG_BATCH_OPTIONS: OnceLock<BatchOptions> = OnceLock::new();

/// Options of the batch log processor, read from `OTEL_BLRP_*` on first use
/// and reused for the rest of the process.
pub fn log_batch_options() -> BatchOptions {
    *LOG_BATCH_OPTIONS.get_or_init(|| BatchOptions::from_env(LOG_BATCH_ENV_VARS))
}

/// Wraps one exporter in a batch log processor tuned with `options`.
pub fn batch_log_processor<E: LogExporter + 'static>(
    exporter: E,
    options: BatchOptions,
) -> BatchLogProcessor {
    let config = BatchConfigBuilder::default()
        .with_max_queue_size(options.max_queue_size)
        .with_scheduled_delay(options.scheduled_delay)
        .with_max_export_batch_size(options.max_export_batch_size)
        .build();
    BatchLogProcessor::builder(exporter)
        .with_batch_config(config)
        .build()
}

type BuilderFn = Box<dyn FnOnce(LoggerProviderBuilder) -> LoggerProviderBuilder>;

/// Everything needed to build one [`SdkLoggerProvider`].
pub struct LoggerProviderConfig {
    exporters: LogExporterConfig,
    processors: Vec<BuilderFn>,
    resource: ResourceConfig,
    configure_exporters: bool,
}

impl Default for LoggerProviderConfig {
    fn default() -> Self {
        LoggerProviderConfig {
            exporters: LogExporterConfig::default(),
            processors: Vec::new(),
            resource: ResourceConfig::default(),
            configure_exporters: true,
        }
    }
}

impl LoggerProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exporters(mut self, exporters: LogExporterConfig) -> Self {
        self.exporters = exporters;
        self
    }

    /// Adds a processor that runs after the ones built for resolved exporters.
    pub fn with_log_processor<P: LogProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors
            .push(Box::new(move |builder| builder.with_log_processor(processor)));
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

impl fmt::Debug for LoggerProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerProviderConfig")
            .field("exporters", &self.exporters)
            .field("processors", &self.processors.len())
            .field("resource", &self.resource)
            .field("configure_exporters", &self.configure_exporters)
            .finish()
    }
}

pub fn configure_logger_provider(config: LoggerProviderConfig) -> SdkLoggerProvider {
    let mut builder = SdkLoggerProvider::builder().with_resource(config.resource.resolve());

    if config.configure_exporters {
        let options = log_batch_options();
        for exporter in configure_log_exporters(config.exporters) {
            builder = exporter.attach(builder, options);
        }
    }
    for processor in config.processors {
        builder = processor(builder);
    }
    builder.build()
}
