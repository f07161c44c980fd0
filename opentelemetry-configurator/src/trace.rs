//! # Tracer provider assembly
//!
//! Resolves span exporters, wraps each in its own batch span processor, then
//! adds explicit processors, the sampler, the id generator and the resource.

mod exporter;
mod sampler;

use std::fmt;
use std::sync::OnceLock;

use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, IdGenerator, RandomIdGenerator, SdkTracerProvider,
    SpanExporter, SpanProcessor, TracerProviderBuilder,
};

pub use exporter::{
    configure_span_exporters, configure_span_exporters_from_environment, ResolvedSpanExporter,
    SpanExporterConfig,
};
pub use sampler::{
    builtin_sampler, configure_tracing_sampler_from_environment, ResolvedSampler, SamplerConfig,
    SamplerFactory, OTEL_TRACES_SAMPLER, OTEL_TRACES_SAMPLER_ARG, OTEL_TRACES_SAMPLER_ARG_DEFAULT,
    OTEL_TRACES_SAMPLER_DEFAULT,
};

use crate::processor::{BatchOptions, SPAN_BATCH_ENV_VARS};
use crate::resource::ResourceConfig;

static SPAN_BATCH_OPTIONS: OnceLock<BatchOptions> = OnceLock::new();

/// Options of the batch span processor, read from `OTEL_BSP_*` on first use
/// and reused for the rest of the process.
pub fn span_batch_options() -> BatchOptions {
    *SPAN_BATCH_OPTIONS.get_or_init(|| BatchOptions::from_env(SPAN_BATCH_ENV_VARS))
}

/// Wraps one exporter in a batch span processor tuned with `options`.
pub fn batch_span_processor<E: SpanExporter + 'static>(
    exporter: E,
    options: BatchOptions,
) -> BatchSpanProcessor {
    let config = BatchConfigBuilder::default()
        .with_max_queue_size(options.max_queue_size)
        .with_scheduled_delay(options.scheduled_delay)
        .with_max_export_batch_size(options.max_export_batch_size)
        .build();
    BatchSpanProcessor::builder(exporter)
        .with_batch_config(config)
        .build()
}

type BuilderFn = Box<dyn FnOnce(TracerProviderBuilder) -> TracerProviderBuilder>;

/// Everything needed to build one [`SdkTracerProvider`].
pub struct TracerProviderConfig {
    exporters: SpanExporterConfig,
    processors: Vec<BuilderFn>,
    resource: ResourceConfig,
    sampler: SamplerConfig,
    id_generator: Option<BuilderFn>,
    configure_exporters: bool,
}

impl Default for TracerProviderConfig {
    fn default() -> Self {
        TracerProviderConfig {
            exporters: SpanExporterConfig::default(),
            processors: Vec::new(),
            resource: ResourceConfig::default(),
            sampler: SamplerConfig::default(),
            id_generator: None,
            configure_exporters: true,
        }
    }
}

impl TracerProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exporters(mut self, exporters: SpanExporterConfig) -> Self {
        self.exporters = exporters;
        self
    }

    /// Adds a processor that runs after the ones built for resolved exporters.
    pub fn with_span_processor<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors
            .push(Box::new(move |builder| builder.with_span_processor(processor)));
        self
    }

    pub fn with_resource(mut self, resource: impl Into<ResourceConfig>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    /// Replaces the default [`RandomIdGenerator`].
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Some(Box::new(move |builder| {
            builder.with_id_generator(id_generator)
        }));
        self
    }

    /// When `false`, no exporter is resolved and only explicit processors are used.
    pub fn with_configure_exporters(mut self, configure_exporters: bool) -> Self {
        self.configure_exporters = configure_exporters;
        self
    }

    pub(crate) fn replace_resource(&mut self, resource: ResourceConfig) {
        self.resource = resource;
    }
}

impl fmt::Debug for TracerProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerProviderConfig")
            .field("exporters", &self.exporters)
            .field("processors", &self.processors.len())
            .field("resource", &self.resource)
            .field("sampler", &self.sampler)
            .field("id_generator", &self.id_generator.is_some())
            .field("configure_exporters", &self.configure_exporters)
            .finish()
    }
}

/// Builds a tracer provider. Processors for resolved exporters come first,
/// followed by the explicit ones in the order they were added.
pub fn configure_tracer_provider(config: TracerProviderConfig) -> SdkTracerProvider {
    let mut builder = SdkTracerProvider::builder();

    if config.configure_exporters {
        let options = span_batch_options();
        for exporter in configure_span_exporters(config.exporters) {
            builder = exporter.attach(builder, options);
        }
    }
    for processor in config.processors {
        builder = processor(builder);
    }

    builder = builder
        .with_resource(config.resource.resolve())
        .with_sampler(config.sampler.resolve());
    builder = match config.id_generator {
        Some(id_generator) => id_generator(builder),
        None => builder.with_id_generator(RandomIdGenerator::default()),
    };
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::OTEL_TRACES_EXPORTER;
    use crate::resource::ResourceSpec;
    use opentelemetry::trace::{Tracer, TracerProvider as _};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, Sampler, SimpleSpanProcessor};

    #[test]
    fn spans_reach_env_and_explicit_exporters() {
        let from_env = InMemorySpanExporter::default();
        let explicit = InMemorySpanExporter::default();
        let factory_exporter = from_env.clone();

        let config = TracerProviderConfig::new()
            .with_exporters(SpanExporterConfig::from_env_with_factory(move |name| {
                (name == "memory").then(|| ResolvedSpanExporter::new(factory_exporter.clone()))
            }))
            .with_span_processor(SimpleSpanProcessor::new(explicit.clone()))
            .with_sampler(SamplerConfig::sampler(Sampler::AlwaysOn))
            .with_resource(ResourceSpec::new().with_service_name("trace-test"));

        let provider = temp_env::with_var(OTEL_TRACES_EXPORTER, Some("memory"), || {
            configure_tracer_provider(config)
        });
        provider.tracer("test").in_span("work", |_cx| {});
        provider.force_flush().unwrap();

        let spans = from_env.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "work");
        assert_eq!(explicit.get_finished_spans().unwrap().len(), 1);
        provider.shutdown().unwrap();
    }

    #[test]
    fn disabled_exporters_leave_only_explicit_processors() {
        let explicit = InMemorySpanExporter::default();
        let config = TracerProviderConfig::new()
            .with_exporters(SpanExporterConfig::from_env_with_factory(|_| {
                panic!("exporters must not be resolved")
            }))
            .with_configure_exporters(false)
            .with_span_processor(SimpleSpanProcessor::new(explicit.clone()))
            .with_sampler(SamplerConfig::sampler(Sampler::AlwaysOn));

        let provider = temp_env::with_var(OTEL_TRACES_EXPORTER, Some("memory"), || {
            configure_tracer_provider(config)
        });
        provider.tracer("test").in_span("work", |_cx| {});

        assert_eq!(explicit.get_finished_spans().unwrap().len(), 1);
        provider.shutdown().unwrap();
    }

    #[test]
    fn none_exporter_attaches_no_processor() {
        let explicit = InMemorySpanExporter::default();
        let config = TracerProviderConfig::new()
            .with_span_processor(SimpleSpanProcessor::new(explicit.clone()))
            .with_sampler(SamplerConfig::sampler(Sampler::AlwaysOn))
            .with_resource(ResourceSpec::new().with_attribute(KeyValue::new("region", "eu")));

        let provider = temp_env::with_var(OTEL_TRACES_EXPORTER, Some("none"), || {
            configure_tracer_provider(config)
        });
        provider.tracer("test").in_span("work", |_cx| {});

        let spans = explicit.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        provider.shutdown().unwrap();
    }

    #[test]
    fn batch_options_are_read_once() {
        let first = span_batch_options();
        let second = temp_env::with_var(
            crate::processor::OTEL_BSP_MAX_QUEUE_SIZE,
            Some("3"),
            span_batch_options,
        );
        assert_eq!(first, second);
    }
}
