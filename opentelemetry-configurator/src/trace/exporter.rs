use std::fmt;

use opentelemetry_otlp::{Protocol, WithExportConfig as _};
use opentelemetry_sdk::trace::{SpanExporter, TracerProviderBuilder};

use super::batch_span_processor;
use crate::exporter::{
    resolve_exporters, warn_otlp_build_failure, ExporterConfig, ExporterFactory, OtlpProtocol,
    Signal,
};
use crate::processor::BatchOptions;

type AttachFn = Box<dyn FnOnce(TracerProviderBuilder, BatchOptions) -> TracerProviderBuilder>;

/// A span exporter of any type, waiting to be wrapped in its batch processor.
pub struct ResolvedSpanExporter {
    name: &'static str,
    attach: AttachFn,
}

impl ResolvedSpanExporter {
    pub fn new<E: SpanExporter + 'static>(exporter: E) -> Self {
        ResolvedSpanExporter {
            name: std::any::type_name::<E>(),
            attach: Box::new(move |builder, options| {
                builder.with_span_processor(batch_span_processor(exporter, options))
            }),
        }
    }

    /// Type name of the wrapped exporter.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Adds a batch processor owning this exporter to `builder`.
    pub(crate) fn attach(
        self,
        builder: TracerProviderBuilder,
        options: BatchOptions,
    ) -> TracerProviderBuilder {
        (self.attach)(builder, options)
    }
}

impl fmt::Debug for ResolvedSpanExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResolvedSpanExporter").field(&self.name).finish()
    }
}

pub type SpanExporterConfig = ExporterConfig<ResolvedSpanExporter>;

/// Builds the span exporters named by `OTEL_TRACES_EXPORTER`.
pub fn configure_span_exporters_from_environment(
    factory: Option<&ExporterFactory<ResolvedSpanExporter>>,
) -> Vec<ResolvedSpanExporter> {
    resolve_exporters(Signal::Traces, factory, build_otlp_span_exporter)
}

pub fn configure_span_exporters(config: SpanExporterConfig) -> Vec<ResolvedSpanExporter> {
    match config {
        ExporterConfig::FromEnv(factory) => {
            configure_span_exporters_from_environment(factory.as_ref())
        }
        ExporterConfig::Exporters(exporters) => exporters,
    }
}

fn build_otlp_span_exporter(protocol: OtlpProtocol) -> Option<ResolvedSpanExporter> {
    let builder = opentelemetry_otlp::SpanExporter::builder();
    let exporter = match protocol {
        #[cfg(feature = "grpc-tonic")]
        OtlpProtocol::Grpc => builder.with_tonic().build(),
        OtlpProtocol::HttpJson => builder.with_http().with_protocol(Protocol::HttpJson).build(),
        _ => builder
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .build(),
    };
    match exporter {
        Ok(exporter) => Some(ResolvedSpanExporter::new(exporter)),
        Err(err) => {
            warn_otlp_build_failure(Signal::Traces, &err);
            None
        }
    }
}
