use std::fmt;

use opentelemetry_otlp::{Protocol, WithExportConfig as _};
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::{MeterProviderBuilder, PeriodicReader};

use super::{metric_reader_options, MetricReaderOptions};
use crate::exporter::{
    resolve_exporters, warn_otlp_build_failure, ExporterConfig, ExporterFactory, OtlpProtocol,
    Signal,
};

type AttachFn = Box<dyn FnOnce(MeterProviderBuilder, MetricReaderOptions) -> MeterProviderBuilder>;

/// A push metric exporter of any type, waiting to be wrapped in its periodic reader.
pub struct ResolvedMetricExporter {
    name: &'static str,
    attach: AttachFn,
}

impl ResolvedMetricExporter {
    pub fn new<E: PushMetricExporter + 'static>(exporter: E) -> Self {
        ResolvedMetricExporter {
            name: std::any::type_name::<E>(),
            attach: Box::new(move |builder, options| {
                let reader = PeriodicReader::builder(exporter)
                    .with_interval(options.export_interval)
                    .build();
                builder.with_reader(reader)
            }),
        }
    }

    /// Type name of the wrapped exporter.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Adds a periodic reader owning this exporter to `builder`.
    pub(crate) fn attach(
        self,
        builder: MeterProviderBuilder,
        options: MetricReaderOptions,
    ) -> MeterProviderBuilder {
        (self.attach)(builder, options)
    }
}

impl fmt::Debug for ResolvedMetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResolvedMetricExporter").field(&self.name).finish()
    }
}

pub type MetricExporterConfig = ExporterConfig<ResolvedMetricExporter>;

/// Builds the metric exporters named by `OTEL_METRICS_EXPORTER`.
pub fn configure_metric_exporters_from_environment(
    factory: Option<&ExporterFactory<ResolvedMetricExporter>>,
) -> Vec<ResolvedMetricExporter> {
    resolve_exporters(Signal::Metrics, factory, build_otlp_metric_exporter)
}

pub fn configure_metric_exporters(config: MetricExporterConfig) -> Vec<ResolvedMetricExporter> {
    match config {
        ExporterConfig::FromEnv(factory) => {
            configure_metric_exporters_from_environment(factory.as_ref())
        }
        ExporterConfig::Exporters(exporters) => exporters,
    }
}

// The periodic reader has no collection timeout, so the export timeout is
// applied to the OTLP request instead.
fn build_otlp_metric_exporter(protocol: OtlpProtocol) -> Option<ResolvedMetricExporter> {
    let timeout = metric_reader_options().export_timeout;
    let builder = opentelemetry_otlp::MetricExporter::builder();
    let exporter = match protocol {
        #[cfg(feature = "grpc-tonic")]
        OtlpProtocol::Grpc => builder.with_tonic().with_timeout(timeout).build(),
        OtlpProtocol::HttpJson => builder
            .with_http()
            .with_protocol(Protocol::HttpJson)
            .with_timeout(timeout)
            .build(),
        _ => builder
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_timeout(timeout)
            .build(),
    };
    match exporter {
        Ok(exporter) => Some(ResolvedMetricExporter::new(exporter)),
        Err(err) => {
            warn_otlp_build_failure(Signal::Metrics, &err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::{OTEL_EXPORTER_OTLP_METRICS_PROTOCOL, OTEL_METRICS_EXPORTER};
    use opentelemetry_sdk::metrics::InMemoryMetricExporter;

    #[test]
    fn otlp_http_json_exporter_is_built() {
        let exporters = temp_env::with_vars(
            [
                (OTEL_METRICS_EXPORTER, Some("otlp")),
                (OTEL_EXPORTER_OTLP_METRICS_PROTOCOL, Some("http/json")),
            ],
            || configure_metric_exporters_from_environment(None),
        );
        assert_eq!(exporters.len(), 1);
        assert!(exporters[0].name().contains("MetricExporter"));
    }

    #[test]
    fn none_mixed_with_factory_name_falls_back_to_otlp() {
        let factory: ExporterFactory<ResolvedMetricExporter> = Box::new(|_| {
            Some(ResolvedMetricExporter::new(
                InMemoryMetricExporter::default(),
            ))
        });
        let exporters = temp_env::with_vars(
            [
                (OTEL_METRICS_EXPORTER, Some("memory,none")),
                (OTEL_EXPORTER_OTLP_METRICS_PROTOCOL, None),
            ],
            || configure_metric_exporters_from_environment(Some(&factory)),
        );
        assert_eq!(exporters.len(), 1);
        assert!(!exporters[0].name().contains("InMemory"));
    }
}
