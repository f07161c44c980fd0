use std::fmt;

use opentelemetry_otlp::{Protocol, WithExportConfig as _};
use opentelemetry_sdk::logs::{LogExporter, LoggerProviderBuilder};

use super::batch_log_processor;
use crate::exporter::{
    resolve_exporters, warn_otlp_build_failure, ExporterConfig, ExporterFactory, OtlpProtocol,
    Signal,
};
use crate::processor::BatchOptions;

type AttachFn = Box<dyn FnOnce(LoggerProviderBuilder, BatchOptions) -> LoggerProviderBuilder>;

/// A log exporter of any type, waiting to be wrapped in its batch processor.
pub struct ResolvedLogExporter {
    name: &'static str,
    attach: AttachFn,
}

impl ResolvedLogExporter {
    pub fn new<E: LogExporter + 'static>(exporter: E) -> Self {
        ResolvedLogExporter {
            name: std::any::type_name::<E>(),
            attach: Box::new(move |builder, options| {
                builder.with_log_processor(batch_log_processor(exporter, options))
            }),
        }
    }

    /// Type name of the wrapped exporter.
    pub fn name(&self) -> &str {
        self.name
    }

    pub(crate) fn attach(
        self,
        builder: LoggerProviderBuilder,
        options: BatchOptions,
    ) -> LoggerProviderBuilder {
        (self.attach)(builder, options)
    }
}

impl fmt::Debug for ResolvedLogExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResolvedLogExporter").field(&self.name).finish()
    }
}

pub type LogExporterConfig = ExporterConfig<ResolvedLogExporter>;

/// Builds the log exporters named by `OTEL_LOGS_EXPORTER`.
pub fn configure_log_exporters_from_environment(
    factory: Option<&ExporterFactory<ResolvedLogExporter>>,
) -> Vec<ResolvedLogExporter> {
    resolve_exporters(Signal::Logs, factory, build_otlp_log_exporter)
}

pub fn configure_log_exporters(config: LogExporterConfig) -> Vec<ResolvedLogExporter> {
    match config {
        ExporterConfig::FromEnv(factory) => {
            configure_log_exporters_from_environment(factory.as_ref())
        }
        ExporterConfig::Exporters(exporters) => exporters,
    }
}

fn build_otlp_log_exporter(protocol: OtlpProtocol) -> Option<ResolvedLogExporter> {
    let builder = opentelemetry_otlp::LogExporter::builder();
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
        Ok(exporter) => Some(ResolvedLogExporter::new(exporter)),
        Err(err) => {
            warn_otlp_build_failure(Signal::Logs, &err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::{
        OTEL_EXPORTER_OTLP_LOGS_PROTOCOL, OTEL_EXPORTER_OTLP_PROTOCOL, OTEL_LOGS_EXPORTER,
    };

    #[test]
    fn unrecognized_protocol_falls_back_to_http() {
        let exporters = temp_env::with_vars(
            [
                (OTEL_LOGS_EXPORTER, None),
                (OTEL_EXPORTER_OTLP_LOGS_PROTOCOL, None),
                (OTEL_EXPORTER_OTLP_PROTOCOL, Some("udp")),
            ],
            || configure_log_exporters_from_environment(None),
        );
        assert_eq!(exporters.len(), 1);
    }

    #[cfg(feature = "grpc-tonic")]
    #[tokio::test]
    async fn generic_grpc_protocol_builds_tonic_exporter() {
        let exporters = temp_env::with_vars(
            [
                (OTEL_LOGS_EXPORTER, Some("otlp,otlp")),
                (OTEL_EXPORTER_OTLP_LOGS_PROTOCOL, None),
                (OTEL_EXPORTER_OTLP_PROTOCOL, Some("grpc")),
            ],
            || configure_log_exporters_from_environment(None),
        );
        assert_eq!(exporters.len(), 2);
    }
}
