//! Holder of the process-wide tracer, meter and logger providers and propagator.
//!
//! Every `set_*` call replaces the stored value and returns the previous one;
//! the last writer wins. Installation is not atomic across the four slots, so
//! configuration must finish before the rest of the process starts emitting
//! telemetry.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use opentelemetry::propagation::text_map_propagator::FieldIter;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::{global, Context};
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::propagation::BoxedPropagator;

/// A propagator that can be handed out to several owners.
#[derive(Clone, Debug)]
pub struct SharedPropagator(Arc<dyn TextMapPropagator + Send + Sync>);

impl From<BoxedPropagator> for SharedPropagator {
    fn from(propagator: BoxedPropagator) -> Self {
        SharedPropagator(Arc::from(propagator))
    }
}

impl TextMapPropagator for SharedPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        self.0.inject_context(cx, injector)
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.0.extract_with_context(cx, extractor)
    }

    fn fields(&self) -> FieldIter<'_> {
        self.0.fields()
    }
}

#[derive(Debug, Default)]
pub struct TelemetryRegistry {
    tracer_provider: RwLock<Option<SdkTracerProvider>>,
    meter_provider: RwLock<Option<SdkMeterProvider>>,
    logger_provider: RwLock<Option<SdkLoggerProvider>>,
    propagator: RwLock<Option<SharedPropagator>>,
    publish_globally: bool,
}

static GLOBAL_REGISTRY: OnceLock<TelemetryRegistry> = OnceLock::new();

fn replace<T>(slot: &RwLock<Option<T>>, value: T) -> Option<T> {
    slot.write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(value)
}

fn get<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn take<T>(slot: &RwLock<Option<T>>) -> Option<T> {
    slot.write().unwrap_or_else(PoisonError::into_inner).take()
}

impl TelemetryRegistry {
    /// A registry that is not visible through [`opentelemetry::global`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The process registry. Tracer provider, meter provider and propagator
    /// set here are also installed in [`opentelemetry::global`]. The API has
    /// no global logger provider, so that one is only held here.
    pub fn global() -> &'static TelemetryRegistry {
        GLOBAL_REGISTRY.get_or_init(|| TelemetryRegistry {
            publish_globally: true,
            ..TelemetryRegistry::default()
        })
    }

    pub fn set_tracer_provider(&self, provider: SdkTracerProvider) -> Option<SdkTracerProvider> {
        if self.publish_globally {
            global::set_tracer_provider(provider.clone());
        }
        replace(&self.tracer_provider, provider)
    }

    pub fn tracer_provider(&self) -> Option<SdkTracerProvider> {
        get(&self.tracer_provider)
    }

    pub fn set_meter_provider(&self, provider: SdkMeterProvider) -> Option<SdkMeterProvider> {
        if self.publish_globally {
            global::set_meter_provider(provider.clone());
        }
        replace(&self.meter_provider, provider)
    }

    pub fn meter_provider(&self) -> Option<SdkMeterProvider> {
        get(&self.meter_provider)
    }

    pub fn set_logger_provider(&self, provider: SdkLoggerProvider) -> Option<SdkLoggerProvider> {
        replace(&self.logger_provider, provider)
    }

    pub fn logger_provider(&self) -> Option<SdkLoggerProvider> {
        get(&self.logger_provider)
    }

    pub fn set_propagator(
        &self,
        propagator: impl Into<SharedPropagator>,
    ) -> Option<SharedPropagator> {
        let propagator = propagator.into();
        if self.publish_globally {
            global::set_text_map_propagator(propagator.clone());
        }
        replace(&self.propagator, propagator)
    }

    pub fn propagator(&self) -> Option<SharedPropagator> {
        get(&self.propagator)
    }

    /// Removes and shuts down every provider, reporting the first failure.
    pub fn shutdown(&self) -> OTelSdkResult {
        let mut results: Vec<Result<(), OTelSdkError>> = Vec::new();
        if let Some(provider) = take(&self.tracer_provider) {
            results.push(provider.shutdown());
        }
        if let Some(provider) = take(&self.meter_provider) {
            results.push(provider.shutdown());
        }
        if let Some(provider) = take(&self.logger_provider) {
            results.push(provider.shutdown());
        }
        take(&self.propagator);
        results.into_iter().collect()
    }
}
