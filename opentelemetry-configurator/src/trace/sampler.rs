use std::fmt;

use opentelemetry::trace::{Link, SamplingResult, SpanKind, TraceId};
use opentelemetry::{otel_debug, otel_warn, Context, KeyValue};
use opentelemetry_sdk::trace::{Sampler, ShouldSample};

use crate::env::{get_env_double, get_env_non_empty, trim};

/// Name of the sampler to use.
pub const OTEL_TRACES_SAMPLER: &str = "OTEL_TRACES_SAMPLER";
/// Argument of the sampler, read by the ratio based samplers only.
pub const OTEL_TRACES_SAMPLER_ARG: &str = "OTEL_TRACES_SAMPLER_ARG";
/// Sampler used when none is named or the name is not recognized.
pub const OTEL_TRACES_SAMPLER_DEFAULT: &str = "parentbased_always_on";
/// Ratio used when `OTEL_TRACES_SAMPLER_ARG` is unset or invalid.
pub const OTEL_TRACES_SAMPLER_ARG_DEFAULT: f64 = 1.0;

/// Builds a sampler for a name outside the built-in catalog.
pub type SamplerFactory = Box<dyn Fn(&str) -> Option<Box<dyn ShouldSample>>>;

/// Where the tracer provider's sampler comes from.
pub enum SamplerConfig {
    /// Read `OTEL_TRACES_SAMPLER`, asking the factory about unknown names.
    FromEnv(Option<SamplerFactory>),
    /// Use this sampler and never read the environment.
    Sampler(Box<dyn ShouldSample>),
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig::FromEnv(None)
    }
}

impl SamplerConfig {
    pub fn from_env_with_factory<F>(factory: F) -> Self
    where
        F: Fn(&str) -> Option<Box<dyn ShouldSample>> + 'static,
    {
        SamplerConfig::FromEnv(Some(Box::new(factory)))
    }

    pub fn sampler<S: ShouldSample + 'static>(sampler: S) -> Self {
        SamplerConfig::Sampler(Box::new(sampler))
    }

    /// Resolves the sampler, reading the environment only for [`SamplerConfig::FromEnv`].
    pub fn resolve(self) -> ResolvedSampler {
        match self {
            SamplerConfig::FromEnv(factory) => {
                configure_tracing_sampler_from_environment(factory.as_ref())
            }
            SamplerConfig::Sampler(sampler) => ResolvedSampler(sampler),
        }
    }
}

impl fmt::Debug for SamplerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerConfig::FromEnv(factory) => f
                .debug_struct("FromEnv")
                .field("factory", &factory.is_some())
                .finish(),
            SamplerConfig::Sampler(sampler) => f.debug_tuple("Sampler").field(sampler).finish(),
        }
    }
}

/// A sampler chosen at configuration time.
#[derive(Clone, Debug)]
pub struct ResolvedSampler(Box<dyn ShouldSample>);

impl ShouldSample for ResolvedSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        self.0
            .should_sample(parent_context, trace_id, name, span_kind, attributes, links)
    }
}

/// Looks a sampler up in the built-in catalog.
pub fn builtin_sampler(name: &str) -> Option<Sampler> {
    let sampler = match name {
        "always_on" => Sampler::AlwaysOn,
        "always_off" => Sampler::AlwaysOff,
        "traceidratio" => Sampler::TraceIdRatioBased(sampler_ratio_from_environment()),
        "parentbased_always_on" => Sampler::ParentBased(Box::new(Sampler::AlwaysOn)),
        "parentbased_always_off" => Sampler::ParentBased(Box::new(Sampler::AlwaysOff)),
        "parentbased_traceidratio" => Sampler::ParentBased(Box::new(
            Sampler::TraceIdRatioBased(sampler_ratio_from_environment()),
        )),
        _ => return None,
    };
    Some(sampler)
}

fn sampler_ratio_from_environment() -> f64 {
    get_env_double(
        OTEL_TRACES_SAMPLER_ARG,
        OTEL_TRACES_SAMPLER_ARG_DEFAULT,
        0.0,
        1.0,
    )
}

fn default_sampler() -> ResolvedSampler {
    ResolvedSampler(Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn))))
}

/// Picks the sampler named by `OTEL_TRACES_SAMPLER`.
///
/// The built-in catalog is consulted first, then the factory. Unset and
/// unrecognized names both yield `parentbased_always_on`.
pub fn configure_tracing_sampler_from_environment(
    factory: Option<&SamplerFactory>,
) -> ResolvedSampler {
    let Some(name) = get_env_non_empty(OTEL_TRACES_SAMPLER) else {
        return default_sampler();
    };
    let name = trim(&name);

    if let Some(sampler) = builtin_sampler(name) {
        otel_debug!(name: "Sampler.Resolved", sampler = name);
        return ResolvedSampler(Box::new(sampler));
    }
    if let Some(sampler) = factory.and_then(|factory| factory(name)) {
        otel_debug!(name: "Sampler.ResolvedByFactory", sampler = name);
        return ResolvedSampler(sampler);
    }

    otel_warn!(
        name: "Sampler.Unrecognized",
        env_var = OTEL_TRACES_SAMPLER,
        value = name,
        message = "Unrecognized sampler, using parentbased_always_on"
    );
    default_sampler()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::SamplingDecision;

    fn decision(sampler: &ResolvedSampler, trace_id: TraceId) -> SamplingDecision {
        sampler
            .should_sample(None, trace_id, "root", &SpanKind::Internal, &[], &[])
            .decision
    }

    fn sampler_with(name: Option<&str>, arg: Option<&str>) -> ResolvedSampler {
        temp_env::with_vars(
            [(OTEL_TRACES_SAMPLER, name), (OTEL_TRACES_SAMPLER_ARG, arg)],
            || configure_tracing_sampler_from_environment(None),
        )
    }

    #[test]
    fn parent_based_ratio_samples_half_of_root_spans() {
        let sampler = sampler_with(Some("parentbased_traceidratio"), Some("0.5"));

        let debug = format!("{sampler:?}");
        assert!(debug.contains("ParentBased"), "{debug}");
        assert!(debug.contains("TraceIdRatioBased(0.5)"), "{debug}");

        // The ratio sampler compares the low 63 bits of the trace id against ratio * 2^63.
        assert_eq!(
            decision(&sampler, TraceId::from_bytes([0; 16])),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(
            decision(&sampler, TraceId::from_bytes([0xff; 16])),
            SamplingDecision::Drop
        );
    }

    #[test]
    fn ratio_outside_range_uses_default() {
        let sampler = sampler_with(Some("traceidratio"), Some("1.5"));
        assert!(format!("{sampler:?}").contains("TraceIdRatioBased(1.0)"));
        let sampler = sampler_with(Some("traceidratio"), None);
        assert!(format!("{sampler:?}").contains("TraceIdRatioBased(1.0)"));
    }

    #[test]
    fn unset_and_unknown_names_use_parent_based_always_on() {
        for name in [None, Some(""), Some("sometimes")] {
            let sampler = sampler_with(name, None);
            assert_eq!(
                format!("{sampler:?}"),
                "ResolvedSampler(ParentBased(AlwaysOn))",
                "{name:?}"
            );
        }
    }

    #[test]
    fn always_off_drops_everything() {
        let sampler = sampler_with(Some("always_off"), None);
        assert_eq!(
            decision(&sampler, TraceId::from_bytes([0; 16])),
            SamplingDecision::Drop
        );
    }

    #[test]
    fn factory_is_asked_after_the_catalog() {
        let factory: SamplerFactory = Box::new(|name: &str| -> Option<Box<dyn ShouldSample>> {
            match name {
                "custom" | "always_on" => Some(Box::new(Sampler::AlwaysOff)),
                _ => None,
            }
        });

        let custom = temp_env::with_var(OTEL_TRACES_SAMPLER, Some("custom"), || {
            configure_tracing_sampler_from_environment(Some(&factory))
        });
        assert_eq!(format!("{custom:?}"), "ResolvedSampler(AlwaysOff)");

        let builtin = temp_env::with_var(OTEL_TRACES_SAMPLER, Some("always_on"), || {
            configure_tracing_sampler_from_environment(Some(&factory))
        });
        assert_eq!(format!("{builtin:?}"), "ResolvedSampler(AlwaysOn)");
    }

    #[test]
    fn explicit_sampler_skips_the_environment() {
        let sampler = temp_env::with_var(OTEL_TRACES_SAMPLER, Some("always_on"), || {
            SamplerConfig::sampler(Sampler::AlwaysOff).resolve()
        });
        assert_eq!(format!("{sampler:?}"), "ResolvedSampler(AlwaysOff)");
    }
}
