//! Selection of the text map propagators named by `OTEL_PROPAGATORS`.
//!
//! Resolved propagators are combined into one [`TextMapCompositePropagator`].
//! Built-in names are ordered as in the catalog below, whatever their order in
//! the variable. Names resolved by the factory follow, in the order they first
//! appear. Duplicates are ignored.

use std::fmt;

use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::{otel_debug, otel_warn};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_zipkin::B3Encoding;

use crate::env::{get_env, split_and_trim};

/// Comma separated propagator names, or `none`.
pub const OTEL_PROPAGATORS: &str = "OTEL_PROPAGATORS";
/// Propagators used when `OTEL_PROPAGATORS` is unset or invalid.
pub const OTEL_PROPAGATORS_DEFAULT: [&str; 2] = ["tracecontext", "baggage"];

const NONE: &str = "none";
const CATALOG: [&str; 5] = ["tracecontext", "baggage", "b3", "b3multi", "jaeger"];

pub type BoxedPropagator = Box<dyn TextMapPropagator + Send + Sync>;

/// Builds a propagator for a name outside the built-in catalog.
pub type PropagatorFactory = Box<dyn Fn(&str) -> Option<BoxedPropagator>>;

/// Where the process-wide propagator comes from.
pub enum PropagatorConfig {
    /// Read `OTEL_PROPAGATORS`, asking the factory about unknown names.
    FromEnv(Option<PropagatorFactory>),
    /// Use this propagator and never read the environment.
    Propagator(BoxedPropagator),
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        PropagatorConfig::FromEnv(None)
    }
}

impl PropagatorConfig {
    pub fn from_env_with_factory<F>(factory: F) -> Self
    where
        F: Fn(&str) -> Option<BoxedPropagator> + 'static,
    {
        PropagatorConfig::FromEnv(Some(Box::new(factory)))
    }

    pub fn propagator<P: TextMapPropagator + Send + Sync + 'static>(propagator: P) -> Self {
        PropagatorConfig::Propagator(Box::new(propagator))
    }

    pub fn resolve(self) -> BoxedPropagator {
        match self {
            PropagatorConfig::FromEnv(factory) => {
                Box::new(configure_propagators_from_environment(factory.as_ref()))
            }
            PropagatorConfig::Propagator(propagator) => propagator,
        }
    }
}

impl fmt::Debug for PropagatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropagatorConfig::FromEnv(factory) => f
                .debug_struct("FromEnv")
                .field("factory", &factory.is_some())
                .finish(),
            PropagatorConfig::Propagator(propagator) => {
                f.debug_tuple("Propagator").field(propagator).finish()
            }
        }
    }
}

/// Looks a propagator up in the built-in catalog.
pub fn builtin_propagator(name: &str) -> Option<BoxedPropagator> {
    let propagator: BoxedPropagator = match name {
        "tracecontext" => Box::new(TraceContextPropagator::new()),
        "baggage" => Box::new(BaggagePropagator::new()),
        "b3" => Box::new(opentelemetry_zipkin::Propagator::with_encoding(
            B3Encoding::SingleHeader,
        )),
        "b3multi" => Box::new(opentelemetry_zipkin::Propagator::with_encoding(
            B3Encoding::MultipleHeader,
        )),
        "jaeger" => Box::new(opentelemetry_jaeger_propagator::Propagator::new()),
        _ => return None,
    };
    Some(propagator)
}

/// Reads `OTEL_PROPAGATORS` into a duplicate free, ordered list of names.
///
/// * unset or blank: `tracecontext`, `baggage`;
/// * exactly `none`: no propagator at all;
/// * `none` next to other names: the default list.
pub fn propagator_names_from_environment() -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in split_and_trim(&get_env(OTEL_PROPAGATORS).unwrap_or_default()) {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    if names.is_empty() {
        return default_names();
    }
    if names.len() == 1 && names[0] == NONE {
        return Vec::new();
    }
    if names.iter().any(|name| name == NONE) {
        otel_warn!(
            name: "PropagatorSelection.NoneWithOthers",
            env_var = OTEL_PROPAGATORS,
            message = "Propagator list contains \"none\" and other propagators, using the default propagators"
        );
        return default_names();
    }

    // Stable sort: catalog names by catalog position, the others keep their order after them.
    names.sort_by_key(|name| {
        CATALOG
            .iter()
            .position(|known| *known == name.as_str())
            .unwrap_or(CATALOG.len())
    });
    names
}

fn default_names() -> Vec<String> {
    OTEL_PROPAGATORS_DEFAULT
        .iter()
        .map(|name| (*name).to_owned())
        .collect()
}

/// Builds the composite propagator for `OTEL_PROPAGATORS`. Names that neither
/// the catalog nor the factory know are dropped with a warning.
pub fn configure_propagators_from_environment(
    factory: Option<&PropagatorFactory>,
) -> TextMapCompositePropagator {
    let mut propagators = Vec::new();
    for name in propagator_names_from_environment() {
        let propagator =
            builtin_propagator(&name).or_else(|| factory.and_then(|factory| factory(&name)));
        match propagator {
            Some(propagator) => {
                otel_debug!(name: "PropagatorSelection.Resolved", propagator = name.as_str());
                propagators.push(propagator);
            }
            None => {
                otel_warn!(
                    name: "PropagatorSelection.Unrecognized",
                    env_var = OTEL_PROPAGATORS,
                    value = name.as_str(),
                    message = "Unrecognized propagator, ignoring"
                );
            }
        }
    }
    TextMapCompositePropagator::new(propagators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };
    use opentelemetry::Context;
    use std::collections::{HashMap, HashSet};

    fn names_with(value: Option<&str>) -> Vec<String> {
        temp_env::with_var(OTEL_PROPAGATORS, value, propagator_names_from_environment)
    }

    fn fields(propagator: &dyn TextMapPropagator) -> HashSet<String> {
        propagator.fields().map(str::to_owned).collect()
    }

    fn sampled_context() -> Context {
        Context::new().with_remote_span_context(SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        ))
    }

    #[test]
    fn unset_yields_tracecontext_and_baggage() {
        assert_eq!(names_with(None), vec!["tracecontext", "baggage"]);
        assert_eq!(names_with(Some(" ")), vec!["tracecontext", "baggage"]);

        let propagator = temp_env::with_var_unset(OTEL_PROPAGATORS, || {
            configure_propagators_from_environment(None)
        });
        let expected: HashSet<String> = ["traceparent", "tracestate", "baggage"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        assert_eq!(fields(&propagator), expected);
    }

    #[test]
    fn none_yields_an_empty_composite() {
        assert!(names_with(Some("none")).is_empty());
        assert!(names_with(Some("none,none")).is_empty());

        let propagator = temp_env::with_var(OTEL_PROPAGATORS, Some("none"), || {
            configure_propagators_from_environment(None)
        });
        assert_eq!(propagator.fields().count(), 0);

        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject_context(&sampled_context(), &mut carrier);
        assert!(carrier.is_empty());
    }

    #[test]
    fn none_mixed_with_others_uses_defaults() {
        assert_eq!(names_with(Some("b3,none")), vec!["tracecontext", "baggage"]);
    }

    #[test]
    fn builtins_follow_catalog_order() {
        assert_eq!(
            names_with(Some("jaeger,b3,baggage,tracecontext,b3")),
            vec!["tracecontext", "baggage", "b3", "jaeger"]
        );
        assert_eq!(
            names_with(Some("xray,b3multi,custom,xray")),
            vec!["b3multi", "xray", "custom"]
        );
    }

    #[test]
    fn unknown_names_use_the_factory_or_are_dropped() {
        let factory: PropagatorFactory = Box::new(|name: &str| -> Option<BoxedPropagator> {
            match name {
                "custom" => Some(Box::new(opentelemetry_jaeger_propagator::Propagator::new())),
                _ => None,
            }
        });
        let propagator = temp_env::with_var(OTEL_PROPAGATORS, Some("custom,xray,b3"), || {
            configure_propagators_from_environment(Some(&factory))
        });
        let expected: HashSet<String> = ["b3", "uber-trace-id"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        assert_eq!(fields(&propagator), expected);
    }

    #[test]
    fn composite_injects_with_every_child() {
        let propagator = temp_env::with_var(OTEL_PROPAGATORS, Some("tracecontext,b3multi"), || {
            configure_propagators_from_environment(None)
        });
        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject_context(&sampled_context(), &mut carrier);

        assert_eq!(
            carrier.get("traceparent").map(String::as_str),
            Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
        );
        assert_eq!(
            carrier.get("x-b3-traceid").map(String::as_str),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );
    }

    #[test]
    fn explicit_propagator_skips_the_environment() {
        let propagator = temp_env::with_var(OTEL_PROPAGATORS, Some("none"), || {
            PropagatorConfig::propagator(TraceContextPropagator::new()).resolve()
        });
        assert!(fields(propagator.as_ref()).contains("traceparent"));
    }
}
