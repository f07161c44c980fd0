//! Resolution of the [`Resource`] shared by all three providers.

use std::collections::HashMap;
use std::fmt;

use opentelemetry::{Key, KeyValue, Value};
use opentelemetry_sdk::resource::{
    EnvResourceDetector, ResourceDetector, SdkProvidedResourceDetector, TelemetryResourceDetector,
};
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::SERVICE_NAME;

/// Describes how to build a resource from detectors and explicit attributes.
///
/// Sources are applied in this order, each overwriting keys set before it:
///
/// 1. detectors, in the order they were added;
/// 2. explicit attributes;
/// 3. the explicit service name, for `service.name` only.
///
/// A non-empty schema URL reported by a detector replaces the configured one.
#[derive(Default)]
pub struct ResourceSpec {
    service_name: Option<String>,
    attributes: Vec<KeyValue>,
    schema_url: Option<String>,
    detectors: Vec<Box<dyn ResourceDetector>>,
}

impl ResourceSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_attribute(mut self, attribute: KeyValue) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, attributes: T) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn with_schema_url(mut self, schema_url: impl Into<String>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn ResourceDetector>) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Adds the SDK's default detectors: service name (`OTEL_SERVICE_NAME`),
    /// telemetry SDK attributes, then `OTEL_RESOURCE_ATTRIBUTES`.
    pub fn with_standard_detectors(self) -> Self {
        self.with_detector(Box::new(SdkProvidedResourceDetector))
            .with_detector(Box::new(TelemetryResourceDetector))
            .with_detector(Box::new(EnvResourceDetector::new()))
    }
}

impl fmt::Debug for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSpec")
            .field("service_name", &self.service_name)
            .field("attributes", &self.attributes)
            .field("schema_url", &self.schema_url)
            .field("detectors", &self.detectors.len())
            .finish()
    }
}

/// Either a spec to resolve or a resource that is used as is.
#[derive(Debug)]
pub enum ResourceConfig {
    Spec(ResourceSpec),
    Resource(Resource),
}

impl Default for ResourceConfig {
    fn default() -> Self {
        ResourceConfig::Spec(ResourceSpec::default())
    }
}

impl From<ResourceSpec> for ResourceConfig {
    fn from(spec: ResourceSpec) -> Self {
        ResourceConfig::Spec(spec)
    }
}

impl From<Resource> for ResourceConfig {
    fn from(resource: Resource) -> Self {
        ResourceConfig::Resource(resource)
    }
}

impl ResourceConfig {
    pub fn resolve(self) -> Resource {
        match self {
            ResourceConfig::Spec(spec) => configure_resource(&spec),
            ResourceConfig::Resource(resource) => resource,
        }
    }
}

/// Merges detector output, explicit attributes and the service name into one resource.
pub fn configure_resource(spec: &ResourceSpec) -> Resource {
    let mut attributes: HashMap<Key, Value> = HashMap::new();
    let mut schema_url = spec.schema_url.clone();

    for detector in &spec.detectors {
        let detected = detector.detect();
        for (key, value) in detected.iter() {
            attributes.insert(key.clone(), value.clone());
        }
        if let Some(url) = detected.schema_url().filter(|url| !url.is_empty()) {
            schema_url = Some(url.to_owned());
        }
    }

    for attribute in &spec.attributes {
        attributes.insert(attribute.key.clone(), attribute.value.clone());
    }

    if let Some(service_name) = spec.service_name.as_deref().filter(|name| !name.is_empty()) {
        attributes.insert(Key::from_static_str(SERVICE_NAME), service_name.to_owned().into());
    }

    let attributes = attributes
        .into_iter()
        .map(|(key, value)| KeyValue::new(key, value));
    let builder = Resource::builder_empty();
    match schema_url.filter(|url| !url.is_empty()) {
        Some(url) => builder.with_schema_url(attributes, url),
        None => builder.with_attributes(attributes),
    }
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct StaticDetector(Resource);

    impl StaticDetector {
        fn boxed(attributes: Vec<KeyValue>, schema_url: Option<&'static str>) -> Box<Self> {
            let builder = Resource::builder_empty();
            let resource = match schema_url {
                Some(url) => builder.with_schema_url(attributes, url),
                None => builder.with_attributes(attributes),
            }
            .build();
            Box::new(StaticDetector(resource))
        }
    }

    impl ResourceDetector for StaticDetector {
        fn detect(&self) -> Resource {
            self.0.clone()
        }
    }

    fn string_attr(resource: &Resource, key: &'static str) -> Option<String> {
        resource
            .get(&Key::from_static_str(key))
            .map(|value| value.as_str().into_owned())
    }

    #[test]
    fn later_sources_overwrite_earlier_ones() {
        let spec = ResourceSpec::new()
            .with_detector(StaticDetector::boxed(
                vec![
                    KeyValue::new("service.name", "a"),
                    KeyValue::new("region", "x"),
                ],
                None,
            ))
            .with_detector(StaticDetector::boxed(
                vec![KeyValue::new("service.name", "b")],
                None,
            ))
            .with_attribute(KeyValue::new("region", "y"));

        let resource = configure_resource(&spec);

        assert_eq!(string_attr(&resource, "service.name").as_deref(), Some("b"));
        assert_eq!(string_attr(&resource, "region").as_deref(), Some("y"));
        assert_eq!(resource.len(), 2);
    }

    #[test]
    fn explicit_service_name_wins_over_attributes() {
        let spec = ResourceSpec::new()
            .with_detector(StaticDetector::boxed(
                vec![KeyValue::new("service.name", "detected")],
                None,
            ))
            .with_attribute(KeyValue::new("service.name", "attribute"))
            .with_service_name("checkout");

        let resource = configure_resource(&spec);

        assert_eq!(
            string_attr(&resource, "service.name").as_deref(),
            Some("checkout")
        );
    }

    #[test]
    fn empty_service_name_is_ignored() {
        let spec = ResourceSpec::new()
            .with_attribute(KeyValue::new("service.name", "attribute"))
            .with_service_name("");

        let resource = configure_resource(&spec);

        assert_eq!(
            string_attr(&resource, "service.name").as_deref(),
            Some("attribute")
        );
    }

    #[test]
    fn last_non_empty_detector_schema_url_wins() {
        let spec = ResourceSpec::new()
            .with_schema_url("https://example.com/schemas/1.2.0")
            .with_detector(StaticDetector::boxed(
                vec![KeyValue::new("a", 1)],
                Some("https://example.com/first"),
            ))
            .with_detector(StaticDetector::boxed(vec![KeyValue::new("b", 2)], None));

        let resource = configure_resource(&spec);
        assert_eq!(resource.schema_url(), Some("https://example.com/first"));

        let spec = ResourceSpec::new()
            .with_schema_url("https://example.com/schemas/1.2.0")
            .with_detector(StaticDetector::boxed(vec![KeyValue::new("a", 1)], None));
        assert_eq!(
            configure_resource(&spec).schema_url(),
            Some("https://example.com/schemas/1.2.0")
        );
    }

    #[test]
    fn typed_attribute_values_are_kept() {
        let spec = ResourceSpec::new()
            .with_attributes([
                KeyValue::new("flag", true),
                KeyValue::new("count", 3_i64),
                KeyValue::new("ratio", 0.5),
            ]);

        let resource = configure_resource(&spec);

        assert_eq!(resource.get(&Key::from_static_str("flag")), Some(Value::Bool(true)));
        assert_eq!(resource.get(&Key::from_static_str("count")), Some(Value::I64(3)));
        assert_eq!(resource.get(&Key::from_static_str("ratio")), Some(Value::F64(0.5)));
    }

    #[test]
    fn prebuilt_resource_is_used_as_is() {
        let resource = Resource::builder_empty()
            .with_attribute(KeyValue::new("service.name", "prebuilt"))
            .build();

        let resolved = ResourceConfig::Resource(resource.clone()).resolve();

        assert_eq!(resolved, resource);
    }

    #[test]
    fn env_detector_reads_service_name() {
        temp_env::with_vars(
            [
                ("OTEL_SERVICE_NAME", Some("from-env")),
                ("OTEL_RESOURCE_ATTRIBUTES", Some("deployment.environment=test")),
            ],
            || {
                let resource = configure_resource(&ResourceSpec::new().with_standard_detectors());
                assert_eq!(
                    string_attr(&resource, "service.name").as_deref(),
                    Some("from-env")
                );
                assert_eq!(
                    string_attr(&resource, "deployment.environment").as_deref(),
                    Some("test")
                );
                assert!(string_attr(&resource, "telemetry.sdk.name").is_some());
            },
        );
    }
}
