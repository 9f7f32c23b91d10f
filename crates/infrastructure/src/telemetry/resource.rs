//! Service identity attached to every exported signal

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};

use super::config::TelemetryConfig;

/// Resource key for the deployment environment
pub const DEPLOYMENT_ENVIRONMENT_NAME: &str = "deployment.environment.name";

/// Immutable service metadata shared by the tracer and meter providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity {
    service_name: String,
    service_version: String,
    environment: Option<String>,
    attributes: Vec<(String, String)>,
}

impl ResourceIdentity {
    /// Create an identity from a service name and version
    pub fn new(service_name: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            environment: None,
            attributes: Vec::new(),
        }
    }

    /// Build the identity described by a telemetry configuration
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            service_name: config.service_name.clone(),
            service_version: config.service_version.clone(),
            environment: config.environment.clone(),
            attributes: config.resource_attributes.clone(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_version(&self) -> &str {
        &self.service_version
    }

    /// Every attribute of the identity, service name first
    pub fn key_values(&self) -> Vec<KeyValue> {
        let mut attributes = vec![
            KeyValue::new(SERVICE_NAME, self.service_name.clone()),
            KeyValue::new(SERVICE_VERSION, self.service_version.clone()),
        ];

        if let Some(ref environment) = self.environment {
            attributes.push(KeyValue::new(
                DEPLOYMENT_ENVIRONMENT_NAME,
                environment.clone(),
            ));
        }

        attributes.extend(
            self.attributes
                .iter()
                .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
        );

        attributes
    }

    /// Convert into an SDK resource
    ///
    /// Explicit attributes win over anything the SDK detects from the
    /// environment (`OTEL_SERVICE_NAME`, `OTEL_RESOURCE_ATTRIBUTES`).
    pub fn to_resource(&self) -> Resource {
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes(self.key_values())
            .build()
    }
}
