//! AWS Provider
//!
//! Dispatches each operation to the handler registered for the resource type.

use std::collections::HashMap;

use log::debug;
use stratus_core::config::ProviderConfig;
use stratus_core::finder::{found_or_state, ignore_not_found};
use stratus_core::provider::{BoxFuture, Diagnostic, Provider, ProviderError, ProviderResult};
use stratus_core::registry::{Registered, Registry};
use stratus_core::resource::{Resource, ResourceId, State, Value};
use stratus_core::schema::ResourceSchema;

use crate::conns::AwsClient;
use crate::services::{self, Handler};

pub struct AwsProvider {
    client: AwsClient,
    registry: Registry<Handler>,
}

impl AwsProvider {
    /// Create a new AWS Provider from a provider configuration
    pub async fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let client = AwsClient::connect(config).await?;
        Self::with_client(client)
    }

    /// Create with a prepared client (for testing)
    pub fn with_client(client: AwsClient) -> ProviderResult<Self> {
        let registry = services::registry().map_err(|e| ProviderError::new(e.to_string()))?;
        Ok(Self { client, registry })
    }

    pub fn client(&self) -> &AwsClient {
        &self.client
    }

    fn resource(&self, resource_type: &str) -> ProviderResult<&Handler> {
        self.registry.resource(resource_type).ok_or_else(|| {
            ProviderError::unsupported(format!("unknown resource type '{}'", resource_type))
        })
    }

    fn data_source(&self, data_source_type: &str) -> ProviderResult<&Handler> {
        self.registry.data_source(data_source_type).ok_or_else(|| {
            ProviderError::unsupported(format!("unknown data source type '{}'", data_source_type))
        })
    }

    /// Reject a configuration that fails validation before any API call
    fn check(&self, resource: &Resource) -> ProviderResult<()> {
        let errors: Vec<String> = self
            .validate_resource_config(resource)
            .into_iter()
            .filter(Diagnostic::is_error)
            .map(|d| d.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::validation(errors.join("; ")))
        }
    }
}

impl Provider for AwsProvider {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn resource_types(&self) -> Vec<String> {
        self.registry.resource_types()
    }

    fn data_source_types(&self) -> Vec<String> {
        self.registry.data_source_types()
    }

    fn schema(&self, resource_type: &str) -> Option<ResourceSchema> {
        self.registry
            .resource(resource_type)
            .map(|h| h.schema().clone())
    }

    fn data_source_schema(&self, data_source_type: &str) -> Option<ResourceSchema> {
        self.registry
            .data_source(data_source_type)
            .map(|h| h.schema().clone())
    }

    fn validate_resource_config(&self, resource: &Resource) -> Vec<Diagnostic> {
        let type_name = &resource.id.resource_type;
        let handler = if resource.is_data_source() {
            self.registry.data_source(type_name)
        } else {
            self.registry.resource(type_name)
        };
        let Some(handler) = handler else {
            let kind = if resource.is_data_source() {
                "data source"
            } else {
                "resource"
            };
            return vec![Diagnostic::error(format!("unknown {} type '{}'", kind, type_name))];
        };

        let mut diagnostics: Vec<Diagnostic> = match handler.schema().validate(&resource.attributes)
        {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .into_iter()
                .map(|e| Diagnostic::error(format!("{}: {}", resource.id, e)))
                .collect(),
        };
        diagnostics.extend(handler.validate_config(resource));
        diagnostics
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            debug!("reading {} ({})", id, identifier);
            let handler = self.resource(&id.resource_type)?;
            let result = handler.read(&self.client, &id, &identifier).await;
            found_or_state(&id, result).map_err(|e| e.for_resource(id.clone()))
        })
    }

    fn refresh(&self, prior: &State) -> BoxFuture<'_, ProviderResult<State>> {
        let prior = prior.clone();
        Box::pin(async move {
            let id = prior.id.clone();
            let identifier = prior.identifier.clone().ok_or_else(|| {
                ProviderError::validation("no cloud identifier recorded").for_resource(id.clone())
            })?;
            debug!("refreshing {} ({})", id, identifier);
            let handler = self.resource(&id.resource_type)?;
            let result = handler.refresh(&self.client, &prior, &identifier).await;
            found_or_state(&id, result).map_err(|e| e.for_resource(id.clone()))
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            debug!("creating {}", resource.id);
            let handler = self.resource(&resource.id.resource_type)?;
            self.check(&resource)
                .map_err(|e| e.for_resource(resource.id.clone()))?;
            handler
                .create(&self.client, &resource)
                .await
                .map_err(|e| e.for_resource(resource.id.clone()))
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            debug!("updating {} ({})", id, identifier);
            let handler = self.resource(&id.resource_type)?;
            self.check(&to).map_err(|e| e.for_resource(id.clone()))?;
            handler
                .update(&self.client, &id, &identifier, &from, &to)
                .await
                .map_err(|e| e.for_resource(id.clone()))
        })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        attributes: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let attributes = attributes.clone();
        Box::pin(async move {
            debug!("deleting {} ({})", id, identifier);
            let handler = self.resource(&id.resource_type)?;
            let result = handler
                .delete(&self.client, &id, &identifier, &attributes)
                .await;
            ignore_not_found(result).map_err(|e| e.for_resource(id.clone()))
        })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            debug!("reading data source {}", resource.id);
            let handler = self.data_source(&resource.id.resource_type)?;
            self.check(&resource)
                .map_err(|e| e.for_resource(resource.id.clone()))?;
            handler
                .read_data_source(&self.client, &resource)
                .await
                .map_err(|e| e.for_resource(resource.id.clone()))
        })
    }

    fn list(&self, resource_type: &str) -> BoxFuture<'_, ProviderResult<Vec<State>>> {
        let resource_type = resource_type.to_string();
        Box::pin(async move {
            debug!("listing {}", resource_type);
            self.resource(&resource_type)?.list(&self.client).await
        })
    }
}
