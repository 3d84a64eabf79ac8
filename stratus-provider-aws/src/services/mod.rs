//! Service packages
//!
//! Each AWS service contributes its resource types and data sources. The
//! provider flattens them into one [`Registry`] at startup.

mod ec2;
mod iam;
mod logs;
pub mod s3;
mod sqs;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use stratus_core::provider::{Diagnostic, ProviderError, ProviderResult};
use stratus_core::registry::{Registered, Registry, RegistryError, ServicePackage};
use stratus_core::resource::{Resource, ResourceId, State, Value};
use stratus_core::schema::{AttributeSchema, ResourceSchema};

use crate::conns::AwsClient;
use crate::convert;

/// CRUD-L for one resource type or data source
#[async_trait]
pub trait ResourceHandler: Registered + Send + Sync {
    /// Finder: `NotFound` when the object does not exist
    async fn read(
        &self,
        client: &AwsClient,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State>;

    /// Re-read an object recorded in state, reconciled with the attributes
    /// recorded for it
    async fn refresh(
        &self,
        client: &AwsClient,
        prior: &State,
        identifier: &str,
    ) -> ProviderResult<State> {
        let state = self.read(client, &prior.id, identifier).await?;
        Ok(convert::settle(
            self.schema(),
            &client.default_tags(),
            state,
            &prior.attributes,
        ))
    }

    async fn create(&self, _client: &AwsClient, _resource: &Resource) -> ProviderResult<State> {
        Err(unsupported(self.type_name(), "create"))
    }

    async fn update(
        &self,
        _client: &AwsClient,
        _id: &ResourceId,
        _identifier: &str,
        _from: &State,
        _to: &Resource,
    ) -> ProviderResult<State> {
        Err(unsupported(self.type_name(), "update"))
    }

    async fn delete(
        &self,
        _client: &AwsClient,
        _id: &ResourceId,
        _identifier: &str,
        _attributes: &HashMap<String, Value>,
    ) -> ProviderResult<()> {
        Err(unsupported(self.type_name(), "delete"))
    }

    async fn list(&self, _client: &AwsClient) -> ProviderResult<Vec<State>> {
        Err(unsupported(self.type_name(), "list"))
    }

    async fn read_data_source(
        &self,
        _client: &AwsClient,
        _resource: &Resource,
    ) -> ProviderResult<State> {
        Err(unsupported(self.type_name(), "read as a data source"))
    }

    /// Checks beyond the schema, such as rules spanning several attributes
    fn validate_config(&self, _resource: &Resource) -> Vec<Diagnostic> {
        Vec::new()
    }
}

pub type Handler = Arc<dyn ResourceHandler>;

fn unsupported(type_name: &str, operation: &str) -> ProviderError {
    ProviderError::unsupported(format!("{} does not support {}", type_name, operation))
}

/// Data source that looks up an object of a resource type by one attribute.
///
/// The lookup attribute is the only input; every other attribute of the
/// resource schema becomes computed.
pub struct LookupDataSource {
    resource: Handler,
    lookup: &'static str,
    schema: ResourceSchema,
}

impl LookupDataSource {
    pub fn new(resource: Handler, lookup: &'static str) -> Self {
        let base = resource.schema();
        let mut schema = ResourceSchema::new(base.resource_type.clone());
        schema.description = base.description.clone();
        for attr in base.attributes.values() {
            let attr = if attr.name == lookup {
                AttributeSchema::new(attr.name.clone(), attr.attr_type.clone())
                    .required()
                    .with_description(format!("{} to look up", attr.name))
            } else {
                let mut computed = attr.clone().computed();
                computed.required = false;
                computed.force_new = false;
                computed.default = None;
                computed.write_only = false;
                computed
            };
            schema = schema.attribute(attr);
        }
        Self {
            resource,
            lookup,
            schema,
        }
    }
}

impl Registered for LookupDataSource {
    fn type_name(&self) -> &str {
        &self.schema.resource_type
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }
}

#[async_trait]
impl ResourceHandler for LookupDataSource {
    async fn read(
        &self,
        client: &AwsClient,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        self.resource.read(client, id, identifier).await
    }

    async fn read_data_source(
        &self,
        client: &AwsClient,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let value = resource.get_str(self.lookup).ok_or_else(|| {
            ProviderError::validation(format!("'{}' must be set to a string", self.lookup))
        })?;
        self.resource
            .read(client, &resource.id, value)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    ProviderError::not_found(format!(
                        "no {} matches {} = '{}'",
                        self.type_name(),
                        self.lookup,
                        value
                    ))
                } else {
                    e
                }
            })
    }
}

pub fn packages() -> Vec<Box<dyn ServicePackage<Handler>>> {
    vec![
        Box::new(ec2::Ec2),
        Box::new(iam::Iam),
        Box::new(logs::Logs),
        Box::new(s3::S3),
        Box::new(sqs::Sqs),
    ]
}

pub fn registry() -> Result<Registry<Handler>, RegistryError> {
    let packages = packages();
    Registry::new(
        packages
            .iter()
            .map(|p| p.as_ref() as &dyn ServicePackage<Handler>),
    )
}
