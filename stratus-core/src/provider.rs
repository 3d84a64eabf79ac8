//! Provider - Trait abstracting resource operations
//!
//! A Provider is what the host engine drives. It converts desired state into
//! cloud API calls and reports the resulting state back.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Category of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The object does not exist (read/delete treat this as absence)
    NotFound,
    /// Throttling or a transient service fault; safe to retry
    Retryable,
    /// A waiter or retry loop ran out of time
    Timeout,
    /// Configuration rejected before any call was made
    Validation,
    /// Operation not supported for this resource type
    Unsupported,
    /// Any other API failure
    Api,
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Api, message)
    }

    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::NotFound, message)
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Retryable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Timeout, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Validation, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Unsupported, message)
    }

    /// Attach the resource this error is about. The first resource wins.
    pub fn for_resource(mut self, id: ResourceId) -> Self {
        if self.resource_id.is_none() {
            self.resource_id = Some(id);
        }
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Prefix the message with the operation that failed
    pub fn context(mut self, operation: impl fmt::Display) -> Self {
        self.message = format!("{}: {}", operation, self.message);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Retryable
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Severity of a diagnostic reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Diagnostic returned to the host engine
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: Option<String>,
    /// Attribute the diagnostic refers to, if any
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(summary)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.summary)?;
        if let Some(attr) = &self.attribute {
            write!(f, " (attribute '{}')", attr)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\n  {}", detail)?;
        }
        Ok(())
    }
}

impl From<&ProviderError> for Diagnostic {
    fn from(err: &ProviderError) -> Self {
        let summary = match &err.resource_id {
            Some(id) => format!("{} failed", id),
            None => "provider operation failed".to_string(),
        };
        let mut detail = err.message.clone();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            detail.push_str(&format!(": {}", cause));
            source = cause.source();
        }
        Diagnostic::error(summary).with_detail(detail)
    }
}

/// Main Provider trait
///
/// All operations are async and involve side effects. Implementations must be
/// safe to call concurrently for independent resource instances.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "aws")
    fn name(&self) -> &'static str;

    /// Resource types this Provider manages
    fn resource_types(&self) -> Vec<String>;

    /// Data source types this Provider can read
    fn data_source_types(&self) -> Vec<String>;

    /// Schema of a resource type
    fn schema(&self, resource_type: &str) -> Option<ResourceSchema>;

    /// Schema of a data source
    fn data_source_schema(&self, _data_source_type: &str) -> Option<ResourceSchema> {
        None
    }

    /// Validate a configuration without touching the cloud
    fn validate_resource_config(&self, resource: &Resource) -> Vec<Diagnostic> {
        let schema = if resource.is_data_source() {
            self.data_source_schema(&resource.id.resource_type)
        } else {
            self.schema(&resource.id.resource_type)
        };
        let Some(schema) = schema else {
            let kind = if resource.is_data_source() {
                "data source"
            } else {
                "resource"
            };
            return vec![Diagnostic::error(format!(
                "unknown {} type '{}'",
                kind, resource.id.resource_type
            ))];
        };
        match schema.validate(&resource.attributes) {
            Ok(()) => vec![],
            Err(errors) => errors
                .into_iter()
                .map(|e| Diagnostic::error(format!("{}: {}", resource.id, e)))
                .collect(),
        }
    }

    /// Get the current state of a resource
    ///
    /// Returns `State::not_found()` if the resource does not exist.
    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource. The returned State carries the cloud identifier.
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource. Deleting something already gone succeeds.
    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        attributes: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<()>>;

    /// Bring an existing cloud object under management
    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            let state = self.read(&id, &identifier).await?;
            if state.exists {
                Ok(state)
            } else {
                Err(ProviderError::not_found(format!(
                    "cannot import non-existent remote object '{}'",
                    identifier
                ))
                .for_resource(id))
            }
        })
    }

    /// Re-read an object recorded in state.
    ///
    /// Attributes marked `write_only` in the schema keep their recorded
    /// values. Returns `State::not_found()` if the object is gone.
    fn refresh(&self, prior: &State) -> BoxFuture<'_, ProviderResult<State>> {
        let prior = prior.clone();
        Box::pin(async move {
            let Some(identifier) = prior.identifier.as_deref() else {
                return Err(ProviderError::validation(format!(
                    "{} has no cloud identifier",
                    prior.id
                )));
            };
            let mut state = self.read(&prior.id, identifier).await?;
            if state.exists
                && let Some(schema) = self.schema(&prior.id.resource_type)
            {
                schema.carry_write_only(&prior.attributes, &mut state.attributes);
            }
            Ok(state)
        })
    }

    /// Read a data source
    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Enumerate every instance of a resource type in the configured region
    fn list(&self, resource_type: &str) -> BoxFuture<'_, ProviderResult<Vec<State>>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<String> {
        (**self).resource_types()
    }

    fn data_source_types(&self) -> Vec<String> {
        (**self).data_source_types()
    }

    fn schema(&self, resource_type: &str) -> Option<ResourceSchema> {
        (**self).schema(resource_type)
    }

    fn data_source_schema(&self, data_source_type: &str) -> Option<ResourceSchema> {
        (**self).data_source_schema(data_source_type)
    }

    fn validate_resource_config(&self, resource: &Resource) -> Vec<Diagnostic> {
        (**self).validate_resource_config(resource)
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        attributes: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier, attributes)
    }

    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).import(id, identifier)
    }

    fn refresh(&self, prior: &State) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).refresh(prior)
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read_data_source(resource)
    }

    fn list(&self, resource_type: &str) -> BoxFuture<'_, ProviderResult<Vec<State>>> {
        (**self).list(resource_type)
    }
}
