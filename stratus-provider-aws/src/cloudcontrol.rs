//! Cloud Control API seam
//!
//! Cloud Control exposes every CloudFormation resource type through one
//! uniform CRUD-L interface. Mutations are asynchronous: each returns a
//! progress event whose request token is polled until the request settles.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_cloudcontrol::Client;
use log::debug;
use stratus_core::paginate::Page;
use stratus_core::provider::{ProviderError, ProviderResult};
use stratus_core::retry::retry_transient;
use stratus_core::waiter::StateChangeConf;

use crate::conns::AwsClient;
use crate::errs::ApiError;

/// Status of a Cloud Control resource request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    CancelInProgress,
    CancelComplete,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::InProgress => "IN_PROGRESS",
            OperationStatus::Success => "SUCCESS",
            OperationStatus::Failed => "FAILED",
            OperationStatus::CancelInProgress => "CANCEL_IN_PROGRESS",
            OperationStatus::CancelComplete => "CANCEL_COMPLETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OperationStatus::Pending),
            "IN_PROGRESS" => Some(OperationStatus::InProgress),
            "SUCCESS" => Some(OperationStatus::Success),
            "FAILED" => Some(OperationStatus::Failed),
            "CANCEL_IN_PROGRESS" => Some(OperationStatus::CancelInProgress),
            "CANCEL_COMPLETE" => Some(OperationStatus::CancelComplete),
            _ => None,
        }
    }
}

/// Progress of a create, update or delete request
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub request_token: String,
    pub identifier: Option<String>,
    pub status: OperationStatus,
    pub status_message: Option<String>,
    pub error_code: Option<String>,
}

impl ProgressEvent {
    pub fn new(request_token: impl Into<String>, status: OperationStatus) -> Self {
        Self {
            request_token: request_token.into(),
            identifier: None,
            status,
            status_message: None,
            error_code: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.status_message = Some(message.into());
        self
    }

    /// Error for a request that ended in `FAILED` or `CANCEL_COMPLETE`
    fn failure(&self) -> ProviderError {
        let message = self.status_message.as_deref().unwrap_or("unknown error");
        if self.status == OperationStatus::CancelComplete {
            return ProviderError::new(format!(
                "request {} was cancelled: {}",
                self.request_token, message
            ));
        }
        match self.error_code.as_deref() {
            Some("NotFound") => ProviderError::not_found(message),
            Some("Throttling" | "ServiceInternalError" | "NetworkFailure") => {
                ProviderError::retryable(message)
            }
            Some(code) => ProviderError::new(format!("{}: {}", code, message)),
            None => ProviderError::new(message.to_string()),
        }
    }
}

/// A resource as returned by get/list
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescription {
    pub identifier: String,
    pub properties: serde_json::Value,
}

#[async_trait]
pub trait CloudControlApi: Send + Sync {
    async fn get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> Result<ResourceDescription, ApiError>;

    /// Mutations carry a `client_token`. Resending a request with the same
    /// token returns the original request instead of starting another.
    async fn create_resource(
        &self,
        type_name: &str,
        desired_state: &str,
        client_token: &str,
    ) -> Result<ProgressEvent, ApiError>;

    async fn update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_document: &str,
        client_token: &str,
    ) -> Result<ProgressEvent, ApiError>;

    async fn delete_resource(
        &self,
        type_name: &str,
        identifier: &str,
        client_token: &str,
    ) -> Result<ProgressEvent, ApiError>;

    async fn get_resource_request_status(
        &self,
        request_token: &str,
    ) -> Result<ProgressEvent, ApiError>;

    async fn list_resources(
        &self,
        type_name: &str,
        next_token: Option<String>,
    ) -> Result<Page<ResourceDescription>, ApiError>;
}

/// [`CloudControlApi`] backed by the AWS SDK
pub struct SdkCloudControl {
    client: Client,
}

impl SdkCloudControl {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn progress_event(
    operation: &str,
    event: Option<&aws_sdk_cloudcontrol::types::ProgressEvent>,
) -> Result<ProgressEvent, ApiError> {
    let event = event.ok_or_else(|| ApiError::new(operation, "no progress event returned"))?;
    let request_token = event
        .request_token()
        .ok_or_else(|| ApiError::new(operation, "no request token returned"))?;
    let status = event
        .operation_status()
        .and_then(|s| OperationStatus::parse(s.as_str()))
        .unwrap_or(OperationStatus::Pending);
    Ok(ProgressEvent {
        request_token: request_token.to_string(),
        identifier: event.identifier().map(String::from),
        status,
        status_message: event.status_message().map(String::from),
        error_code: event.error_code().map(|c| c.as_str().to_string()),
    })
}

fn parse_properties(operation: &str, properties: Option<&str>) -> Result<serde_json::Value, ApiError> {
    match properties {
        Some(p) => serde_json::from_str(p)
            .map_err(|e| ApiError::new(operation, format!("invalid resource properties: {}", e))),
        None => Ok(serde_json::Value::Object(serde_json::Map::new())),
    }
}

#[async_trait]
impl CloudControlApi for SdkCloudControl {
    async fn get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> Result<ResourceDescription, ApiError> {
        let output = self
            .client
            .get_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("GetResource", e))?;
        let desc = output.resource_description().ok_or_else(|| {
            ApiError::new("GetResource", "no resource description").with_code("NotFound")
        })?;
        Ok(ResourceDescription {
            identifier: desc.identifier().unwrap_or(identifier).to_string(),
            properties: parse_properties("GetResource", desc.properties())?,
        })
    }

    async fn create_resource(
        &self,
        type_name: &str,
        desired_state: &str,
        client_token: &str,
    ) -> Result<ProgressEvent, ApiError> {
        let output = self
            .client
            .create_resource()
            .type_name(type_name)
            .desired_state(desired_state)
            .client_token(client_token)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("CreateResource", e))?;
        progress_event("CreateResource", output.progress_event())
    }

    async fn update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_document: &str,
        client_token: &str,
    ) -> Result<ProgressEvent, ApiError> {
        let output = self
            .client
            .update_resource()
            .type_name(type_name)
            .identifier(identifier)
            .patch_document(patch_document)
            .client_token(client_token)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("UpdateResource", e))?;
        progress_event("UpdateResource", output.progress_event())
    }

    async fn delete_resource(
        &self,
        type_name: &str,
        identifier: &str,
        client_token: &str,
    ) -> Result<ProgressEvent, ApiError> {
        let output = self
            .client
            .delete_resource()
            .type_name(type_name)
            .identifier(identifier)
            .client_token(client_token)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("DeleteResource", e))?;
        progress_event("DeleteResource", output.progress_event())
    }

    async fn get_resource_request_status(
        &self,
        request_token: &str,
    ) -> Result<ProgressEvent, ApiError> {
        let output = self
            .client
            .get_resource_request_status()
            .request_token(request_token)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("GetResourceRequestStatus", e))?;
        progress_event("GetResourceRequestStatus", output.progress_event())
    }

    async fn list_resources(
        &self,
        type_name: &str,
        next_token: Option<String>,
    ) -> Result<Page<ResourceDescription>, ApiError> {
        let output = self
            .client
            .list_resources()
            .type_name(type_name)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("ListResources", e))?;
        let mut items = Vec::new();
        for desc in output.resource_descriptions() {
            let Some(identifier) = desc.identifier() else {
                continue;
            };
            items.push(ResourceDescription {
                identifier: identifier.to_string(),
                properties: parse_properties("ListResources", desc.properties())?,
            });
        }
        Ok(Page::new(items, output.next_token().map(String::from)))
    }
}

/// Poll a resource request until it succeeds.
///
/// `FAILED` and `CANCEL_COMPLETE` end the wait with an error classified by the
/// handler error code; exceeding `timeout` is a `Timeout` error.
pub async fn wait_for_request(
    client: &AwsClient,
    request_token: &str,
    timeout: Duration,
) -> ProviderResult<ProgressEvent> {
    let api = client.cloudcontrol.as_ref();
    let policy = client.retry_policy();
    let policy = &policy;

    let mut conf = StateChangeConf::new(
        &[
            OperationStatus::Pending.as_str(),
            OperationStatus::InProgress.as_str(),
            OperationStatus::CancelInProgress.as_str(),
        ],
        &[OperationStatus::Success.as_str()],
        timeout,
    );
    if let Some(interval) = client.poll_interval() {
        conf = conf.poll_interval(interval);
    }

    let event = conf
        .wait_for_state(move || async move {
            let event = retry_transient(policy, move || async move {
                api.get_resource_request_status(request_token)
                    .await
                    .map_err(ProviderError::from)
            })
            .await?;
            debug!(
                "request {} is {}",
                event.request_token,
                event.status.as_str()
            );
            match event.status {
                OperationStatus::Failed | OperationStatus::CancelComplete => Err(event.failure()),
                status => Ok(Some((event, status.as_str().to_string()))),
            }
        })
        .await?;

    event.ok_or_else(|| ProviderError::new(format!("request {} vanished", request_token)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloudControl;
    use std::sync::Arc;
    use stratus_core::provider::ErrorKind;

    fn client(fake: Arc<FakeCloudControl>) -> AwsClient {
        crate::testing::client_with(fake, Arc::new(crate::testing::FakeS3::default()))
    }

    #[tokio::test]
    async fn waits_through_pending_states() {
        let fake = Arc::new(FakeCloudControl::default());
        fake.script_request(
            "tok-1",
            vec![
                ProgressEvent::new("tok-1", OperationStatus::Pending),
                ProgressEvent::new("tok-1", OperationStatus::InProgress),
                ProgressEvent::new("tok-1", OperationStatus::Success).with_identifier("vpc-1"),
            ],
        );
        let event = wait_for_request(&client(fake), "tok-1", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(event.identifier.as_deref(), Some("vpc-1"));
    }

    #[tokio::test]
    async fn failed_not_found_is_classified() {
        let fake = Arc::new(FakeCloudControl::default());
        fake.script_request(
            "tok-2",
            vec![
                ProgressEvent::new("tok-2", OperationStatus::Failed)
                    .with_error("NotFound", "VPC vpc-1 does not exist"),
            ],
        );
        let err = wait_for_request(&client(fake), "tok-2", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn failed_request_reports_status_message() {
        let fake = Arc::new(FakeCloudControl::default());
        fake.script_request(
            "tok-3",
            vec![
                ProgressEvent::new("tok-3", OperationStatus::InProgress),
                ProgressEvent::new("tok-3", OperationStatus::Failed)
                    .with_error("InvalidRequest", "CIDR overlaps"),
            ],
        );
        let err = wait_for_request(&client(fake), "tok-3", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Api);
        assert_eq!(err.message, "InvalidRequest: CIDR overlaps");
    }

    #[tokio::test]
    async fn throttled_request_is_retryable() {
        let fake = Arc::new(FakeCloudControl::default());
        fake.script_request(
            "tok-4",
            vec![ProgressEvent::new("tok-4", OperationStatus::Failed).with_error("Throttling", "slow down")],
        );
        let err = wait_for_request(&client(fake), "tok-4", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn cancelled_request_is_an_error() {
        let fake = Arc::new(FakeCloudControl::default());
        fake.script_request(
            "tok-5",
            vec![ProgressEvent::new("tok-5", OperationStatus::CancelComplete)],
        );
        let err = wait_for_request(&client(fake), "tok-5", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.message.contains("cancelled"));
    }

    #[test]
    fn status_strings() {
        for status in [
            OperationStatus::Pending,
            OperationStatus::InProgress,
            OperationStatus::Success,
            OperationStatus::Failed,
            OperationStatus::CancelInProgress,
            OperationStatus::CancelComplete,
        ] {
            assert_eq!(OperationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OperationStatus::parse("DONE"), None);
    }
}
