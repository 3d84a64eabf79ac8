//! S3 buckets
//!
//! Buckets are managed directly through the S3 API. `force_destroy` empties a
//! bucket, every object version and delete marker included, before deletion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use stratus_core::arn::{Arn, partition_for_region};
use stratus_core::finder::ignore_not_found;
use stratus_core::paginate::collect_pages;
use stratus_core::provider::{Diagnostic, ProviderError, ProviderResult};
use stratus_core::registry::{Registered, ServicePackage};
use stratus_core::resource::{Resource, ResourceId, State, Value};
use stratus_core::retry::{retry_transient, retry_when_not_found};
use stratus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use stratus_core::tags::{KeyValueTags, merge_default_tags};

use super::{Handler, LookupDataSource, ResourceHandler};
use crate::conns::AwsClient;
use crate::convert::{TAGS, TAGS_ALL, resource_tags, settle};
use crate::s3::{BucketInfo, MAX_DELETE_BATCH, ObjectVersion};

pub const TYPE_NAME: &str = "s3_bucket";

const BUCKET: &str = "bucket";
const FORCE_DESTROY: &str = "force_destroy";
const VERSIONING: &str = "versioning";

const VISIBILITY_INTERVAL: Duration = Duration::from_secs(2);

pub struct S3;

impl ServicePackage<Handler> for S3 {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn resources(&self) -> Vec<Handler> {
        vec![Arc::new(BucketHandler::new())]
    }

    fn data_sources(&self) -> Vec<Handler> {
        vec![Arc::new(LookupDataSource::new(
            Arc::new(BucketHandler::new()),
            BUCKET,
        ))]
    }
}

pub struct BucketHandler {
    schema: ResourceSchema,
}

impl BucketHandler {
    pub fn new() -> Self {
        let schema = ResourceSchema::new(TYPE_NAME)
            .with_description("An S3 bucket")
            .attribute(
                AttributeSchema::new(
                    BUCKET,
                    types::string_matches(
                        "BucketName",
                        r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$",
                        "must be 3-63 characters of lowercase letters, digits, '.' and '-', \
                         beginning and ending with a letter or digit",
                    ),
                )
                .required()
                .force_new(),
            )
            .attribute(
                AttributeSchema::new(FORCE_DESTROY, AttributeType::Bool)
                    .with_default(Value::Bool(false))
                    .write_only()
                    .with_description("Delete every object when the bucket is destroyed"),
            )
            .attribute(AttributeSchema::new(
                VERSIONING,
                AttributeType::Enum(vec!["Enabled".to_string(), "Suspended".to_string()]),
            ))
            .attribute(AttributeSchema::new(TAGS, types::tags()))
            .attribute(AttributeSchema::new(TAGS_ALL, types::tags()).computed())
            .attribute(AttributeSchema::new("arn", AttributeType::String).computed())
            .attribute(AttributeSchema::new("region", AttributeType::String).computed());
        Self { schema }
    }

    /// Finder: HeadBucket, not found when the bucket does not exist
    async fn find_bucket(&self, client: &AwsClient, name: &str) -> ProviderResult<BucketInfo> {
        let policy = client.retry_policy();
        let api = client.s3.as_ref();
        retry_transient(&policy, move || async move {
            api.head_bucket(name).await.map_err(ProviderError::from)
        })
        .await
    }

    fn desired_tags(client: &AwsClient, attributes: &HashMap<String, Value>) -> KeyValueTags {
        let own = attributes
            .get(TAGS)
            .map(KeyValueTags::from_value)
            .unwrap_or_default();
        merge_default_tags(&client.default_tags(), &own)
    }

    async fn put_tags(
        &self,
        client: &AwsClient,
        name: &str,
        tags: &KeyValueTags,
    ) -> ProviderResult<()> {
        let policy = client.retry_policy();
        let api = client.s3.as_ref();
        retry_transient(&policy, move || async move {
            if tags.is_empty() {
                api.delete_bucket_tagging(name).await?;
            } else {
                api.put_bucket_tagging(name, tags).await?;
            }
            Ok(())
        })
        .await
    }

    async fn put_versioning(
        &self,
        client: &AwsClient,
        name: &str,
        status: &str,
    ) -> ProviderResult<()> {
        let policy = client.retry_policy();
        let api = client.s3.as_ref();
        retry_transient(&policy, move || async move {
            api.put_bucket_versioning(name, status)
                .await
                .map_err(ProviderError::from)
        })
        .await
    }

    /// Delete every object version and delete marker in the bucket
    async fn empty_bucket(&self, client: &AwsClient, name: &str) -> ProviderResult<usize> {
        let policy = client.retry_policy();
        let policy = &policy;
        let api = client.s3.as_ref();
        let objects: Vec<ObjectVersion> = collect_pages(move |token: Option<String>| async move {
            retry_transient(policy, || {
                let token = token.clone();
                async move { api.list_objects(name, token).await.map_err(ProviderError::from) }
            })
            .await
        })
        .await?;

        for batch in objects.chunks(MAX_DELETE_BATCH) {
            debug!("deleting {} objects from bucket {}", batch.len(), name);
            retry_transient(policy, move || async move {
                api.delete_objects(name, batch)
                    .await
                    .map_err(ProviderError::from)
            })
            .await?;
        }
        Ok(objects.len())
    }

    /// Bucket tags this provider leaves alone. `aws:` keys are left out since
    /// PutBucketTagging rejects them and S3 keeps system tags by itself.
    async fn unmanaged_tags(&self, client: &AwsClient, name: &str) -> ProviderResult<KeyValueTags> {
        let policy = client.retry_policy();
        let api = client.s3.as_ref();
        let live = retry_transient(&policy, move || async move {
            api.get_bucket_tagging(name)
                .await
                .map_err(ProviderError::from)
        })
        .await?;
        Ok(live.unmanaged(client.ignore_tags()).ignore_aws())
    }
}

impl Default for BucketHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Registered for BucketHandler {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }
}

#[async_trait]
impl ResourceHandler for BucketHandler {
    async fn read(
        &self,
        client: &AwsClient,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let info = self.find_bucket(client, identifier).await?;
        let region = info
            .region
            .unwrap_or_else(|| client.region().to_string());

        let policy = client.retry_policy();
        let api = client.s3.as_ref();
        let versioning = retry_transient(&policy, move || async move {
            api.get_bucket_versioning(identifier)
                .await
                .map_err(ProviderError::from)
        })
        .await?;
        let all_tags = retry_transient(&policy, move || async move {
            api.get_bucket_tagging(identifier)
                .await
                .map_err(ProviderError::from)
        })
        .await?
        .ignore_aws()
        .ignore_config(client.ignore_tags());

        let arn = Arn {
            partition: partition_for_region(&region).to_string(),
            service: "s3".to_string(),
            region: String::new(),
            account_id: String::new(),
            resource: identifier.to_string(),
        };

        let mut attributes = HashMap::new();
        attributes.insert(BUCKET.to_string(), Value::String(identifier.to_string()));
        attributes.insert("arn".to_string(), Value::String(arn.to_string()));
        attributes.insert("region".to_string(), Value::String(region));
        if let Some(status) = versioning {
            attributes.insert(VERSIONING.to_string(), Value::String(status));
        }
        attributes.insert(
            TAGS.to_string(),
            resource_tags(&all_tags, &client.default_tags(), &KeyValueTags::new()).to_value(),
        );
        attributes.insert(TAGS_ALL.to_string(), all_tags.to_value());

        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn create(&self, client: &AwsClient, resource: &Resource) -> ProviderResult<State> {
        let mut attributes = resource.attributes.clone();
        self.schema.apply_defaults(&mut attributes);
        let timeouts = self.schema.timeouts.resolve(&attributes);
        let name = attributes
            .get(BUCKET)
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::validation("'bucket' must be set to a string"))?
            .to_string();
        let name = name.as_str();
        let region = client.region();

        let policy = client.retry_policy();
        let api = client.s3.as_ref();
        debug!("creating bucket {} in {}", name, region);
        retry_transient(&policy, move || async move {
            api.create_bucket(name, region)
                .await
                .map_err(ProviderError::from)
        })
        .await?;

        let interval = client.poll_interval().unwrap_or(VISIBILITY_INTERVAL);
        retry_when_not_found(timeouts.create, interval, move || async move {
            self.find_bucket(client, name).await
        })
        .await?;

        if let Some(status) = attributes.get(VERSIONING).and_then(Value::as_str) {
            self.put_versioning(client, name, status).await?;
        }
        let tags = Self::desired_tags(client, &attributes);
        if !tags.is_empty() {
            self.put_tags(client, name, &tags).await?;
        }
        info!("created {} ({})", resource.id, name);

        let state = self.read(client, &resource.id, name).await?;
        Ok(settle(&self.schema, &client.default_tags(), state, &attributes))
    }

    async fn update(
        &self,
        client: &AwsClient,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let mut desired = to.attributes.clone();
        self.schema.apply_defaults(&mut desired);

        if let Some(status) = desired.get(VERSIONING).and_then(Value::as_str)
            && from.attributes.get(VERSIONING).and_then(Value::as_str) != Some(status)
        {
            self.put_versioning(client, identifier, status).await?;
        }

        let want = Self::desired_tags(client, &desired);
        let have = from
            .attributes
            .get(TAGS_ALL)
            .map(KeyValueTags::from_value)
            .unwrap_or_default();
        if want != have {
            let mut sent = self.unmanaged_tags(client, identifier).await?;
            sent.extend(&want);
            self.put_tags(client, identifier, &sent).await?;
        }
        info!("updated {} ({})", id, identifier);

        let state = self.read(client, id, identifier).await?;
        Ok(settle(&self.schema, &client.default_tags(), state, &desired))
    }

    async fn delete(
        &self,
        client: &AwsClient,
        id: &ResourceId,
        identifier: &str,
        attributes: &HashMap<String, Value>,
    ) -> ProviderResult<()> {
        let force_destroy = attributes
            .get(FORCE_DESTROY)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let policy = client.retry_policy();
        let api = client.s3.as_ref();

        if force_destroy {
            match self.empty_bucket(client, identifier).await {
                Ok(count) => info!("deleted {} objects from bucket {}", count, identifier),
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        let result = retry_transient(&policy, move || async move {
            api.delete_bucket(identifier)
                .await
                .map_err(ProviderError::from)
        })
        .await;
        ignore_not_found(result)?;
        info!("deleted {} ({})", id, identifier);
        Ok(())
    }

    async fn list(&self, client: &AwsClient) -> ProviderResult<Vec<State>> {
        let policy = client.retry_policy();
        let policy = &policy;
        let api = client.s3.as_ref();
        let names = collect_pages(move |token: Option<String>| async move {
            retry_transient(policy, || {
                let token = token.clone();
                async move { api.list_buckets(token).await.map_err(ProviderError::from) }
            })
            .await
        })
        .await?;

        let mut states = Vec::new();
        for name in names {
            let id = ResourceId::new(TYPE_NAME, &name);
            let state = match self.read(client, &id, &name).await {
                Ok(state) => state,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            // ListBuckets spans every region
            if state.attributes.get("region").and_then(Value::as_str) == Some(client.region()) {
                states.push(state);
            }
        }
        Ok(states)
    }

    fn validate_config(&self, resource: &Resource) -> Vec<Diagnostic> {
        let Some(name) = resource.get_str(BUCKET) else {
            return Vec::new();
        };
        let mut diagnostics = Vec::new();
        if name.contains("..") {
            diagnostics.push(
                Diagnostic::error(format!(
                    "{}: bucket name must not contain two adjacent periods",
                    resource.id
                ))
                .with_attribute(BUCKET),
            );
        }
        if name.split('.').count() == 4 && name.split('.').all(|p| p.parse::<u8>().is_ok()) {
            diagnostics.push(
                Diagnostic::error(format!(
                    "{}: bucket name must not be formatted as an IP address",
                    resource.id
                ))
                .with_attribute(BUCKET),
            );
        }
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCloudControl, FakeS3, client_with, client_with_config};
    use stratus_core::config::ProviderConfig;
    use stratus_core::provider::ErrorKind;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    fn client(s3: Arc<FakeS3>) -> AwsClient {
        client_with(Arc::new(FakeCloudControl::default()), s3)
    }

    fn bucket(name: &str) -> Resource {
        Resource::new(TYPE_NAME, "logs").with_attribute(BUCKET, s(name))
    }

    #[tokio::test]
    async fn create_sets_versioning_and_tags() {
        let s3 = Arc::new(FakeS3::default());
        let mut config = ProviderConfig::new("eu-west-1");
        config.default_tags.insert("Env".to_string(), "dev".to_string());
        let client = client_with_config(config, Arc::new(FakeCloudControl::default()), s3.clone());
        let resource = bucket("acme-logs")
            .with_attribute(VERSIONING, s("Enabled"))
            .with_attribute(
                TAGS,
                Value::Map(HashMap::from([("Team".to_string(), s("core"))])),
            );

        let state = BucketHandler::new().create(&client, &resource).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some("acme-logs"));
        assert_eq!(state.attributes.get("arn"), Some(&s("arn:aws:s3:::acme-logs")));
        assert_eq!(state.attributes.get("region"), Some(&s("eu-west-1")));
        assert_eq!(state.attributes.get(VERSIONING), Some(&s("Enabled")));
        assert_eq!(state.attributes.get(FORCE_DESTROY), Some(&Value::Bool(false)));
        assert_eq!(
            state.attributes.get(TAGS),
            Some(&Value::Map(HashMap::from([("Team".to_string(), s("core"))])))
        );
        let stored = s3.bucket("acme-logs").unwrap();
        assert_eq!(stored.region, "eu-west-1");
        assert_eq!(stored.tags.get("Env"), Some("dev"));
    }

    #[tokio::test]
    async fn create_waits_until_bucket_is_visible() {
        let s3 = Arc::new(FakeS3::default());
        s3.hide_next_heads(3);
        let client = client(s3.clone());

        let state = BucketHandler::new()
            .create(&client, &bucket("acme-logs"))
            .await
            .unwrap();

        assert!(state.exists);
        let heads = s3.calls().iter().filter(|c| c.starts_with("head")).count();
        assert_eq!(heads, 5);
    }

    #[tokio::test]
    async fn read_of_missing_bucket_is_not_found() {
        let client = client(Arc::new(FakeS3::default()));
        let err = BucketHandler::new()
            .read(&client, &ResourceId::new(TYPE_NAME, "logs"), "missing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn update_replaces_and_clears_tags() {
        let s3 = Arc::new(FakeS3::default());
        let client = client(s3.clone());
        let handler = BucketHandler::new();
        let tagged = bucket("acme-logs").with_attribute(
            TAGS,
            Value::Map(HashMap::from([("Team".to_string(), s("core"))])),
        );
        let from = handler.create(&client, &tagged).await.unwrap();

        let state = handler
            .update(&client, &from.id, "acme-logs", &from, &bucket("acme-logs"))
            .await
            .unwrap();

        assert!(s3.calls().contains(&"untag acme-logs".to_string()));
        assert_eq!(state.attributes.get(TAGS), Some(&Value::Map(HashMap::new())));
    }

    #[tokio::test]
    async fn tag_update_keeps_ignored_tags() {
        let s3 = Arc::new(FakeS3::default());
        let mut config = ProviderConfig::new("us-east-1");
        config.ignore_tags.keys.push("Owner".to_string());
        let client = client_with_config(config, Arc::new(FakeCloudControl::default()), s3.clone());
        let handler = BucketHandler::new();
        let from = handler.create(&client, &bucket("acme-logs")).await.unwrap();
        s3.buckets
            .lock()
            .unwrap()
            .get_mut("acme-logs")
            .unwrap()
            .tags
            .insert("Owner", "alice");

        let to = bucket("acme-logs").with_attribute(
            TAGS,
            Value::Map(HashMap::from([("Team".to_string(), s("data"))])),
        );
        let state = handler
            .update(&client, &from.id, "acme-logs", &from, &to)
            .await
            .unwrap();

        let stored = s3.bucket("acme-logs").unwrap().tags;
        assert_eq!(stored.get("Owner"), Some("alice"));
        assert_eq!(stored.get("Team"), Some("data"));
        assert_eq!(
            state.attributes.get(TAGS),
            Some(&Value::Map(HashMap::from([("Team".to_string(), s("data"))])))
        );
    }

    #[tokio::test]
    async fn force_destroy_empties_in_batches() {
        let s3 = Arc::new(FakeS3::default());
        let client = client(s3.clone());
        let handler = BucketHandler::new();
        handler.create(&client, &bucket("acme-logs")).await.unwrap();
        s3.put_objects("acme-logs", 2500);

        let attrs = HashMap::from([(FORCE_DESTROY.to_string(), Value::Bool(true))]);
        handler
            .delete(&client, &ResourceId::new(TYPE_NAME, "logs"), "acme-logs", &attrs)
            .await
            .unwrap();

        assert!(s3.bucket("acme-logs").is_none());
        let batches: Vec<String> = s3
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("delete_objects"))
            .collect();
        assert_eq!(
            batches,
            vec![
                "delete_objects acme-logs 1000",
                "delete_objects acme-logs 1000",
                "delete_objects acme-logs 500",
            ]
        );
    }

    #[tokio::test]
    async fn non_empty_bucket_is_kept_without_force_destroy() {
        let s3 = Arc::new(FakeS3::default());
        let client = client(s3.clone());
        let handler = BucketHandler::new();
        handler.create(&client, &bucket("acme-logs")).await.unwrap();
        s3.put_objects("acme-logs", 1);

        let err = handler
            .delete(
                &client,
                &ResourceId::new(TYPE_NAME, "logs"),
                "acme-logs",
                &HashMap::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Api);
        assert!(err.message.contains("BucketNotEmpty"));
    }

    #[tokio::test]
    async fn delete_of_missing_bucket_succeeds() {
        let client = client(Arc::new(FakeS3::default()));
        let attrs = HashMap::from([(FORCE_DESTROY.to_string(), Value::Bool(true))]);
        BucketHandler::new()
            .delete(&client, &ResourceId::new(TYPE_NAME, "logs"), "gone", &attrs)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_keeps_buckets_in_the_region() {
        let s3 = Arc::new(FakeS3::default());
        let client = client(s3.clone());
        let handler = BucketHandler::new();
        handler.create(&client, &bucket("acme-logs")).await.unwrap();
        s3.buckets.lock().unwrap().insert(
            "acme-eu".to_string(),
            crate::testing::FakeBucket {
                region: "eu-west-1".to_string(),
                ..Default::default()
            },
        );

        let states = handler.list(&client).await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].id, ResourceId::new(TYPE_NAME, "acme-logs"));
    }

    #[test]
    fn bucket_names_are_validated() {
        let handler = BucketHandler::new();
        let mut attrs = HashMap::new();
        attrs.insert(BUCKET.to_string(), s("Acme_Logs"));
        assert!(handler.schema().validate(&attrs).is_err());
        attrs.insert(BUCKET.to_string(), s("ab"));
        assert!(handler.schema().validate(&attrs).is_err());
        attrs.insert(BUCKET.to_string(), s("acme-logs"));
        assert!(handler.schema().validate(&attrs).is_ok());

        assert_eq!(handler.validate_config(&bucket("acme..logs")).len(), 1);
        assert_eq!(handler.validate_config(&bucket("192.168.1.10")).len(), 1);
        assert!(handler.validate_config(&bucket("acme-logs")).is_empty());
    }
}
