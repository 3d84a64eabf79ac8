//! In-memory fakes of the AWS API seams

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value as Json};
use stratus_core::config::ProviderConfig;
use stratus_core::paginate::Page;
use stratus_core::retry::RetryPolicy;
use stratus_core::tags::KeyValueTags;

use crate::cloudcontrol::{CloudControlApi, OperationStatus, ProgressEvent, ResourceDescription};
use crate::conns::AwsClient;
use crate::errs::ApiError;
use crate::s3::{BucketInfo, ObjectVersion, S3Api};

const LIST_PAGE_SIZE: usize = 2;

pub fn client_with(cc: Arc<FakeCloudControl>, s3: Arc<FakeS3>) -> AwsClient {
    client_with_config(ProviderConfig::new("us-east-1"), cc, s3)
}

pub fn client_with_config(
    config: ProviderConfig,
    cc: Arc<FakeCloudControl>,
    s3: Arc<FakeS3>,
) -> AwsClient {
    AwsClient::with_apis(config, cc, s3)
        .with_retry_policy(
            RetryPolicy::default()
                .initial_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(5)),
        )
        .with_poll_interval(Duration::from_millis(1))
}

fn not_found(operation: &str, what: &str) -> ApiError {
    ApiError::new(operation, format!("{} not found", what))
        .with_code("ResourceNotFoundException")
        .with_status(404)
}

/// Cloud Control backed by a map of (type, identifier) to properties.
///
/// Mutations settle on the first status poll. Request tokens can also be
/// scripted with an explicit sequence of events.
#[derive(Default)]
pub struct FakeCloudControl {
    objects: Mutex<BTreeMap<(String, String), Json>>,
    scripted: Mutex<HashMap<String, VecDeque<ProgressEvent>>>,
    identifier_properties: Mutex<HashMap<String, Vec<String>>>,
    computed: Mutex<HashMap<String, Map<String, Json>>>,
    failures: Mutex<HashMap<String, VecDeque<(String, String)>>>,
    hidden_reads: AtomicUsize,
    throttled_calls: AtomicUsize,
    counter: AtomicUsize,
    accepted: Mutex<HashMap<String, ProgressEvent>>,
    pub calls: Mutex<Vec<String>>,
    pub patches: Mutex<Vec<Json>>,
    /// Client token of every mutation attempt, throttled ones included
    pub client_tokens: Mutex<Vec<String>>,
}

impl FakeCloudControl {
    pub fn script_request(&self, token: &str, events: Vec<ProgressEvent>) {
        self.scripted
            .lock()
            .unwrap()
            .insert(token.to_string(), events.into());
    }

    /// Build identifiers for `type_name` from these properties joined by `|`
    pub fn identify_by(&self, type_name: &str, properties: &[&str]) {
        self.identifier_properties.lock().unwrap().insert(
            type_name.to_string(),
            properties.iter().map(|p| p.to_string()).collect(),
        );
    }

    /// Properties the cloud adds on create
    pub fn compute(&self, type_name: &str, properties: Json) {
        if let Json::Object(map) = properties {
            self.computed
                .lock()
                .unwrap()
                .insert(type_name.to_string(), map);
        }
    }

    /// Make the next mutation of `type_name` fail with this handler error
    pub fn fail_next(&self, type_name: &str, code: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .entry(type_name.to_string())
            .or_default()
            .push_back((code.to_string(), message.to_string()));
    }

    /// Hide objects from the next `n` reads, as eventual consistency does
    pub fn hide_next_reads(&self, n: usize) {
        self.hidden_reads.store(n, Ordering::SeqCst);
    }

    /// Throttle the next `n` mutation calls before Cloud Control accepts them
    pub fn throttle_next_calls(&self, n: usize) {
        self.throttled_calls.store(n, Ordering::SeqCst);
    }

    pub fn insert(&self, type_name: &str, identifier: &str, properties: Json) {
        self.objects
            .lock()
            .unwrap()
            .insert((type_name.to_string(), identifier.to_string()), properties);
    }

    pub fn get(&self, type_name: &str, identifier: &str) -> Option<Json> {
        self.objects
            .lock()
            .unwrap()
            .get(&(type_name.to_string(), identifier.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Admit a mutation attempt. A throttled attempt is an error; a repeated
    /// client token hands back the request it started the first time.
    fn admit(
        &self,
        operation: &str,
        client_token: &str,
    ) -> Result<Option<ProgressEvent>, ApiError> {
        self.client_tokens
            .lock()
            .unwrap()
            .push(client_token.to_string());
        let throttled = self
            .throttled_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(ApiError::new(operation, "Rate exceeded")
                .with_code("ThrottlingException")
                .with_status(400));
        }
        Ok(self.accepted.lock().unwrap().get(client_token).cloned())
    }

    fn accept(&self, client_token: &str, event: ProgressEvent) -> ProgressEvent {
        self.accepted
            .lock()
            .unwrap()
            .insert(client_token.to_string(), event.clone());
        event
    }

    fn next(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Queue the final event of a mutation and hand back the first one
    fn settle(&self, type_name: &str, identifier: Option<String>) -> ProgressEvent {
        let token = format!("tok-{}", self.next());
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(type_name)
            .and_then(VecDeque::pop_front);
        let mut last = match failure {
            Some((code, message)) => {
                ProgressEvent::new(&token, OperationStatus::Failed).with_error(code, message)
            }
            None => ProgressEvent::new(&token, OperationStatus::Success),
        };
        last.identifier = identifier.clone();
        self.script_request(&token, vec![last]);
        let mut first = ProgressEvent::new(token, OperationStatus::InProgress);
        first.identifier = identifier;
        first
    }

    fn is_failing(&self, type_name: &str) -> bool {
        self.failures
            .lock()
            .unwrap()
            .get(type_name)
            .is_some_and(|f| !f.is_empty())
    }
}

fn apply_patch(properties: &mut Json, patch: &Json) {
    let (Json::Object(props), Json::Array(ops)) = (properties, patch) else {
        return;
    };
    for op in ops {
        let path = op["path"].as_str().unwrap_or_default().trim_start_matches('/');
        match op["op"].as_str() {
            Some("add" | "replace") => {
                props.insert(path.to_string(), op["value"].clone());
            }
            Some("remove") => {
                props.remove(path);
            }
            _ => {}
        }
    }
}

#[async_trait]
impl CloudControlApi for FakeCloudControl {
    async fn get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> Result<ResourceDescription, ApiError> {
        self.record(format!("get {} {}", type_name, identifier));
        let hidden = self
            .hidden_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        match self.get(type_name, identifier) {
            Some(properties) if !hidden => Ok(ResourceDescription {
                identifier: identifier.to_string(),
                properties,
            }),
            _ => Err(not_found("GetResource", identifier)),
        }
    }

    async fn create_resource(
        &self,
        type_name: &str,
        desired_state: &str,
        client_token: &str,
    ) -> Result<ProgressEvent, ApiError> {
        if let Some(event) = self.admit("CreateResource", client_token)? {
            return Ok(event);
        }
        self.record(format!("create {}", type_name));
        let mut properties: Json = serde_json::from_str(desired_state)
            .map_err(|e| ApiError::new("CreateResource", e.to_string()))?;
        if self.is_failing(type_name) {
            let event = self.settle(type_name, None);
            return Ok(self.accept(client_token, event));
        }
        if let (Json::Object(props), Some(extra)) =
            (&mut properties, self.computed.lock().unwrap().get(type_name))
        {
            for (k, v) in extra {
                props.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        let identifier = match self.identifier_properties.lock().unwrap().get(type_name) {
            Some(parts) => parts
                .iter()
                .map(|p| properties[p].as_str().unwrap_or_default().to_string())
                .collect::<Vec<_>>()
                .join("|"),
            None => format!("{}-{}", type_name.rsplit("::").next().unwrap_or("res").to_lowercase(), self.next()),
        };
        self.insert(type_name, &identifier, properties);
        let event = self.settle(type_name, Some(identifier));
        Ok(self.accept(client_token, event))
    }

    async fn update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_document: &str,
        client_token: &str,
    ) -> Result<ProgressEvent, ApiError> {
        if let Some(event) = self.admit("UpdateResource", client_token)? {
            return Ok(event);
        }
        self.record(format!("update {} {}", type_name, identifier));
        let patch: Json = serde_json::from_str(patch_document)
            .map_err(|e| ApiError::new("UpdateResource", e.to_string()))?;
        self.patches.lock().unwrap().push(patch.clone());
        if self.is_failing(type_name) {
            let event = self.settle(type_name, Some(identifier.to_string()));
            return Ok(self.accept(client_token, event));
        }
        let mut objects = self.objects.lock().unwrap();
        let Some(properties) = objects.get_mut(&(type_name.to_string(), identifier.to_string()))
        else {
            return Err(not_found("UpdateResource", identifier));
        };
        apply_patch(properties, &patch);
        drop(objects);
        let event = self.settle(type_name, Some(identifier.to_string()));
        Ok(self.accept(client_token, event))
    }

    async fn delete_resource(
        &self,
        type_name: &str,
        identifier: &str,
        client_token: &str,
    ) -> Result<ProgressEvent, ApiError> {
        if let Some(event) = self.admit("DeleteResource", client_token)? {
            return Ok(event);
        }
        self.record(format!("delete {} {}", type_name, identifier));
        let removed = self
            .objects
            .lock()
            .unwrap()
            .remove(&(type_name.to_string(), identifier.to_string()));
        if removed.is_none() {
            // Cloud Control accepts the request and fails it asynchronously
            self.fail_next(type_name, "NotFound", &format!("{} does not exist", identifier));
        }
        let event = self.settle(type_name, Some(identifier.to_string()));
        Ok(self.accept(client_token, event))
    }

    async fn get_resource_request_status(
        &self,
        request_token: &str,
    ) -> Result<ProgressEvent, ApiError> {
        let mut scripted = self.scripted.lock().unwrap();
        let queue = scripted.get_mut(request_token).ok_or_else(|| {
            ApiError::new("GetResourceRequestStatus", "unknown token")
                .with_code("RequestTokenNotFoundException")
        })?;
        let event = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        event.ok_or_else(|| ApiError::new("GetResourceRequestStatus", "no events scripted"))
    }

    async fn list_resources(
        &self,
        type_name: &str,
        next_token: Option<String>,
    ) -> Result<Page<ResourceDescription>, ApiError> {
        let start: usize = next_token.as_deref().unwrap_or("0").parse().unwrap_or(0);
        let all: Vec<ResourceDescription> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((t, _), _)| t == type_name)
            .map(|((_, identifier), _)| ResourceDescription {
                identifier: identifier.clone(),
                properties: Json::Object(Map::new()),
            })
            .collect();
        let end = (start + LIST_PAGE_SIZE).min(all.len());
        let next = (end < all.len()).then(|| end.to_string());
        Ok(Page::new(all[start.min(end)..end].to_vec(), next))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeBucket {
    pub region: String,
    pub versioning: Option<String>,
    pub tags: KeyValueTags,
    pub objects: Vec<ObjectVersion>,
}

/// S3 backed by a map of bucket name to bucket
#[derive(Default)]
pub struct FakeS3 {
    pub buckets: Mutex<BTreeMap<String, FakeBucket>>,
    pub calls: Mutex<Vec<String>>,
    hidden_heads: AtomicUsize,
}

impl FakeS3 {
    pub fn bucket(&self, name: &str) -> Option<FakeBucket> {
        self.buckets.lock().unwrap().get(name).cloned()
    }

    pub fn put_objects(&self, bucket: &str, count: usize) {
        let mut buckets = self.buckets.lock().unwrap();
        if let Some(b) = buckets.get_mut(bucket) {
            for i in 0..count {
                b.objects.push(ObjectVersion {
                    key: format!("object-{}", i),
                    version_id: Some(format!("v{}", i)),
                });
            }
        }
    }

    /// Hide buckets from the next `n` HeadBucket calls
    pub fn hide_next_heads(&self, n: usize) {
        self.hidden_heads.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn with_bucket<T>(
        &self,
        operation: &str,
        name: &str,
        f: impl FnOnce(&mut FakeBucket) -> T,
    ) -> Result<T, ApiError> {
        let mut buckets = self.buckets.lock().unwrap();
        match buckets.get_mut(name) {
            Some(bucket) => Ok(f(bucket)),
            None => Err(ApiError::new(operation, "The specified bucket does not exist")
                .with_code("NoSuchBucket")
                .with_status(404)),
        }
    }
}

#[async_trait]
impl S3Api for FakeS3 {
    async fn head_bucket(&self, bucket: &str) -> Result<BucketInfo, ApiError> {
        self.record(format!("head {}", bucket));
        let hidden = self
            .hidden_heads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hidden {
            return Err(ApiError::new("HeadBucket", "Not Found").with_status(404));
        }
        self.with_bucket("HeadBucket", bucket, |b| BucketInfo {
            region: Some(b.region.clone()),
        })
        .map_err(|e| ApiError::new("HeadBucket", "Not Found").with_status(e.status.unwrap_or(404)))
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), ApiError> {
        self.record(format!("create {} {}", bucket, region));
        let mut buckets = self.buckets.lock().unwrap();
        if buckets.contains_key(bucket) {
            return Err(ApiError::new("CreateBucket", "bucket already exists")
                .with_code("BucketAlreadyOwnedByYou")
                .with_status(409));
        }
        buckets.insert(
            bucket.to_string(),
            FakeBucket {
                region: region.to_string(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), ApiError> {
        self.record(format!("delete {}", bucket));
        let mut buckets = self.buckets.lock().unwrap();
        match buckets.get(bucket) {
            None => Err(ApiError::new("DeleteBucket", "The specified bucket does not exist")
                .with_code("NoSuchBucket")
                .with_status(404)),
            Some(b) if !b.objects.is_empty() => Err(ApiError::new(
                "DeleteBucket",
                "The bucket you tried to delete is not empty",
            )
            .with_code("BucketNotEmpty")
            .with_status(409)),
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> Result<Option<String>, ApiError> {
        self.with_bucket("GetBucketVersioning", bucket, |b| b.versioning.clone())
    }

    async fn put_bucket_versioning(&self, bucket: &str, status: &str) -> Result<(), ApiError> {
        self.record(format!("versioning {} {}", bucket, status));
        self.with_bucket("PutBucketVersioning", bucket, |b| {
            b.versioning = Some(status.to_string())
        })
    }

    async fn get_bucket_tagging(&self, bucket: &str) -> Result<KeyValueTags, ApiError> {
        self.with_bucket("GetBucketTagging", bucket, |b| b.tags.clone())
    }

    async fn put_bucket_tagging(&self, bucket: &str, tags: &KeyValueTags) -> Result<(), ApiError> {
        self.record(format!("tag {}", bucket));
        self.with_bucket("PutBucketTagging", bucket, |b| b.tags = tags.clone())
    }

    async fn delete_bucket_tagging(&self, bucket: &str) -> Result<(), ApiError> {
        self.record(format!("untag {}", bucket));
        self.with_bucket("DeleteBucketTagging", bucket, |b| {
            b.tags = KeyValueTags::new()
        })
    }

    async fn list_objects(
        &self,
        bucket: &str,
        next_token: Option<String>,
    ) -> Result<Page<ObjectVersion>, ApiError> {
        let start: usize = next_token.as_deref().unwrap_or("0").parse().unwrap_or(0);
        self.with_bucket("ListObjectVersions", bucket, |b| {
            let end = (start + 1500).min(b.objects.len());
            let next = (end < b.objects.len()).then(|| end.to_string());
            Page::new(b.objects[start.min(end)..end].to_vec(), next)
        })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[ObjectVersion],
    ) -> Result<(), ApiError> {
        self.record(format!("delete_objects {} {}", bucket, objects.len()));
        self.with_bucket("DeleteObjects", bucket, |b| {
            b.objects.retain(|o| !objects.contains(o))
        })
    }

    async fn list_buckets(&self, _next_token: Option<String>) -> Result<Page<String>, ApiError> {
        Ok(Page::last(
            self.buckets.lock().unwrap().keys().cloned().collect(),
        ))
    }
}
