//! S3 API seam
//!
//! S3 buckets are managed directly rather than through Cloud Control so that
//! `force_destroy` can empty a bucket before deleting it.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration, Delete,
    ObjectIdentifier, Tag, Tagging, VersioningConfiguration,
};
use stratus_core::paginate::Page;
use stratus_core::tags::KeyValueTags;

use crate::errs::ApiError;

/// Region whose buckets are created without a location constraint
pub const DEFAULT_REGION: &str = "us-east-1";

/// Largest batch accepted by DeleteObjects
pub const MAX_DELETE_BATCH: usize = 1000;

/// What HeadBucket reports about a bucket
#[derive(Debug, Clone, PartialEq)]
pub struct BucketInfo {
    pub region: Option<String>,
}

/// One object version (or delete marker) in a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: Option<String>,
}

#[async_trait]
pub trait S3Api: Send + Sync {
    async fn head_bucket(&self, bucket: &str) -> Result<BucketInfo, ApiError>;

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), ApiError>;

    async fn delete_bucket(&self, bucket: &str) -> Result<(), ApiError>;

    /// `None` when versioning was never configured
    async fn get_bucket_versioning(&self, bucket: &str) -> Result<Option<String>, ApiError>;

    async fn put_bucket_versioning(&self, bucket: &str, status: &str) -> Result<(), ApiError>;

    /// Empty when the bucket has no tag set
    async fn get_bucket_tagging(&self, bucket: &str) -> Result<KeyValueTags, ApiError>;

    async fn put_bucket_tagging(&self, bucket: &str, tags: &KeyValueTags) -> Result<(), ApiError>;

    async fn delete_bucket_tagging(&self, bucket: &str) -> Result<(), ApiError>;

    /// Every object version and delete marker, one page at a time
    async fn list_objects(
        &self,
        bucket: &str,
        next_token: Option<String>,
    ) -> Result<Page<ObjectVersion>, ApiError>;

    async fn delete_objects(&self, bucket: &str, objects: &[ObjectVersion])
    -> Result<(), ApiError>;

    async fn list_buckets(&self, next_token: Option<String>) -> Result<Page<String>, ApiError>;
}

/// [`S3Api`] backed by the AWS SDK
pub struct SdkS3 {
    client: Client,
}

impl SdkS3 {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// ListObjectVersions continues from a key and a version id; both travel in
/// one opaque token.
fn encode_version_token(key: Option<&str>, version_id: Option<&str>) -> Option<String> {
    key.map(|k| serde_json::json!([k, version_id]).to_string())
}

fn decode_version_token(token: &str) -> (Option<String>, Option<String>) {
    match serde_json::from_str::<(String, Option<String>)>(token) {
        Ok((key, version)) => (Some(key), version),
        Err(_) => (Some(token.to_string()), None),
    }
}

#[async_trait]
impl S3Api for SdkS3 {
    async fn head_bucket(&self, bucket: &str) -> Result<BucketInfo, ApiError> {
        let output = self
            .client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("HeadBucket", e))?;
        Ok(BucketInfo {
            region: output.bucket_region().map(String::from),
        })
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), ApiError> {
        let mut req = self.client.create_bucket().bucket(bucket);
        if region != DEFAULT_REGION {
            let config = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build();
            req = req.create_bucket_configuration(config);
        }
        req.send()
            .await
            .map_err(|e| ApiError::from_sdk("CreateBucket", e))?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), ApiError> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("DeleteBucket", e))?;
        Ok(())
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> Result<Option<String>, ApiError> {
        let output = self
            .client
            .get_bucket_versioning()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("GetBucketVersioning", e))?;
        Ok(output.status().map(|s| s.as_str().to_string()))
    }

    async fn put_bucket_versioning(&self, bucket: &str, status: &str) -> Result<(), ApiError> {
        let config = VersioningConfiguration::builder()
            .status(BucketVersioningStatus::from(status))
            .build();
        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(config)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("PutBucketVersioning", e))?;
        Ok(())
    }

    async fn get_bucket_tagging(&self, bucket: &str) -> Result<KeyValueTags, ApiError> {
        let result = self.client.get_bucket_tagging().bucket(bucket).send().await;
        let output = match result {
            Ok(output) => output,
            Err(e) if e.code() == Some("NoSuchTagSet") => return Ok(KeyValueTags::new()),
            Err(e) => return Err(ApiError::from_sdk("GetBucketTagging", e)),
        };
        let mut tags = KeyValueTags::new();
        for tag in output.tag_set() {
            tags.insert(tag.key(), tag.value());
        }
        Ok(tags)
    }

    async fn put_bucket_tagging(&self, bucket: &str, tags: &KeyValueTags) -> Result<(), ApiError> {
        let mut tag_set = Vec::with_capacity(tags.len());
        for (key, value) in tags.iter() {
            let tag = Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|e| ApiError::new("PutBucketTagging", e.to_string()))?;
            tag_set.push(tag);
        }
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| ApiError::new("PutBucketTagging", e.to_string()))?;
        self.client
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("PutBucketTagging", e))?;
        Ok(())
    }

    async fn delete_bucket_tagging(&self, bucket: &str) -> Result<(), ApiError> {
        self.client
            .delete_bucket_tagging()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("DeleteBucketTagging", e))?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        next_token: Option<String>,
    ) -> Result<Page<ObjectVersion>, ApiError> {
        let (key_marker, version_marker) = match next_token.as_deref() {
            Some(token) => decode_version_token(token),
            None => (None, None),
        };
        let output = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .set_key_marker(key_marker)
            .set_version_id_marker(version_marker)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("ListObjectVersions", e))?;

        let mut items = Vec::new();
        for version in output.versions() {
            if let Some(key) = version.key() {
                items.push(ObjectVersion {
                    key: key.to_string(),
                    version_id: version.version_id().map(String::from),
                });
            }
        }
        for marker in output.delete_markers() {
            if let Some(key) = marker.key() {
                items.push(ObjectVersion {
                    key: key.to_string(),
                    version_id: marker.version_id().map(String::from),
                });
            }
        }

        let next = if output.is_truncated().unwrap_or(false) {
            encode_version_token(output.next_key_marker(), output.next_version_id_marker())
        } else {
            None
        };
        Ok(Page::new(items, next))
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[ObjectVersion],
    ) -> Result<(), ApiError> {
        let mut identifiers = Vec::with_capacity(objects.len());
        for object in objects {
            let identifier = ObjectIdentifier::builder()
                .key(&object.key)
                .set_version_id(object.version_id.clone())
                .build()
                .map_err(|e| ApiError::new("DeleteObjects", e.to_string()))?;
            identifiers.push(identifier);
        }
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|e| ApiError::new("DeleteObjects", e.to_string()))?;
        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("DeleteObjects", e))?;

        if let Some(first) = output.errors().first() {
            let mut err = ApiError::new(
                "DeleteObjects",
                format!(
                    "{} objects could not be deleted, first: {}: {}",
                    output.errors().len(),
                    first.key().unwrap_or_default(),
                    first.message().unwrap_or_default()
                ),
            );
            if let Some(code) = first.code() {
                err = err.with_code(code);
            }
            return Err(err);
        }
        Ok(())
    }

    async fn list_buckets(&self, next_token: Option<String>) -> Result<Page<String>, ApiError> {
        let output = self
            .client
            .list_buckets()
            .set_continuation_token(next_token)
            .send()
            .await
            .map_err(|e| ApiError::from_sdk("ListBuckets", e))?;
        let names = output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(String::from))
            .collect();
        Ok(Page::new(
            names,
            output.continuation_token().map(String::from),
        ))
    }
}
