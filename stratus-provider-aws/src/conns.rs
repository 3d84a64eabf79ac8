//! AWS client construction
//!
//! One [`AwsClient`] is built per provider configuration and shared by every
//! resource handler. Handlers only see the API seams, so tests can inject
//! in-memory fakes through [`AwsClient::with_apis`].

use std::sync::Arc;
use std::time::Duration;

use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use log::debug;
use stratus_core::config::ProviderConfig;
use stratus_core::provider::{ProviderError, ProviderResult};
use stratus_core::retry::RetryPolicy;
use stratus_core::tags::{IgnoreTagsConfig, KeyValueTags};

use crate::cloudcontrol::{CloudControlApi, SdkCloudControl};
use crate::s3::{S3Api, SdkS3};

#[derive(Clone)]
pub struct AwsClient {
    pub config: Arc<ProviderConfig>,
    pub cloudcontrol: Arc<dyn CloudControlApi>,
    pub s3: Arc<dyn S3Api>,
    retry: RetryPolicy,
    poll_interval: Option<Duration>,
}

impl AwsClient {
    /// Load shared AWS configuration and build the SDK clients
    pub async fn connect(config: ProviderConfig) -> ProviderResult<Self> {
        config
            .validate()
            .map_err(|e| ProviderError::validation(e.to_string()))?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region().to_string()))
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_retries.max(1)));
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;
        debug!(
            "loaded AWS configuration for region {} (profile: {})",
            config.region(),
            config.profile.as_deref().unwrap_or("default")
        );

        let mut cc = aws_sdk_cloudcontrol::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoints.cloudcontrol {
            cc = cc.endpoint_url(endpoint);
        }
        let mut s3 = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.s3_use_path_style);
        if let Some(endpoint) = &config.endpoints.s3 {
            s3 = s3.endpoint_url(endpoint);
        }

        Ok(Self::with_apis(
            config,
            Arc::new(SdkCloudControl::new(aws_sdk_cloudcontrol::Client::from_conf(
                cc.build(),
            ))),
            Arc::new(SdkS3::new(aws_sdk_s3::Client::from_conf(s3.build()))),
        ))
    }

    pub fn with_apis(
        config: ProviderConfig,
        cloudcontrol: Arc<dyn CloudControlApi>,
        s3: Arc<dyn S3Api>,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            config: Arc::new(config),
            cloudcontrol,
            s3,
            retry,
            poll_interval: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Poll request status at a fixed interval instead of backing off
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn region(&self) -> &str {
        self.config.region()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone()
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval
    }

    pub fn default_tags(&self) -> KeyValueTags {
        self.config.default_tags()
    }

    pub fn ignore_tags(&self) -> &IgnoreTagsConfig {
        &self.config.ignore_tags
    }
}
